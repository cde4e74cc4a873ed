//! Keyence adapter — Modbus TCP (KV series in Modbus slave mode)
//!
//! The KV Modbus mapping splits the address space: `DM<n>` is holding
//! register `n` (FC03), `R<n>` is coil `n*16` — one relay groups 16 bits —
//! with an optional `.bit` suffix selecting `n*16+bit` (FC01). Internal
//! relays `MR<n>` map the same way shifted by a fixed offset so they cannot
//! collide with `R`. 32-bit values combine high-word-first.

use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use errors::{AgentError, AgentResult};

use crate::core::config::{DataPointSpec, Manufacturer, PlcDataType};
use crate::core::transport::Transport;

use super::address::parse_address;
use super::decode::WordOrder;
use super::traits::{ProtocolAdapter, RawValue};

const FC_READ_COILS: u8 = 0x01;
const FC_READ_HOLDING: u8 = 0x03;
const UNIT_ID: u8 = 0x01;
/// Internal relays live in the upper half of the coil space
pub const MR_COIL_OFFSET: u32 = 0x8000;
/// Bits per relay word in the KV coil mapping
const BITS_PER_RELAY: u32 = 16;

#[derive(Debug)]
pub struct KeyenceAdapter {
    transaction_id: AtomicU16,
}

impl Default for KeyenceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyenceAdapter {
    pub fn new() -> Self {
        Self {
            transaction_id: AtomicU16::new(0),
        }
    }

    fn build_request(&self, function: u8, address: u16, quantity: u16) -> (u16, Vec<u8>) {
        let tid = self.transaction_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let mut frame = Vec::with_capacity(12);
        frame.extend_from_slice(&tid.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]); // protocol id
        frame.extend_from_slice(&[0x00, 0x06]); // remaining length
        frame.push(UNIT_ID);
        frame.push(function);
        frame.extend_from_slice(&address.to_be_bytes());
        frame.extend_from_slice(&quantity.to_be_bytes());
        (tid, frame)
    }

    async fn exchange(
        &self,
        transport: &mut dyn Transport,
        function: u8,
        addr: u16,
        quantity: u16,
        address: &str,
    ) -> AgentResult<Vec<u8>> {
        let (tid, frame) = self.build_request(function, addr, quantity);
        transport.send(&frame).await?;
        let mut buf = [0u8; 512];
        let n = transport.receive(&mut buf).await?;
        Self::parse_response(&buf[..n], tid, function, address)
    }

    /// Validate MBAP + PDU and return the data bytes after the byte count
    fn parse_response(
        data: &[u8],
        expected_tid: u16,
        expected_fc: u8,
        address: &str,
    ) -> AgentResult<Vec<u8>> {
        if data.len() < 9 {
            return Err(AgentError::decode(
                address,
                format!("short Modbus response ({} bytes)", data.len()),
            ));
        }
        let tid = u16::from_be_bytes([data[0], data[1]]);
        if tid != expected_tid {
            return Err(AgentError::decode(
                address,
                format!("transaction id mismatch: sent {}, got {}", expected_tid, tid),
            ));
        }
        let function = data[7];
        if function == expected_fc | 0x80 {
            return Err(AgentError::read_failed(
                address,
                format!("Modbus exception code 0x{:02X}", data[8]),
            ));
        }
        if function != expected_fc {
            return Err(AgentError::decode(
                address,
                format!(
                    "function code mismatch: expected 0x{:02X}, got 0x{:02X}",
                    expected_fc, function
                ),
            ));
        }
        let byte_count = usize::from(data[8]);
        if data.len() < 9 + byte_count {
            return Err(AgentError::decode(address, "truncated Modbus data"));
        }
        Ok(data[9..9 + byte_count].to_vec())
    }

    /// Resolve a relay address to its coil number: `R<n>` occupies coils
    /// `n*16..n*16+15`, `MR<n>` the same shifted by `MR_COIL_OFFSET`.
    fn coil_number(device: &str, offset: u32, bit: Option<u8>, address: &str) -> AgentResult<u16> {
        let base = match device {
            "R" => 0,
            "MR" => MR_COIL_OFFSET,
            _ => {
                return Err(AgentError::decode(
                    address,
                    "bit reads map only to coils (R/MR addresses)",
                ))
            },
        };
        let coil = base + offset * BITS_PER_RELAY + u32::from(bit.unwrap_or(0));
        u16::try_from(coil)
            .map_err(|_| AgentError::decode(address, "coil number exceeds the Modbus space"))
    }
}

#[async_trait]
impl ProtocolAdapter for KeyenceAdapter {
    fn manufacturer(&self) -> Manufacturer {
        Manufacturer::Keyence
    }

    async fn read(
        &self,
        transport: &mut dyn Transport,
        spec: &DataPointSpec,
    ) -> AgentResult<RawValue> {
        let parsed = parse_address(&spec.address)?;

        match spec.plc_data_type {
            PlcDataType::Word | PlcDataType::Dword | PlcDataType::Float32 => {
                if parsed.device != "D" && parsed.device != "DM" {
                    return Err(AgentError::decode(
                        &spec.address,
                        "register reads map only to holding registers (DM addresses)",
                    ));
                }
                if parsed.bit.is_some() {
                    return Err(AgentError::decode(
                        &spec.address,
                        "bit index not valid for a register read",
                    ));
                }
                let addr = u16::try_from(parsed.offset).map_err(|_| {
                    AgentError::decode(&spec.address, "register number exceeds the Modbus space")
                })?;
                let count = spec.plc_data_type.register_count();
                let payload = self
                    .exchange(transport, FC_READ_HOLDING, addr, count, &spec.address)
                    .await?;
                let expected = usize::from(count) * 2;
                if payload.len() < expected {
                    return Err(AgentError::decode(
                        &spec.address,
                        format!(
                            "short register data: expected {} bytes, got {}",
                            expected,
                            payload.len()
                        ),
                    ));
                }
                let regs: Vec<u16> = payload[..expected]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(match spec.plc_data_type {
                    PlcDataType::Word => RawValue::Word(regs[0]),
                    PlcDataType::Dword => {
                        RawValue::DWord(WordOrder::HighWordFirst.combine(regs[0], regs[1]))
                    },
                    _ => RawValue::Float32(WordOrder::HighWordFirst.combine_f32(regs[0], regs[1])),
                })
            },
            PlcDataType::Bit => {
                let coil =
                    Self::coil_number(&parsed.device, parsed.offset, parsed.bit, &spec.address)?;
                let payload = self
                    .exchange(transport, FC_READ_COILS, coil, 1, &spec.address)
                    .await?;
                if payload.is_empty() {
                    return Err(AgentError::decode(&spec.address, "empty coil data"));
                }
                Ok(RawValue::Bit(payload[0] & 0x01 == 1))
            },
        }
    }
}
