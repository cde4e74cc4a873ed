//! Mitsubishi adapter — MC protocol, 3E binary frames
//!
//! Word devices (`D`, `DM` as an alias of `D`, `W`) are read with the batch
//! word-units command; bit devices (`M`, `X`, `Y`, `B`) with the bit-units
//! subcommand. 32-bit values combine two consecutive registers with the
//! low-order word at the lower address. Register payload bytes are
//! little-endian, as the 3E binary format defines them.

use async_trait::async_trait;
use errors::{AgentError, AgentResult};

use crate::core::config::{DataPointSpec, Manufacturer, PlcDataType};
use crate::core::transport::Transport;

use super::address::parse_address;
use super::decode::WordOrder;
use super::traits::{ProtocolAdapter, RawValue};

const SUBHEADER_REQUEST: [u8; 2] = [0x50, 0x00];
const SUBHEADER_RESPONSE: [u8; 2] = [0xD0, 0x00];
/// Batch read, little-endian on the wire
const COMMAND_BATCH_READ: [u8; 2] = [0x01, 0x04];
const SUBCOMMAND_WORD: [u8; 2] = [0x00, 0x00];
const SUBCOMMAND_BIT: [u8; 2] = [0x01, 0x00];
/// CPU monitoring timer, units of 250 ms
const MONITORING_TIMER: [u8; 2] = [0x04, 0x00];

/// Binary device codes for the devices this agent addresses
fn device_code(device: &str) -> Option<(u8, bool)> {
    // (code, is_bit_device)
    match device {
        "D" | "DM" => Some((0xA8, false)),
        "W" => Some((0xB4, false)),
        "M" => Some((0x90, true)),
        "X" => Some((0x9C, true)),
        "Y" => Some((0x9D, true)),
        "B" => Some((0xA0, true)),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct MitsubishiAdapter;

impl MitsubishiAdapter {
    pub fn new() -> Self {
        Self
    }

    fn build_read_frame(code: u8, offset: u32, count: u16, subcommand: [u8; 2]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(21);
        frame.extend_from_slice(&SUBHEADER_REQUEST);
        frame.push(0x00); // network number
        frame.push(0xFF); // PC number
        frame.extend_from_slice(&[0xFF, 0x03]); // destination module (0x03FF)
        frame.push(0x00); // destination station

        // Request data: timer + command + subcommand + device(4) + count
        let data_len: u16 = 12;
        frame.extend_from_slice(&data_len.to_le_bytes());
        frame.extend_from_slice(&MONITORING_TIMER);
        frame.extend_from_slice(&COMMAND_BATCH_READ);
        frame.extend_from_slice(&subcommand);
        frame.push((offset & 0xFF) as u8);
        frame.push(((offset >> 8) & 0xFF) as u8);
        frame.push(((offset >> 16) & 0xFF) as u8);
        frame.push(code);
        frame.extend_from_slice(&count.to_le_bytes());
        frame
    }

    async fn exchange(
        &self,
        transport: &mut dyn Transport,
        frame: &[u8],
        address: &str,
    ) -> AgentResult<Vec<u8>> {
        transport.send(frame).await?;
        let mut buf = [0u8; 512];
        let n = transport.receive(&mut buf).await?;
        Self::parse_response(&buf[..n], address)
    }

    /// Validate the 3E response envelope and return the payload bytes
    fn parse_response(data: &[u8], address: &str) -> AgentResult<Vec<u8>> {
        if data.len() < 11 {
            return Err(AgentError::decode(
                address,
                format!("short MC response ({} bytes)", data.len()),
            ));
        }
        if data[0..2] != SUBHEADER_RESPONSE {
            return Err(AgentError::decode(address, "bad MC response subheader"));
        }
        let end_code = u16::from_le_bytes([data[9], data[10]]);
        if end_code != 0 {
            return Err(AgentError::read_failed(
                address,
                format!("MC end code 0x{:04X}", end_code),
            ));
        }
        Ok(data[11..].to_vec())
    }

    async fn read_words(
        &self,
        transport: &mut dyn Transport,
        code: u8,
        offset: u32,
        count: u16,
        address: &str,
    ) -> AgentResult<Vec<u16>> {
        let frame = Self::build_read_frame(code, offset, count, SUBCOMMAND_WORD);
        let payload = self.exchange(transport, &frame, address).await?;
        let expected = usize::from(count) * 2;
        if payload.len() < expected {
            return Err(AgentError::decode(
                address,
                format!(
                    "short register data: expected {} bytes, got {}",
                    expected,
                    payload.len()
                ),
            ));
        }
        Ok(payload[..expected]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    async fn read_bit_device(
        &self,
        transport: &mut dyn Transport,
        code: u8,
        offset: u32,
        address: &str,
    ) -> AgentResult<bool> {
        let frame = Self::build_read_frame(code, offset, 1, SUBCOMMAND_BIT);
        let payload = self.exchange(transport, &frame, address).await?;
        if payload.is_empty() {
            return Err(AgentError::decode(address, "empty bit data"));
        }
        // Bit-units data packs two points per byte, first point in the
        // high nibble
        Ok((payload[0] >> 4) & 0x01 == 1)
    }
}

#[async_trait]
impl ProtocolAdapter for MitsubishiAdapter {
    fn manufacturer(&self) -> Manufacturer {
        Manufacturer::Mitsubishi
    }

    async fn read(
        &self,
        transport: &mut dyn Transport,
        spec: &DataPointSpec,
    ) -> AgentResult<RawValue> {
        let parsed = parse_address(&spec.address)?;
        let (code, is_bit_device) = device_code(&parsed.device).ok_or_else(|| {
            AgentError::decode(&spec.address, format!("unknown device '{}'", parsed.device))
        })?;
        if parsed.offset > 0x00FF_FFFF {
            return Err(AgentError::decode(&spec.address, "offset exceeds 24 bits"));
        }

        match spec.plc_data_type {
            PlcDataType::Word | PlcDataType::Dword | PlcDataType::Float32 => {
                if is_bit_device {
                    return Err(AgentError::decode(
                        &spec.address,
                        "register read requires a word device",
                    ));
                }
                if parsed.bit.is_some() {
                    return Err(AgentError::decode(
                        &spec.address,
                        "bit index not valid for a register read",
                    ));
                }
                let count = spec.plc_data_type.register_count();
                let regs = self
                    .read_words(transport, code, parsed.offset, count, &spec.address)
                    .await?;
                Ok(match spec.plc_data_type {
                    PlcDataType::Word => RawValue::Word(regs[0]),
                    PlcDataType::Dword => {
                        RawValue::DWord(WordOrder::LowWordFirst.combine(regs[0], regs[1]))
                    },
                    _ => RawValue::Float32(WordOrder::LowWordFirst.combine_f32(regs[0], regs[1])),
                })
            },
            PlcDataType::Bit => {
                if is_bit_device {
                    if parsed.bit.is_some() {
                        return Err(AgentError::decode(
                            &spec.address,
                            "bit devices take no bit index",
                        ));
                    }
                    let value = self
                        .read_bit_device(transport, code, parsed.offset, &spec.address)
                        .await?;
                    Ok(RawValue::Bit(value))
                } else {
                    let bit = parsed.bit.ok_or_else(|| {
                        AgentError::decode(
                            &spec.address,
                            "bit read on a word device requires a .bit suffix",
                        )
                    })?;
                    let regs = self
                        .read_words(transport, code, parsed.offset, 1, &spec.address)
                        .await?;
                    Ok(RawValue::Bit((regs[0] >> bit) & 1 == 1))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockTransport;

    fn spec(address: &str, data_type: PlcDataType) -> DataPointSpec {
        DataPointSpec::new("point", address, data_type, 1, true)
    }

    fn word_response(registers: &[u16]) -> Vec<u8> {
        let mut frame = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00];
        let data_len = (2 + registers.len() * 2) as u16;
        frame.extend_from_slice(&data_len.to_le_bytes());
        frame.extend_from_slice(&[0x00, 0x00]); // end code: ok
        for reg in registers {
            frame.extend_from_slice(&reg.to_le_bytes());
        }
        frame
    }

    async fn connected_mock(responses: Vec<Vec<u8>>) -> MockTransport {
        let mut mock = MockTransport::new();
        for response in responses {
            mock.push_response(response);
        }
        mock.connect().await.unwrap();
        mock
    }

    #[tokio::test]
    async fn test_word_read_frame_is_byte_exact() {
        let adapter = MitsubishiAdapter::new();
        let mut mock = connected_mock(vec![word_response(&[255])]).await;
        let sent = mock.sent_frames();

        let raw = adapter
            .read(&mut mock, &spec("D100", PlcDataType::Word))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Word(255));

        let frames = sent.lock().unwrap();
        assert_eq!(
            frames[0],
            vec![
                0x50, 0x00, // subheader
                0x00, 0xFF, 0xFF, 0x03, 0x00, // route
                0x0C, 0x00, // data length
                0x04, 0x00, // monitoring timer
                0x01, 0x04, // batch read
                0x00, 0x00, // word units
                0x64, 0x00, 0x00, // device 100
                0xA8, // D register
                0x01, 0x00, // one point
            ]
        );
    }

    #[tokio::test]
    async fn test_dm_alias_sends_same_frame_as_d() {
        let adapter = MitsubishiAdapter::new();

        let mut mock_d = connected_mock(vec![word_response(&[1])]).await;
        let sent_d = mock_d.sent_frames();
        adapter
            .read(&mut mock_d, &spec("D101", PlcDataType::Word))
            .await
            .unwrap();

        let mut mock_dm = connected_mock(vec![word_response(&[1])]).await;
        let sent_dm = mock_dm.sent_frames();
        adapter
            .read(&mut mock_dm, &spec("DM101", PlcDataType::Word))
            .await
            .unwrap();

        assert_eq!(*sent_d.lock().unwrap(), *sent_dm.lock().unwrap());
    }

    #[tokio::test]
    async fn test_dword_combines_low_word_first() {
        let adapter = MitsubishiAdapter::new();
        // Register at n holds the low word
        let mut mock = connected_mock(vec![word_response(&[0x0001, 0x0002])]).await;
        let raw = adapter
            .read(&mut mock, &spec("D200", PlcDataType::Dword))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::DWord(0x0002_0001));
    }

    #[tokio::test]
    async fn test_float32_round_trip() {
        let adapter = MitsubishiAdapter::new();
        let value = 25.5_f32;
        let (first, second) = WordOrder::LowWordFirst.split(value.to_bits());
        let mut mock = connected_mock(vec![word_response(&[first, second])]).await;
        let raw = adapter
            .read(&mut mock, &spec("D101", PlcDataType::Float32))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Float32(value));
    }

    #[tokio::test]
    async fn test_bit_device_read() {
        let adapter = MitsubishiAdapter::new();
        let mut response = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x03, 0x00, 0x00, 0x00];
        response.push(0x10); // first point ON, high nibble
        let mut mock = connected_mock(vec![response]).await;
        let sent = mock.sent_frames();

        let raw = adapter
            .read(&mut mock, &spec("M100", PlcDataType::Bit))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Bit(true));

        // Bit-units subcommand and M device code on the wire
        let frames = sent.lock().unwrap();
        assert_eq!(frames[0][13..15], [0x01, 0x00]);
        assert_eq!(frames[0][18], 0x90);
    }

    #[tokio::test]
    async fn test_word_device_bit_needs_suffix() {
        let adapter = MitsubishiAdapter::new();
        let mut mock = connected_mock(vec![]).await;
        let err = adapter
            .read(&mut mock, &spec("D100", PlcDataType::Bit))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_word_device_bit_with_suffix_masks_register() {
        let adapter = MitsubishiAdapter::new();
        // 0x0020 = bit 5 set
        let mut mock = connected_mock(vec![word_response(&[0x0020])]).await;
        let raw = adapter
            .read(&mut mock, &spec("D100.5", PlcDataType::Bit))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Bit(true));

        let mut mock = connected_mock(vec![word_response(&[0x0010])]).await;
        let raw = adapter
            .read(&mut mock, &spec("D100.5", PlcDataType::Bit))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Bit(false));
    }

    #[tokio::test]
    async fn test_error_end_code_is_read_failure() {
        let adapter = MitsubishiAdapter::new();
        let response = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x02, 0x00, 0x01, 0xC0];
        let mut mock = connected_mock(vec![response]).await;
        let err = adapter
            .read(&mut mock, &spec("D100", PlcDataType::Word))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ReadFailed { .. }));
    }

    #[tokio::test]
    async fn test_short_response_is_decode_error() {
        let adapter = MitsubishiAdapter::new();
        let mut mock = connected_mock(vec![vec![0xD0, 0x00, 0x00]]).await;
        let err = adapter
            .read(&mut mock, &spec("D100", PlcDataType::Word))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let adapter = MitsubishiAdapter::new();
        let mut mock = connected_mock(vec![]).await;
        let err = adapter
            .read(&mut mock, &spec("Z100", PlcDataType::Word))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Decode { .. }));
    }
}
