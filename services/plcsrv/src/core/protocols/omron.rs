//! Omron adapter — FINS memory-area read over UDP
//!
//! `D`/`DM` addresses map to the DM word area (0x82); bit reads use the DM
//! bit area (0x02) and require an explicit `.bit` suffix — FINS addresses a
//! bit as (word, bit), so a bare address is ambiguous and rejected. 32-bit
//! values combine high-word-first, the opposite of the Mitsubishi family.

use async_trait::async_trait;
use errors::{AgentError, AgentResult};

use crate::core::config::{DataPointSpec, Manufacturer, PlcDataType};
use crate::core::transport::Transport;

use super::address::parse_address;
use super::decode::WordOrder;
use super::traits::{ProtocolAdapter, RawValue};

const MEMORY_AREA_READ: [u8; 2] = [0x01, 0x01];
const DM_WORD_AREA: u8 = 0x82;
const DM_BIT_AREA: u8 = 0x02;
const SOURCE_NODE: u8 = 0x01;
const SERVICE_ID: u8 = 0x01;

#[derive(Debug)]
pub struct OmronAdapter {
    /// FINS destination node, conventionally the last octet of the PLC's IP
    dest_node: u8,
}

impl OmronAdapter {
    pub fn new(dest_node: u8) -> Self {
        Self { dest_node }
    }

    pub fn for_host(host: &str) -> Self {
        let dest_node = host
            .parse::<std::net::Ipv4Addr>()
            .map(|ip| ip.octets()[3])
            .unwrap_or(0);
        Self::new(dest_node)
    }

    fn build_read_frame(&self, area: u8, offset: u16, bit: u8, count: u16) -> Vec<u8> {
        let mut frame = Vec::with_capacity(18);
        // FINS header: ICF RSV GCT DNA DA1 DA2 SNA SA1 SA2 SID
        frame.extend_from_slice(&[
            0x80,
            0x00,
            0x02,
            0x00,
            self.dest_node,
            0x00,
            0x00,
            SOURCE_NODE,
            0x00,
            SERVICE_ID,
        ]);
        frame.extend_from_slice(&MEMORY_AREA_READ);
        frame.push(area);
        frame.extend_from_slice(&offset.to_be_bytes());
        frame.push(bit);
        frame.extend_from_slice(&count.to_be_bytes());
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

    fn parse_response(data: &[u8], address: &str) -> AgentResult<Vec<u8>> {
        if data.len() < 14 {
            return Err(AgentError::decode(
                address,
                format!("short FINS response ({} bytes)", data.len()),
            ));
        }
        if data[10..12] != MEMORY_AREA_READ {
            return Err(AgentError::decode(address, "unexpected FINS command echo"));
        }
        let end_code = u16::from_be_bytes([data[12], data[13]]);
        if end_code != 0 {
            return Err(AgentError::read_failed(
                address,
                format!("FINS end code 0x{:04X}", end_code),
            ));
        }
        Ok(data[14..].to_vec())
    }

    fn word_offset(parsed_offset: u32, address: &str) -> AgentResult<u16> {
        u16::try_from(parsed_offset)
            .map_err(|_| AgentError::decode(address, "offset exceeds the DM area"))
    }
}

#[async_trait]
impl ProtocolAdapter for OmronAdapter {
    fn manufacturer(&self) -> Manufacturer {
        Manufacturer::Omron
    }

    async fn read(
        &self,
        transport: &mut dyn Transport,
        spec: &DataPointSpec,
    ) -> AgentResult<RawValue> {
        let parsed = parse_address(&spec.address)?;
        if parsed.device != "D" && parsed.device != "DM" {
            return Err(AgentError::decode(
                &spec.address,
                format!("unsupported FINS area '{}'", parsed.device),
            ));
        }
        let offset = Self::word_offset(parsed.offset, &spec.address)?;

        match spec.plc_data_type {
            PlcDataType::Word | PlcDataType::Dword | PlcDataType::Float32 => {
                if parsed.bit.is_some() {
                    return Err(AgentError::decode(
                        &spec.address,
                        "bit index not valid for a word-area read",
                    ));
                }
                let count = spec.plc_data_type.register_count();
                let frame = self.build_read_frame(DM_WORD_AREA, offset, 0, count);
                let payload = self.exchange(transport, &frame, &spec.address).await?;
                let expected = usize::from(count) * 2;
                if payload.len() < expected {
                    return Err(AgentError::decode(
                        &spec.address,
                        format!(
                            "short word data: expected {} bytes, got {}",
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
                // FINS addresses a bit as (word, bit); a bare address is an
                // authoring mistake, not something to guess around
                let bit = parsed.bit.ok_or_else(|| {
                    AgentError::decode(&spec.address, "FINS bit read requires a .bit suffix")
                })?;
                let frame = self.build_read_frame(DM_BIT_AREA, offset, bit, 1);
                let payload = self.exchange(transport, &frame, &spec.address).await?;
                if payload.is_empty() {
                    return Err(AgentError::decode(&spec.address, "empty bit data"));
                }
                Ok(RawValue::Bit(payload[0] & 0x01 == 1))
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

    fn response(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xC0, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x0A, 0x00, 0x01];
        frame.extend_from_slice(&MEMORY_AREA_READ);
        frame.extend_from_slice(&[0x00, 0x00]); // end code: ok
        frame.extend_from_slice(payload);
        frame
    }

    async fn connected_mock(responses: Vec<Vec<u8>>) -> MockTransport {
        let mut mock = MockTransport::new();
        for r in responses {
            mock.push_response(r);
        }
        mock.connect().await.unwrap();
        mock
    }

    #[tokio::test]
    async fn test_word_read_frame_is_byte_exact() {
        let adapter = OmronAdapter::new(10);
        let mut mock = connected_mock(vec![response(&[0x00, 0xFF])]).await;
        let sent = mock.sent_frames();

        let raw = adapter
            .read(&mut mock, &spec("DM100", PlcDataType::Word))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Word(255));

        let frames = sent.lock().unwrap();
        assert_eq!(
            frames[0],
            vec![
                0x80, 0x00, 0x02, // ICF RSV GCT
                0x00, 0x0A, 0x00, // destination: network 0, node 10, unit 0
                0x00, 0x01, 0x00, // source: network 0, node 1, unit 0
                0x01, // service id
                0x01, 0x01, // memory area read
                0x82, // DM word area
                0x00, 0x64, // address 100
                0x00, // bit 0
                0x00, 0x01, // one word
            ]
        );
    }

    #[tokio::test]
    async fn test_dest_node_from_host_ip() {
        let adapter = OmronAdapter::for_host("192.168.0.23");
        let mut mock = connected_mock(vec![response(&[0x00, 0x01])]).await;
        let sent = mock.sent_frames();
        adapter
            .read(&mut mock, &spec("D0", PlcDataType::Word))
            .await
            .unwrap();
        assert_eq!(sent.lock().unwrap()[0][4], 23);
    }

    #[tokio::test]
    async fn test_dword_combines_high_word_first() {
        let adapter = OmronAdapter::new(1);
        // First register read is the high word
        let mut mock =
            connected_mock(vec![response(&[0x00, 0x01, 0x00, 0x02])]).await;
        let raw = adapter
            .read(&mut mock, &spec("DM200", PlcDataType::Dword))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::DWord(0x0001_0002));
    }

    #[tokio::test]
    async fn test_float32_round_trip() {
        let adapter = OmronAdapter::new(1);
        let value = -7.25_f32;
        let (first, second) = WordOrder::HighWordFirst.split(value.to_bits());
        let mut payload = Vec::new();
        payload.extend_from_slice(&first.to_be_bytes());
        payload.extend_from_slice(&second.to_be_bytes());
        let mut mock = connected_mock(vec![response(&payload)]).await;
        let raw = adapter
            .read(&mut mock, &spec("D10", PlcDataType::Float32))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Float32(value));
    }

    #[tokio::test]
    async fn test_bit_requires_explicit_suffix() {
        let adapter = OmronAdapter::new(1);
        let mut mock = connected_mock(vec![]).await;
        let err = adapter
            .read(&mut mock, &spec("DM100", PlcDataType::Bit))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_bit_read_uses_bit_area() {
        let adapter = OmronAdapter::new(1);
        let mut mock = connected_mock(vec![response(&[0x01])]).await;
        let sent = mock.sent_frames();

        let raw = adapter
            .read(&mut mock, &spec("DM100.3", PlcDataType::Bit))
            .await
            .unwrap();
        assert_eq!(raw, RawValue::Bit(true));

        let frames = sent.lock().unwrap();
        assert_eq!(frames[0][12], DM_BIT_AREA);
        assert_eq!(frames[0][15], 3); // bit index on the wire
    }

    #[tokio::test]
    async fn test_error_end_code_is_read_failure() {
        let adapter = OmronAdapter::new(1);
        let mut frame = vec![0xC0, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x0A, 0x00, 0x01];
        frame.extend_from_slice(&MEMORY_AREA_READ);
        frame.extend_from_slice(&[0x11, 0x0B]); // end code: error
        let mut mock = connected_mock(vec![frame]).await;
        let err = adapter
            .read(&mut mock, &spec("DM100", PlcDataType::Word))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ReadFailed { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_area_rejected() {
        let adapter = OmronAdapter::new(1);
        let mut mock = connected_mock(vec![]).await;
        let err = adapter
            .read(&mut mock, &spec("W100", PlcDataType::Word))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Decode { .. }));
    }
}
