//! Symbolic address parsing
//!
//! All families write addresses as `<letters><decimal>[.<bit>]`; what the
//! letters mean and whether the bit suffix is legal differs per family, so
//! this module only splits the string and validates the shape. Family rules
//! live in each adapter.

use errors::{AgentError, AgentResult};

/// The split form of an address string like `D101`, `DM200.3` or `R10.3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    /// Device prefix, uppercased (`D`, `DM`, `M`, `R`, `MR`, ...)
    pub device: String,
    /// Decimal device offset
    pub offset: u32,
    /// Explicit bit index (0..=15) when the `.bit` suffix was present
    pub bit: Option<u8>,
}

pub fn parse_address(address: &str) -> AgentResult<ParsedAddress> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(AgentError::decode(address, "empty address"));
    }

    let upper = trimmed.to_ascii_uppercase();
    let (main, bit_part) = match upper.split_once('.') {
        Some((main, bit)) => (main, Some(bit)),
        None => (upper.as_str(), None),
    };

    let prefix_len = main.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if prefix_len == 0 {
        return Err(AgentError::decode(address, "missing device prefix"));
    }
    let (device, digits) = main.split_at(prefix_len);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AgentError::decode(address, "missing or non-numeric offset"));
    }
    let offset: u32 = digits
        .parse()
        .map_err(|_| AgentError::decode(address, "offset out of range"))?;

    let bit = match bit_part {
        None => None,
        Some(raw) => {
            if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
                return Err(AgentError::decode(address, "malformed bit index"));
            }
            let bit: u8 = raw
                .parse()
                .map_err(|_| AgentError::decode(address, "bit index out of range"))?;
            if bit > 15 {
                return Err(AgentError::decode(address, "bit index must be 0..=15"));
            }
            Some(bit)
        },
    };

    Ok(ParsedAddress {
        device: device.to_string(),
        offset,
        bit,
    })
}
