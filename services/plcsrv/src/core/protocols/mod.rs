//! Manufacturer protocol adapters
//!
//! One adapter per manufacturer family hides its addressing grammar, frame
//! format and 32-bit word order behind a single `read` contract. The word
//! orders genuinely differ between families and must not be unified:
//! Mitsubishi combines low-word-first, Omron and Keyence high-word-first.

pub mod address;
pub mod decode;
pub mod keyence;
pub mod mitsubishi;
pub mod omron;
pub mod siemens;
pub mod traits;

pub use decode::{scaled_value, WordOrder};
pub use keyence::KeyenceAdapter;
pub use mitsubishi::MitsubishiAdapter;
pub use omron::OmronAdapter;
pub use siemens::SiemensAdapter;
pub use traits::{adapter_for, ProtocolAdapter, RawValue};
