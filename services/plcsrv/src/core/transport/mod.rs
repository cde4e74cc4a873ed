//! Transport layer
//!
//! Abstracts the byte-level session to a controller so protocol adapters
//! stay free of socket details. TCP carries MC protocol and Modbus, UDP
//! carries FINS, and the mock transport backs tests.

pub mod factory;
pub mod mock;
pub mod tcp;
pub mod traits;
pub mod udp;

pub use factory::{NetTransportFactory, TransportFactory};
pub use mock::{MockTransport, MockTransportFactory};
pub use tcp::TcpTransport;
pub use traits::Transport;
pub use udp::UdpTransport;
