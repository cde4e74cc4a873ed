//! Shared runtime plumbing for the plcsrv agent
//!
//! Keeps service bootstrap uniform: logging initialization and shutdown
//! signal handling live here so the binary stays small.

pub mod logging;
pub mod shutdown;
