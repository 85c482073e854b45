//! Logging utilities.
//!
//! The crate logs through the `log` facade only. Applications that want output
//! without wiring their own backend can call [`init_logging`].

mod init;

pub use init::{init_logging, LoggingConfig};
