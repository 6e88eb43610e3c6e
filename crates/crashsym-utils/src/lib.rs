//! # crashsym Utilities
//!
//! Logging infrastructure shared by the crashsym binaries, built on
//! `tracing`. Library crates only emit events; binaries call
//! [`init_logging`] once at startup.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
