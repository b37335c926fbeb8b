//! Logging utilities.
//!
//! Centralizes logger initialization. Everything else logs through the `log`
//! facade; render-side diagnostics use [`RENDER_TARGET`].

mod init;

pub use init::{init_logging, LoggingConfig};

/// Log target for diagnostics that originate on the render side.
pub const RENDER_TARGET: &str = "parallax::render";
