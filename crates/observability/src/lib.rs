//! Tracing and logging setup shared by binaries and black-box tests.

/// Log subscriber installation.
pub mod logging;

pub use logging::{LogFormat, LoggingConfig};

/// Initialize process-wide logging with JSON output and `RUST_LOG` filtering.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init(&LoggingConfig::default());
}
