//! Process-wide tracing setup shared by the restock binaries.

/// Tracing configuration (format, filters).
pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize tracing with the format chosen by `RESTOCK_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
