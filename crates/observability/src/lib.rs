//! Tracing and logging setup shared by binaries, tests and benches.

/// Initialize process-wide tracing from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init();
}

/// Subscriber configuration (filter, output format).
pub mod tracing;

pub use crate::tracing::LogFormat;
