//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Install the subscriber with the format picked from `WARDEN_LOG_FORMAT`
/// (JSON unless set to `pretty`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::from_env());
}
