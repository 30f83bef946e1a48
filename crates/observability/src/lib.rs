//! Process-wide tracing setup shared by the `tollgate` binary and its tests.

pub mod tracing;

/// Initialize structured logging.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_DIRECTIVE);
}
