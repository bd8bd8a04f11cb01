//! Environment abstraction for deterministic testing.
//!
//! Record timestamps come from the environment rather than the system clock so
//! tests can pin them.

/// Abstract environment providing wall-clock time.
///
/// # Invariants
///
/// - `wall_clock_millis()` returns milliseconds since the Unix epoch. It is
///   used only for display timestamps, never for ordering; ordering comes from
///   record ids.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn wall_clock_millis(&self) -> u64;
}
