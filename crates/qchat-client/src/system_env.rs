//! Production environment backed by the system clock.

use std::time::{SystemTime, UNIX_EPOCH};

use qchat_core::Environment;

/// Production environment using system wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods, reason = "SystemEnv is the one wall-clock source")]
    fn wall_clock_millis(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
    }
}
