//! Time source for orchestration drivers

use chrono::{DateTime, Utc};

/// Supplies "now" to the orchestrators. Only drivers read it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
