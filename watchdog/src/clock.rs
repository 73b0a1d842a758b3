//! Injectable wall clock, so the rotation controller's time-based decisions
//! (`rotationDue`, readiness deadlines, drain grace) are testable without
//! sleeping real seconds.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
