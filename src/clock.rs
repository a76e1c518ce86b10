//! Injectable clock (spec §5: "all timestamp-sensitive components accept
//! an injectable clock function for determinism in test and replay").

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A source of the current time, abstracted so tests and replay can supply
/// a fixed or scripted clock instead of the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_unix(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock fixed to a single instant, for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
