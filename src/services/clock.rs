use chrono::{DateTime, Utc};

use crate::container::{Component, ResolutionError, Resolver};

/// Source of the current time. Swapped for a fixed clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Component for SystemClock {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(SystemClock)
    }
}

crate::provides!(SystemClock => dyn Clock);

/// Always reports the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
