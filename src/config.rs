//! Validator configuration.
use super::types::TimeStamp;
use chrono::Utc;
use std::sync::Arc;

/// Source of "now". Read once per request.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::new()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub TimeStamp<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> TimeStamp<Utc> {
        self.0.clone()
    }
}

#[derive(Clone)]
pub struct ValidatorConfig {
    max_workers: usize,
    clock: Arc<dyn Clock>,
}

impl ValidatorConfig {
    pub fn new() -> Self {
        let max_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_workers,
            clock: Arc::new(SystemClock),
        }
    }
    pub fn set_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }
    pub fn set_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
    pub fn now(&self) -> TimeStamp<Utc> {
        self.clock.now()
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValidatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("max_workers", &self.max_workers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_never_zero() {
        assert!(ValidatorConfig::new().max_workers() >= 1);
        assert_eq!(ValidatorConfig::new().set_max_workers(0).max_workers(), 1);
    }

    #[test]
    fn fixed_clock_is_fixed() {
        let instant = TimeStamp::from_unix(1_700_000_000).unwrap();
        let config = ValidatorConfig::new().set_clock(FixedClock(instant.clone()));
        assert_eq!(config.now(), instant);
        assert_eq!(config.now(), instant);
        assert_eq!(config.clock().now(), instant);
    }
}
