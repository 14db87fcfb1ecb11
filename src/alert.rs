//! Rate-limited alert policy.
//!
//! Each alert category owns a cooldown: an interval and the instant it last
//! fired. `should_fire` is a single check-and-set step, so two qualifying
//! events inside one interval can never both pass. Categories are
//! independent of each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlertCategory {
    /// Snapshot + alarm + event row when the restricted zone is breached.
    IntrusionCapture,
    /// Snapshot + alarm + event row when the crowd exceeds capacity.
    CrowdCapture,
    /// Periodic people-count row, independent of capacity.
    CrowdCountLog,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::IntrusionCapture => "intrusion-capture",
            AlertCategory::CrowdCapture => "crowd-capture",
            AlertCategory::CrowdCountLog => "crowd-count-log",
        }
    }
}

/// Cooldown state for one category.
#[derive(Clone, Debug)]
pub struct Cooldown {
    interval: Duration,
    /// `None` means never fired, so the first qualifying event passes.
    last_fired: Option<Instant>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// Fire iff at least `interval` has elapsed since the last firing.
    ///
    /// A `now` earlier than the last firing never passes.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        let ready = match self.last_fired {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.interval),
        };
        if ready {
            self.last_fired = Some(now);
        }
        ready
    }
}

/// Per-category cooldowns, configured once per run and injected into a monitor.
#[derive(Clone, Debug, Default)]
pub struct AlertPolicy {
    cooldowns: HashMap<AlertCategory, Cooldown>,
}

impl AlertPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a category. Zero intervals are rejected because they would
    /// disable rate limiting entirely.
    pub fn with_interval(mut self, category: AlertCategory, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(anyhow!(
                "cooldown interval for {} must be greater than zero",
                category.as_str()
            ));
        }
        self.cooldowns.insert(category, Cooldown::new(interval));
        Ok(self)
    }

    pub fn interval(&self, category: AlertCategory) -> Option<Duration> {
        self.cooldowns.get(&category).map(Cooldown::interval)
    }

    /// Check-and-set for one category.
    ///
    /// Unregistered categories never fire.
    pub fn should_fire(&mut self, category: AlertCategory, now: Instant) -> bool {
        match self.cooldowns.get_mut(&category) {
            Some(cooldown) => cooldown.try_fire(now),
            None => {
                log::warn!(
                    "alert category {} has no configured interval; suppressing",
                    category.as_str()
                );
                false
            }
        }
    }
}

/// Alert policy shared across threads. The lock spans the whole
/// check-and-set, which keeps it atomic per category.
#[derive(Clone, Debug, Default)]
pub struct SharedAlertPolicy {
    inner: Arc<Mutex<AlertPolicy>>,
}

impl SharedAlertPolicy {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(policy)),
        }
    }

    pub fn should_fire(&self, category: AlertCategory, now: Instant) -> Result<bool> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("alert policy lock poisoned"))?;
        Ok(guard.should_fire(category, now))
    }
}
