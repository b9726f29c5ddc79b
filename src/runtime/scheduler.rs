//! Cooperative named timers.
//!
//! There is no background thread: the runtime advances the scheduler with the
//! elapsed time carried by each `Tick` signal and dispatches whatever fell due.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Stable name of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey(&'static str);

impl TimerKey {
    pub const HEARTBEAT: TimerKey = TimerKey("heartbeat");
    pub const SETUP_TIMEOUT: TimerKey = TimerKey("setup-timeout");
    pub const METRICS: TimerKey = TimerKey("metrics");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    due: Duration,
    every: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    timers: BTreeMap<TimerKey, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time accumulated from ticks so far.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Arm (or re-arm) a one-shot timer.
    pub fn schedule_once(&mut self, key: TimerKey, after: Duration) {
        self.timers.insert(
            key,
            Timer {
                due: self.now + after,
                every: None,
            },
        );
    }

    /// Arm (or re-arm) a repeating timer. A zero period is ignored.
    pub fn schedule_every(&mut self, key: TimerKey, every: Duration) {
        if every.is_zero() {
            return;
        }
        self.timers.insert(
            key,
            Timer {
                due: self.now + every,
                every: Some(every),
            },
        );
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.timers.remove(&key).is_some()
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        self.timers.clear();
        count
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.timers.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Move the clock forward and return the timers that fell due, earliest
    /// first. A repeating timer fires at most once per call and re-arms one
    /// period after the new clock value.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<TimerKey> {
        self.now += elapsed;
        let now = self.now;

        let mut fired: Vec<(Duration, TimerKey)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .map(|(key, timer)| (timer.due, *key))
            .collect();
        fired.sort();

        for (_, key) in &fired {
            let rearm = self.timers.get(key).and_then(|t| t.every);
            match rearm {
                Some(every) => {
                    if let Some(timer) = self.timers.get_mut(key) {
                        timer.due = now + every;
                    }
                }
                None => {
                    self.timers.remove(key);
                }
            }
        }

        fired.into_iter().map(|(_, key)| key).collect()
    }
}
