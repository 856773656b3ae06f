//! Wait for the user to step away before touching the installation.
//!
//! The gate samples host idle time once per tick. It stops as soon as one
//! sample reaches the threshold, or gives up after a fixed number of ticks.
//! A sample that cannot be read counts as zero, so a broken sampler never
//! lets an install start while someone may be at the keyboard.

use std::time::Duration;

use crate::config::IdleConfig;
use crate::host::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// Still waiting; `tick` samples taken so far
    Polling { tick: u32 },
    ThresholdMet { tick: u32, idle_secs: u64 },
    TimedOut { ticks: u32 },
}

/// Final decision of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    ThresholdMet { tick: u32, idle_secs: u64 },
    TimedOut { ticks: u32 },
}

impl IdleState {
    /// The decision, once the gate has stopped polling
    pub fn outcome(&self) -> Option<IdleOutcome> {
        match *self {
            Self::Polling { .. } => None,
            Self::ThresholdMet { tick, idle_secs } => Some(IdleOutcome::ThresholdMet { tick, idle_secs }),
            Self::TimedOut { ticks } => Some(IdleOutcome::TimedOut { ticks }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdleGate {
    threshold_secs: u64,
    max_ticks: u32,
    interval: Duration,
    state: IdleState,
}

impl IdleGate {
    pub fn new(config: &IdleConfig) -> Self {
        let state = if config.max_ticks == 0 {
            IdleState::TimedOut { ticks: 0 }
        } else {
            IdleState::Polling { tick: 0 }
        };

        Self {
            threshold_secs: config.threshold_secs,
            max_ticks: config.max_ticks,
            interval: Duration::from_secs(config.interval_secs),
            state,
        }
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    /// Feed one sample. `None` (unreadable) is treated as zero idle seconds.
    pub fn observe(&mut self, sample: Option<u64>) -> IdleState {
        let IdleState::Polling { tick } = self.state else {
            return self.state;
        };

        let tick = tick + 1;
        let idle_secs = sample.unwrap_or(0);

        self.state = if idle_secs >= self.threshold_secs {
            IdleState::ThresholdMet { tick, idle_secs }
        } else if tick >= self.max_ticks {
            IdleState::TimedOut { ticks: tick }
        } else {
            IdleState::Polling { tick }
        };

        self.state
    }

    /// Poll the host until the gate reaches a final state.
    /// Sleeps only between ticks, never after the last one.
    pub fn wait(mut self, host: &dyn Host) -> IdleOutcome {
        loop {
            if let Some(outcome) = self.state.outcome() {
                return outcome;
            }

            let sample = match host.idle_seconds() {
                Ok(secs) => Some(secs),
                Err(e) => {
                    log::warn!("Idle time unavailable, assuming user is active: {:#}", e);
                    None
                }
            };

            let state = self.observe(sample);
            log::debug!("Idle sample {:?} -> {:?}", sample, state);

            if state.outcome().is_none() {
                host.sleep(self.interval);
            }
        }
    }
}
