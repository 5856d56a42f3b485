//! Per-target runtime state machine
//!
//! ```text
//! Idle ──detect──▶ AwaitingAction ──delay──▶ ActionPending ──ok──▶ Idle
//!                        ▲                        │
//!                        │                      fail
//!                        │                        ▼
//!                        └──cool-down passed── CoolingDown ──ceiling──▶ RetryExhausted
//! ```
//!
//! `RetryExhausted` is left only when the condition clears on its own or the
//! entry is reloaded.

use crate::settings::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AwaitingAction,
    ActionPending,
    CoolingDown,
    RetryExhausted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::AwaitingAction => "awaiting_action",
            Phase::ActionPending => "action_pending",
            Phase::CoolingDown => "cooling_down",
            Phase::RetryExhausted => "retry_exhausted",
        };
        write!(f, "{}", s)
    }
}

/// What the current tick saw for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Needs correction: launcher target missing or killer target present
    Present,
    /// Nothing to correct
    Clear,
    /// Not evaluated this tick; state is kept as is
    Paused,
}

/// Outcome of advancing the state machine by one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    pub detected: bool,
    pub dispatch: bool,
    pub exhausted: bool,
    pub recovered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeState {
    pub phase: Phase,
    pub consecutive_failures: u32,
    pub next_eligible_action: Option<Instant>,
    pub last_known_pid: Option<u32>,
    first_observed: Option<Instant>,
    last_observed: Option<Instant>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            consecutive_failures: 0,
            next_eligible_action: None,
            last_known_pid: None,
            first_observed: None,
            last_observed: None,
        }
    }

    /// When the current condition was first seen
    pub fn first_observed(&self) -> Option<Instant> {
        self.first_observed
    }

    /// Advance by one tick
    ///
    /// Sets `dispatch` when the caller must perform the action now and then
    /// report back through [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn advance(&mut self, observation: Observation, now: Instant, policy: &RetryPolicy) -> Transition {
        let mut t = Transition::default();

        match observation {
            Observation::Paused => {}
            Observation::Clear => {
                if self.phase != Phase::Idle || self.consecutive_failures > 0 {
                    t.recovered =
                        self.consecutive_failures > 0 || self.phase == Phase::RetryExhausted;
                    self.phase = Phase::Idle;
                    self.consecutive_failures = 0;
                }
            }
            Observation::Present => {
                if self.phase == Phase::Idle {
                    // A condition that comes back within the delay keeps its
                    // original start time, so flapping cannot postpone action
                    let within_grace = self
                        .last_observed
                        .map(|last| now.saturating_duration_since(last) <= policy.delay)
                        .unwrap_or(false);
                    if self.first_observed.is_none() || !within_grace {
                        self.first_observed = Some(now);
                    }
                    self.phase = Phase::AwaitingAction;
                    t.detected = true;
                }
                self.last_observed = Some(now);

                if self.phase == Phase::CoolingDown {
                    if !self.is_eligible(now) {
                        return t;
                    }
                    if policy.is_exhausted(self.consecutive_failures) {
                        self.phase = Phase::RetryExhausted;
                        t.exhausted = true;
                        return t;
                    }
                    self.phase = Phase::AwaitingAction;
                }

                if self.phase == Phase::AwaitingAction {
                    let first = self.first_observed.unwrap_or(now);
                    let delay_passed = now.saturating_duration_since(first) >= policy.delay;
                    if delay_passed && self.is_eligible(now) {
                        self.phase = Phase::ActionPending;
                        t.dispatch = true;
                    }
                }
            }
        }

        t
    }

    pub fn record_success(&mut self, pid: Option<u32>) {
        self.phase = Phase::Idle;
        self.consecutive_failures = 0;
        self.first_observed = None;
        if pid.is_some() {
            self.last_known_pid = pid;
        }
    }

    pub fn record_failure(&mut self, now: Instant, policy: &RetryPolicy) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let mut next = now + policy.cooldown;
        if let Some(previous) = self.next_eligible_action {
            if next <= previous {
                next = previous + policy.cooldown;
            }
        }
        self.next_eligible_action = Some(next);
        self.phase = Phase::CoolingDown;
    }

    pub fn observe_pid(&mut self, pid: u32) {
        self.last_known_pid = Some(pid);
    }

    /// Back to a fresh `Idle` after a reload or re-enable
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.consecutive_failures = 0;
        self.first_observed = None;
        self.last_observed = None;
    }

    fn is_eligible(&self, now: Instant) -> bool {
        self.next_eligible_action.map(|t| now >= t).unwrap_or(true)
    }
}
