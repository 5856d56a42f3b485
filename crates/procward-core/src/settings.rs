use crate::types::EntryKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Floor for cool-downs so consecutive failures always move the deadline forward
const MIN_COOLDOWN: Duration = Duration::from_millis(1);

/// Engine tunables, re-read at the start of every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub polling_interval: Duration,
    pub relaunch_delay: Duration,
    /// 0 = unlimited
    pub max_relaunch_retries: u32,
    pub kill_delay: Duration,
    /// 0 = unlimited
    pub max_killer_retries: u32,
    /// Apply the exclusion set to launcher targets as well as killers
    pub guard_launchers: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(1),
            relaunch_delay: Duration::from_secs(3),
            max_relaunch_retries: 5,
            kill_delay: Duration::ZERO,
            max_killer_retries: 3,
            guard_launchers: false,
        }
    }
}

impl EngineSettings {
    pub fn retry_policy(&self, kind: EntryKind) -> RetryPolicy {
        let (delay, max_retries) = match kind {
            EntryKind::Launcher => (self.relaunch_delay, self.max_relaunch_retries),
            EntryKind::Killer => (self.kill_delay, self.max_killer_retries),
        };

        RetryPolicy {
            delay,
            cooldown: delay.max(self.polling_interval).max(MIN_COOLDOWN),
            max_retries,
        }
    }
}

/// Delay and retry rules for one kind of target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait from first observation before the first action
    pub delay: Duration,
    /// Wait after a failed action before the next attempt
    pub cooldown: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_retries > 0 && failures >= self.max_retries
    }
}
