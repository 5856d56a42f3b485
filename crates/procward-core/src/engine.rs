//! Enforcement engine
//!
//! Reconciles the launcher and killer entries against one process snapshot
//! per tick and drives a [`RuntimeState`] per target. The engine is purely
//! level-triggered: every tick re-derives what to do from the snapshot it is
//! given, so it holds no OS handles and can be driven from tests with
//! scripted snapshots and a fake executor.

use crate::exclusion::ExclusionSet;
use crate::executor::ActionExecutor;
use crate::history::{EngineEvent, EventType, HistorySink};
use crate::matching::ProcessSnapshot;
use crate::settings::{EngineSettings, RetryPolicy};
use crate::state::{Observation, Phase, RuntimeState};
use crate::types::{
    EngineStats, EntryDescriptor, EntryId, EntryKind, KillerEntry, LaunchMode, LauncherEntry,
    SaveDataSet,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which descriptor of an entry a state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Primary,
    Auxiliary(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub entry_id: EntryId,
    pub kind: EntryKind,
    pub slot: Slot,
}

impl TargetKey {
    pub fn primary(entry_id: EntryId, kind: EntryKind) -> Self {
        Self {
            entry_id,
            kind,
            slot: Slot::Primary,
        }
    }

    pub fn auxiliary(entry_id: EntryId, index: usize) -> Self {
        Self {
            entry_id,
            kind: EntryKind::Launcher,
            slot: Slot::Auxiliary(index),
        }
    }
}

/// Everything one tick looks at
///
/// The engine reads each reference exactly once per tick, so a reload that
/// happens mid-tick cannot produce a mixed view.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub now: Instant,
    pub snapshot: &'a ProcessSnapshot,
    pub entries: &'a SaveDataSet,
    pub settings: &'a EngineSettings,
    pub exclusions: &'a ExclusionSet,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub launches: u32,
    pub terminations: u32,
    pub failures: u32,
    pub exhausted: u32,
    pub skipped_protected: u32,
}

impl TickReport {
    pub fn actions(&self) -> u32 {
        self.launches + self.terminations + self.failures
    }
}

/// Read-only view of one tracked target
#[derive(Debug, Clone)]
pub struct TargetStatus {
    pub key: TargetKey,
    pub target: String,
    pub phase: Phase,
    pub consecutive_failures: u32,
    pub next_eligible_in: Option<Duration>,
    pub last_known_pid: Option<u32>,
}

#[derive(Debug)]
struct Tracked {
    target: String,
    state: RuntimeState,
}

enum Action<'a> {
    Launch(&'a EntryDescriptor),
    Terminate(Vec<u32>),
}

pub struct Engine {
    executor: Box<dyn ActionExecutor>,
    sink: Arc<dyn HistorySink>,
    tracked: HashMap<TargetKey, Tracked>,
    stats: EngineStats,
    own_pid: u32,
}

impl Engine {
    pub fn new(executor: Box<dyn ActionExecutor>, sink: Arc<dyn HistorySink>) -> Self {
        Self {
            executor,
            sink,
            tracked: HashMap::new(),
            stats: EngineStats::new(),
            own_pid: std::process::id(),
        }
    }

    /// Run one poll-evaluate-act cycle
    pub fn tick(&mut self, input: TickInput<'_>) -> TickReport {
        let mut report = TickReport::default();
        let mut seen = HashSet::new();

        for killer in input.entries.enabled_killers() {
            self.evaluate_killer(killer, &input, &mut seen, &mut report);
        }

        for launcher in input.entries.enabled_launchers() {
            self.evaluate_launcher(launcher, &input, &mut seen, &mut report);
        }

        // Disabled or deleted entries lose their state here
        let before = self.tracked.len();
        self.tracked.retain(|key, _| seen.contains(key));
        let dropped = before - self.tracked.len();
        if dropped > 0 {
            debug!("Dropped runtime state for {} targets", dropped);
        }

        self.stats.record_tick(Utc::now().timestamp());
        debug!(
            "Tick #{}: {} processes, {} tracked, {:?}",
            self.stats.total_ticks,
            input.snapshot.len(),
            self.tracked.len(),
            report
        );
        report
    }

    fn evaluate_killer(
        &mut self,
        entry: &KillerEntry,
        input: &TickInput<'_>,
        seen: &mut HashSet<TargetKey>,
        report: &mut TickReport,
    ) {
        let descriptor = &entry.primary;
        if descriptor.is_blank() {
            warn!("Killer entry {} has neither name nor path, skipping", entry.id);
            return;
        }

        let target = descriptor.target_name();
        if input.exclusions.contains(&target) {
            debug!(
                "Killer entry {} targets protected process '{}', skipping",
                entry.id, target
            );
            report.skipped_protected += 1;
            return;
        }

        let victims: Vec<u32> = input
            .snapshot
            .find(descriptor)
            .into_iter()
            .filter(|p| p.pid != self.own_pid && !input.exclusions.contains(&p.name))
            .map(|p| p.pid)
            .collect();

        let observation = if victims.is_empty() {
            Observation::Clear
        } else {
            Observation::Present
        };

        let key = TargetKey::primary(entry.id, EntryKind::Killer);
        seen.insert(key);
        let policy = input.settings.retry_policy(EntryKind::Killer);
        self.drive(
            key,
            &target,
            observation,
            input.now,
            &policy,
            Action::Terminate(victims),
            report,
        );
    }

    fn evaluate_launcher(
        &mut self,
        entry: &LauncherEntry,
        input: &TickInput<'_>,
        seen: &mut HashSet<TargetKey>,
        report: &mut TickReport,
    ) {
        let descriptor = &entry.primary;
        if descriptor.is_blank() {
            warn!(
                "Launcher entry {} has neither name nor path, skipping",
                entry.id
            );
            return;
        }

        let guarded = input.settings.guard_launchers;
        let policy = input.settings.retry_policy(EntryKind::Launcher);
        let target = descriptor.target_name();

        if guarded && input.exclusions.contains(&target) {
            debug!(
                "Launcher entry {} targets protected process '{}', skipping",
                entry.id, target
            );
            report.skipped_protected += 1;
            return;
        }

        let running = input.snapshot.find(descriptor);
        let primary_running = !running.is_empty();

        if entry.mode == LaunchMode::Launch {
            let key = TargetKey::primary(entry.id, EntryKind::Launcher);
            seen.insert(key);

            let observation = if primary_running {
                Observation::Clear
            } else {
                Observation::Present
            };
            self.drive(
                key,
                &target,
                observation,
                input.now,
                &policy,
                Action::Launch(descriptor),
                report,
            );

            if let (Some(process), Some(tracked)) = (running.first(), self.tracked.get_mut(&key)) {
                tracked.state.observe_pid(process.pid);
            }
        }

        for (index, auxiliary) in entry.auxiliaries.iter().enumerate() {
            if !auxiliary.is_active_companion() || auxiliary.is_blank() {
                continue;
            }

            let aux_target = auxiliary.target_name();
            if guarded && input.exclusions.contains(&aux_target) {
                report.skipped_protected += 1;
                continue;
            }

            let key = TargetKey::auxiliary(entry.id, index);
            seen.insert(key);

            // Companions wait for a primary that is actually up
            let observation = if !primary_running {
                Observation::Paused
            } else if input.snapshot.is_running(auxiliary) {
                Observation::Clear
            } else {
                Observation::Present
            };
            self.drive(
                key,
                &aux_target,
                observation,
                input.now,
                &policy,
                Action::Launch(auxiliary),
                report,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn drive(
        &mut self,
        key: TargetKey,
        target: &str,
        observation: Observation,
        now: Instant,
        policy: &RetryPolicy,
        action: Action<'_>,
        report: &mut TickReport,
    ) {
        let sink = self.sink.as_ref();
        let stats = &mut self.stats;
        let tracked = self.tracked.entry(key).or_insert_with(|| Tracked {
            target: target.to_string(),
            state: RuntimeState::new(),
        });
        tracked.target = target.to_string();

        let transition = tracked.state.advance(observation, now, policy);

        if transition.recovered {
            emit(sink, key, target, EventType::Recovered, "condition cleared");
        }

        if transition.detected {
            stats.record_detection();
            let detail = match &action {
                Action::Terminate(pids) => format!("running as {}", pid_list(pids)),
                Action::Launch(_) => "not running".to_string(),
            };
            emit(sink, key, target, EventType::Detected, detail);
        }

        if transition.exhausted {
            stats.record_exhausted();
            report.exhausted += 1;
            emit(
                sink,
                key,
                target,
                EventType::RetriesExhausted,
                format!(
                    "giving up after {} consecutive failures",
                    tracked.state.consecutive_failures
                ),
            );
        }

        if !transition.dispatch {
            return;
        }

        let started = match &action {
            Action::Launch(descriptor) => format!("launching {}", descriptor.launch_target()),
            Action::Terminate(pids) => format!("terminating {}", pid_list(pids)),
        };
        emit(sink, key, target, EventType::ActionStarted, started);

        let outcome = perform(self.executor.as_ref(), &action);
        match outcome {
            Ok(pid) => {
                match action {
                    Action::Launch(_) => {
                        stats.record_launch();
                        report.launches += 1;
                    }
                    Action::Terminate(_) => {
                        stats.record_termination();
                        report.terminations += 1;
                    }
                }
                tracked.state.record_success(pid);
                let detail = pid
                    .map(|p| format!("pid {}", p))
                    .unwrap_or_else(|| "done".to_string());
                emit(sink, key, target, EventType::ActionSucceeded, detail);
            }
            Err(e) => {
                stats.record_failure();
                report.failures += 1;
                tracked.state.record_failure(now, policy);
                emit(
                    sink,
                    key,
                    target,
                    EventType::ActionFailed,
                    format!(
                        "attempt {} failed: {}; next attempt in {:?}",
                        tracked.state.consecutive_failures, e, policy.cooldown
                    ),
                );
            }
        }
    }

    /// Clear exhausted and failing targets after the entries were reloaded
    pub fn on_reload(&mut self) {
        let mut reset = 0;
        for tracked in self.tracked.values_mut() {
            if tracked.state.phase == Phase::RetryExhausted
                || tracked.state.consecutive_failures > 0
            {
                tracked.state.reset();
                reset += 1;
            }
        }
        if reset > 0 {
            info!("Entries reloaded, reset retry state of {} targets", reset);
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn state(&self, key: &TargetKey) -> Option<&RuntimeState> {
        self.tracked.get(key).map(|t| &t.state)
    }

    /// Snapshot of all tracked targets, sorted by entry and slot
    pub fn targets(&self, now: Instant) -> Vec<TargetStatus> {
        let mut targets: Vec<TargetStatus> = self
            .tracked
            .iter()
            .map(|(key, tracked)| TargetStatus {
                key: *key,
                target: tracked.target.clone(),
                phase: tracked.state.phase,
                consecutive_failures: tracked.state.consecutive_failures,
                next_eligible_in: tracked
                    .state
                    .next_eligible_action
                    .map(|t| t.saturating_duration_since(now))
                    .filter(|d| !d.is_zero()),
                last_known_pid: tracked.state.last_known_pid,
            })
            .collect();
        targets.sort_by(|a, b| {
            a.key
                .entry_id
                .cmp(&b.key.entry_id)
                .then(a.key.slot.cmp(&b.key.slot))
        });
        targets
    }
}

fn perform(executor: &dyn ActionExecutor, action: &Action<'_>) -> crate::Result<Option<u32>> {
    match action {
        Action::Launch(descriptor) => executor.launch(descriptor).map(Some),
        Action::Terminate(pids) => {
            let mut errors = Vec::new();
            for pid in pids {
                if let Err(e) = executor.terminate(*pid) {
                    errors.push(e.to_string());
                }
            }
            if errors.is_empty() {
                Ok(None)
            } else {
                Err(crate::Error::Terminate(errors.join("; ")))
            }
        }
    }
}

fn emit(
    sink: &dyn HistorySink,
    key: TargetKey,
    target: &str,
    event_type: EventType,
    detail: impl Into<String>,
) {
    sink.record(&EngineEvent::new(
        key.entry_id,
        key.kind,
        target,
        event_type,
        detail,
    ));
}

fn pid_list(pids: &[u32]) -> String {
    let list: Vec<String> = pids.iter().map(|p| p.to_string()).collect();
    format!("pid {}", list.join(", "))
}
