use crate::reload::ReloadHandles;
use crate::status::EngineStatus;
use anyhow::anyhow;
use procward_core::{
    Engine, EngineSettings, EngineStats, ExclusionPolicy, ExclusionSet, SaveDataSet,
    SnapshotProvider, TargetStatus, TickInput, TickReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Engine plus its snapshot source, moved onto a blocking thread for each tick
pub struct TickWorker {
    engine: Engine,
    provider: Box<dyn SnapshotProvider>,
}

/// Result of one completed tick
#[derive(Debug, Clone)]
pub struct TickSummary {
    pub report: TickReport,
    pub process_count: usize,
    pub protected_names: usize,
    pub stats: EngineStats,
    pub targets: Vec<TargetStatus>,
}

impl TickWorker {
    pub fn new(engine: Engine, provider: Box<dyn SnapshotProvider>) -> Self {
        Self { engine, provider }
    }

    /// Snapshot the process table and run the engine once
    ///
    /// Returns `None` when no snapshot could be taken; runtime state is left
    /// untouched in that case.
    pub fn run_tick(
        &mut self,
        entries: &SaveDataSet,
        settings: &EngineSettings,
        exclusions: &ExclusionSet,
    ) -> Option<TickSummary> {
        let snapshot = match self.provider.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Process snapshot failed, skipping tick: {}", e);
                return None;
            }
        };

        let now = Instant::now();
        let report = self.engine.tick(TickInput {
            now,
            snapshot: &snapshot,
            entries,
            settings,
            exclusions,
        });

        Some(TickSummary {
            report,
            process_count: snapshot.len(),
            protected_names: exclusions.len(),
            stats: self.engine.stats().clone(),
            targets: self.engine.targets(now),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}

/// Enforcement loop
///
/// Pulls the latest entries, settings and exclusions at the start of every
/// tick, runs the engine off the async runtime and writes the status file.
pub struct EnforcementLoop {
    worker: Option<TickWorker>,
    handles: ReloadHandles,
    exclusions: Arc<ExclusionPolicy>,
    status_path: Option<PathBuf>,
    started: Instant,
}

impl EnforcementLoop {
    pub fn new(
        worker: TickWorker,
        handles: ReloadHandles,
        exclusions: Arc<ExclusionPolicy>,
    ) -> Self {
        Self {
            worker: Some(worker),
            handles,
            exclusions,
            status_path: None,
            started: Instant::now(),
        }
    }

    /// Rewrite this file with an [`EngineStatus`] after every tick
    pub fn with_status_path(mut self, path: PathBuf) -> Self {
        self.status_path = Some(path);
        self
    }

    /// Run a single tick
    ///
    /// `Ok(None)` means the tick was skipped because the snapshot failed.
    pub async fn tick(&mut self) -> anyhow::Result<Option<TickSummary>> {
        // Flag and value come from the same read so no publish slips between them
        let (entries, entries_changed) = {
            let current = self.handles.entries.borrow_and_update();
            (Arc::clone(&current), current.has_changed())
        };
        let settings = self.handles.settings.borrow_and_update().clone();
        let exclusions = self.exclusions.snapshot();

        let mut worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("tick worker lost after an earlier failure"))?;

        let (worker, summary) = tokio::task::spawn_blocking(move || {
            if entries_changed {
                worker.engine_mut().on_reload();
            }
            let summary = worker.run_tick(&entries, &settings, &exclusions);
            (worker, summary)
        })
        .await
        .map_err(|e| anyhow!("tick worker panicked: {}", e))?;
        self.worker = Some(worker);

        if let Some(summary) = &summary {
            if summary.report.actions() > 0 || summary.report.exhausted > 0 {
                info!(
                    "Tick: launches={}, terminations={}, failures={}, exhausted={}",
                    summary.report.launches,
                    summary.report.terminations,
                    summary.report.failures,
                    summary.report.exhausted
                );
            }
            self.write_status(summary);
        }

        Ok(summary)
    }

    fn write_status(&self, summary: &TickSummary) {
        let Some(path) = &self.status_path else {
            return;
        };

        let status = EngineStatus::new(
            self.started.elapsed(),
            summary.process_count,
            summary.protected_names,
            &summary.stats,
            &summary.targets,
        );
        if let Err(e) = status.write_to(path) {
            warn!("Failed to write status file {:?}: {}", path, e);
        }
    }

    /// Tick until cancelled, sleeping one polling interval between ticks
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<EngineStats> {
        info!(
            "Enforcement loop started, polling every {:?}",
            self.handles.settings.borrow().polling_interval
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.tick().await {
                error!("Enforcement loop stopped: {}", e);
                return Err(e);
            }

            let interval = self.handles.settings.borrow().polling_interval;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        let stats = self.stats();
        info!(
            "Enforcement loop stopped after {} ticks: launches={}, terminations={}, failures={}",
            stats.total_ticks, stats.total_launches, stats.total_terminations, stats.total_failures
        );
        debug!("Final stats: {:?}", stats);
        Ok(stats)
    }

    pub fn stats(&self) -> EngineStats {
        self.worker
            .as_ref()
            .map(|w| w.engine().stats().clone())
            .unwrap_or_default()
    }
}
