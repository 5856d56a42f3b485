//! procward Core Library
//!
//! Core library for procward - keeps chosen applications alive and stops
//! unwanted ones. Provides the entry model, process snapshots and matching,
//! the exclusion policy, action execution and the enforcement engine.

pub mod engine;
pub mod error;
pub mod exclusion;
pub mod executor;
pub mod history;
pub mod matching;
pub mod scanner;
pub mod settings;
pub mod state;
pub mod store;
pub mod types;

pub use engine::{Engine, Slot, TargetKey, TargetStatus, TickInput, TickReport};
pub use error::{Error, Result};
pub use exclusion::{ExclusionPolicy, ExclusionSet};
pub use executor::{ActionExecutor, ProcessExecutor};
pub use history::{
    EngineEvent, EventType, FanoutSink, HistorySink, JsonlHistory, RecordingSink, TracingSink,
};
pub use matching::{bare_name, ProcessSnapshot};
pub use scanner::{ProcessScanner, SnapshotProvider};
pub use settings::{EngineSettings, RetryPolicy};
pub use state::{Observation, Phase, RuntimeState};
pub use types::{
    EngineStats, EntryDescriptor, EntryId, EntryKind, KillerEntry, LaunchMode, LauncherEntry,
    ProcessInfo, SaveDataSet,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
