//! procward Daemon
//!
//! Supervisor daemon for procward - keeps launcher targets running and
//! terminates killer targets, reloading its inputs while it runs.

pub mod config;
pub mod reload;
pub mod runner;
pub mod status;

pub use config::Config;
pub use reload::{ReloadHandles, Reloader};
pub use runner::{EnforcementLoop, TickSummary, TickWorker};
pub use status::{EngineStatus, TargetRecord};
