//! Process exclusion policy
//!
//! Holds the protected process names the engine must never terminate. The
//! current set is an immutable [`ExclusionSet`] behind an `Arc` that is
//! swapped whole on reload; readers keep the `Arc` they took for as long as
//! they need a consistent view.

use crate::matching::bare_name;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Critical OS processes that are always protected
pub const REQUIRED_BASELINE: &[&str] = &[
    "system",
    "system idle process",
    "secure system",
    "registry",
    "memory compression",
    "smss",
    "csrss",
    "wininit",
    "winlogon",
    "services",
    "lsass",
    "lsaiso",
    "svchost",
    "fontdrvhost",
    "dwm",
];

/// Immutable set of protected bare names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    /// Baseline plus the running executable's own name
    pub fn baseline() -> Self {
        let mut names: HashSet<String> = REQUIRED_BASELINE.iter().map(|n| bare_name(n)).collect();

        if let Some(own) = own_process_name() {
            names.insert(own);
        }

        Self { names }
    }

    /// Baseline extended with user-supplied names
    pub fn with_additions<I, S>(additions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::baseline();
        for name in additions {
            let normalized = bare_name(name.as_ref());
            if !normalized.is_empty() {
                set.names.insert(normalized);
            }
        }
        set
    }

    /// Parse the exclusion list format: one name per line, `#` comments
    pub fn parse(content: &str) -> Self {
        let additions = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty());

        Self::with_additions(additions)
    }

    pub fn contains(&self, name_or_path: &str) -> bool {
        let normalized = bare_name(name_or_path);
        if normalized.is_empty() {
            return false;
        }
        self.names.contains(&normalized)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::baseline()
    }
}

fn own_process_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let name = exe.file_name()?.to_string_lossy().to_string();
    let normalized = bare_name(&name);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Shared, reloadable exclusion policy
///
/// Queries and reloads may run on different threads. Every reload builds a
/// fresh set and replaces the reference in one step, then bumps the change
/// counter observed through [`ExclusionPolicy::subscribe`].
#[derive(Debug)]
pub struct ExclusionPolicy {
    current: RwLock<Arc<ExclusionSet>>,
    changes: watch::Sender<u64>,
}

impl ExclusionPolicy {
    pub fn new(set: ExclusionSet) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            current: RwLock::new(Arc::new(set)),
            changes,
        }
    }

    /// Build from a file, falling back to the baseline on any problem
    pub fn from_file(path: &Path) -> Self {
        Self::new(load_set(path))
    }

    pub fn is_excluded(&self, name_or_path: &str) -> bool {
        self.snapshot().contains(name_or_path)
    }

    /// The set in effect right now; unaffected by later reloads
    pub fn snapshot(&self) -> Arc<ExclusionSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn replace(&self, set: ExclusionSet) {
        let fresh = Arc::new(set);
        let count = fresh.len();
        match self.current.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        self.changes.send_modify(|version| *version += 1);
        debug!("Exclusion set replaced ({} names)", count);
    }

    /// Re-read the exclusion file and swap the set in
    pub fn reload_from_file(&self, path: &Path) -> usize {
        let set = load_set(path);
        let count = set.len();
        self.replace(set);
        count
    }

    /// Receiver whose value changes after every replace
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.changes.borrow()
    }
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(ExclusionSet::baseline())
    }
}

fn load_set(path: &Path) -> ExclusionSet {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let set = ExclusionSet::parse(&content);
            info!("Loaded exclusions from {:?} ({} names)", path, set.len());
            set
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Exclusion file {:?} not found, using baseline", path);
            ExclusionSet::baseline()
        }
        Err(e) => {
            warn!(
                "Failed to read exclusion file {:?}: {}, using baseline",
                path, e
            );
            ExclusionSet::baseline()
        }
    }
}
