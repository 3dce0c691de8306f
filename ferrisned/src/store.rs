//! Config store collaborator.
//!
//! The driver never owns device state. It asks the store which schema
//! nodes carry a shutdown leaf (once, at startup) and, while applying,
//! whether a given node is currently disabled.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Read access to the external configuration store.
///
/// Paths are `/`-separated key paths as produced by the transform
/// pipeline, e.g. `service/vpls{10}/sap{1/1/1}/shutdown`.
pub trait ConfigStore: Send + Sync {
    /// Whether a node or leaf exists.
    fn exists(&self, path: &str) -> bool;

    /// Value of a boolean leaf, `None` if it is unset or not boolean.
    fn read_flag(&self, path: &str) -> Option<bool>;

    /// Schema paths (without keys, `/`-terminated) of node types that
    /// have a shutdown leaf.
    fn shutdown_paths(&self) -> Vec<String>;

    /// Whether the disable leaf at `path` is currently set.
    ///
    /// A boolean leaf is read directly; an empty leaf counts as set when
    /// it exists.
    fn is_disabled(&self, path: &str) -> bool {
        self.read_flag(path).unwrap_or_else(|| self.exists(path))
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    present: RwLock<HashSet<String>>,
    flags: RwLock<HashMap<String, bool>>,
    shutdown_paths: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare schema paths that have a shutdown leaf.
    pub fn with_shutdown_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shutdown_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Mark a path as present.
    pub fn insert(&self, path: impl Into<String>) {
        if let Ok(mut present) = self.present.write() {
            present.insert(path.into());
        }
    }

    /// Set a boolean leaf.
    pub fn set_flag(&self, path: impl Into<String>, value: bool) {
        let path = path.into();
        self.insert(path.clone());
        if let Ok(mut flags) = self.flags.write() {
            flags.insert(path, value);
        }
    }
}

impl ConfigStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.present
            .read()
            .map(|present| present.contains(path))
            .unwrap_or(false)
    }

    fn read_flag(&self, path: &str) -> Option<bool> {
        self.flags.read().ok().and_then(|flags| flags.get(path).copied())
    }

    fn shutdown_paths(&self) -> Vec<String> {
        self.shutdown_paths.clone()
    }
}
