//! Local process name registry.
//!
//! A thread-safe `name → Pid` map for process discovery. Registration is
//! atomic insert-if-absent; lookups are point reads. The registry performs no
//! liveness tracking; a stale entry persists until explicitly removed.
//!
//! The free functions operate on a process-wide singleton, lazily initialized
//! on first use. Callers may include arbitrary threads, not only the
//! cooperative scheduler, so mutations are serialized behind a mutex.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::pid::Pid;

/// Thread-safe name→pid map.
#[derive(Debug, Default)]
pub struct Registry {
    names: Mutex<HashMap<String, Pid>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pid` under `name` if the name is free.
    ///
    /// Returns `false` (without touching the existing entry) when the name is
    /// already taken. Never errors.
    pub fn register(&self, name: impl Into<String>, pid: Pid) -> bool {
        let name = name.into();
        let mut names = self.names.lock();
        if names.contains_key(&name) {
            return false;
        }
        names.insert(name, pid);
        true
    }

    /// Remove `name`; returns whether an entry existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.names.lock().remove(name).is_some()
    }

    /// Look up the pid registered under `name`.
    #[must_use]
    pub fn whereis(&self, name: &str) -> Option<Pid> {
        self.names.lock().get(name).cloned()
    }

    /// Snapshot of all registered names.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.names.lock().keys().cloned().collect()
    }
}

fn global() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(Registry::new)
}

/// Register a pid in the process-wide registry. See [`Registry::register`].
pub fn register(name: impl Into<String>, pid: Pid) -> bool {
    global().register(name, pid)
}

/// Unregister a name from the process-wide registry.
pub fn unregister(name: &str) -> bool {
    global().unregister(name)
}

/// Look up a name in the process-wide registry.
#[must_use]
pub fn whereis(name: &str) -> Option<Pid> {
    global().whereis(name)
}

/// All names in the process-wide registry.
#[must_use]
pub fn registered() -> Vec<String> {
    global().registered()
}
