//! Process identifiers and correlation tokens.
//!
//! A [`Pid`] is an opaque address: a stable identity plus a weak route to the
//! owning process's mailbox. Pids are freely clonable and compare by identity
//! alone; they never keep the addressed process alive. A [`Ref`] is a unique
//! token minted per request/reply exchange and compared by identity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::mailbox::Mailbox;

static NEXT_PID_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque address of a process's mailbox.
///
/// Equality, hashing, and ordering consider the identity only. The routed
/// mailbox is held weakly: once the owning process exits, sends through the
/// pid are silently dropped.
#[derive(Clone)]
pub struct Pid {
    id: u64,
    route: Weak<Mailbox>,
}

impl Pid {
    /// Mint a new pid addressing `mailbox`.
    #[must_use]
    pub fn new(mailbox: &Arc<Mailbox>) -> Self {
        Self {
            id: NEXT_PID_ID.fetch_add(1, Ordering::Relaxed),
            route: Arc::downgrade(mailbox),
        }
    }

    /// Stable numeric identity.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the addressed mailbox still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.route.strong_count() > 0
    }

    pub(crate) fn route(&self) -> Option<Arc<Mailbox>> {
        self.route.upgrade()
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pid {}

impl Hash for Pid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Pid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<0.{}.0>", self.id)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.id)
    }
}

/// Unique correlation token for request/reply matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref(u64);

impl Ref {
    /// Mint a fresh token.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(NEXT_REF_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#Ref<0.{}>", self.0)
    }
}
