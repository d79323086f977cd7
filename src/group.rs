//! Structured concurrency: task groups and cancel scopes.
//!
//! Every task the runtime spawns lives inside a [`TaskGroup`]; there are no
//! detached workers. A group pairs task ownership (waiting for quiescence)
//! with a node in the cancellation tree: cancelling a group cancels every
//! task spawned in it and in its child groups.
//!
//! [`CancelScope`] is the targeted counterpart: a handle to one node of the
//! cancellation tree, used to cancel a single actor and its descendants.
//!
//! # Example
//!
//! ```ignore
//! let group = TaskGroup::new();
//! let pid = actor::start(&group, Worker::new());
//! // ...
//! group.shutdown().await; // cancel everything, wait for quiescence
//! ```

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Owner of a set of tasks and a node in the cancellation tree.
///
/// Clones share the same tracker and token. [`TaskGroup::child`] derives a
/// group whose token is a child of this one: cancelling the parent cancels
/// the child, not vice versa.
#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl TaskGroup {
    /// Create a root group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child group: same tracker, child cancellation token.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Spawn a task owned by this group.
    ///
    /// The task is tracked for quiescence but not automatically cancelled;
    /// it must observe the group's cancellation itself (the actor driver
    /// does).
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future);
    }

    /// A scope handle for this group's cancellation node.
    #[must_use]
    pub fn cancel_scope(&self) -> CancelScope {
        CancelScope {
            token: self.cancel.clone(),
        }
    }

    /// Cancel this group and all of its descendants.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel everything in the group and wait for all tasks to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Wait for all tasks to finish without cancelling them.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Handle for cancelling one node of the cancellation tree.
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: CancellationToken,
}

impl CancelScope {
    /// Request cancellation of the scope and its descendants.
    ///
    /// Delivery is cooperative: the owning task observes it at its next
    /// suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
