//! Error types.

use std::time::Duration;

/// Boxed error returned by actor hooks.
///
/// Anything implementing [`std::error::Error`] converts in via `?`; plain
/// strings convert through `.into()`.
pub type ActorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for actor hooks.
pub type ActorResult<T> = Result<T, ActorError>;

/// No message matching any supplied pattern arrived before the deadline.
///
/// Raised to the caller of [`Mailbox::receive`](crate::mailbox::Mailbox::receive)
/// and [`call`](crate::messaging::call); it never crosses a process boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no matching message within {timeout:?}")]
pub struct ReceiveTimeout {
    /// The timeout that elapsed.
    pub timeout: Duration,
}

/// A supervisor saw more restarts than its limit allows within the window.
///
/// The supervisor exits abnormally with this error; its own parent decides
/// what follows. The rendered message deliberately carries the type name so
/// the legacy reason-string contract (`"error"` plus the error name) holds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "MaxRestartsExceeded: child {child_id} exceeded the restart limit \
     ({max_restarts} restarts in {window:?})"
)]
pub struct MaxRestartsExceeded {
    /// The child whose restart tripped the limit.
    pub child_id: String,
    /// Maximum restarts tolerated within the window.
    pub max_restarts: u32,
    /// Sliding window the restarts are counted in.
    pub window: Duration,
}
