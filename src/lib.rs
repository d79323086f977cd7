//! Arbor: Erlang/OTP-style actors, generic servers, and supervision trees
//! on Tokio.
//!
//! # Overview
//!
//! Arbor brings the classic OTP process model to a cooperative Rust
//! scheduler: addressable processes with private mailboxes and selective
//! receive, a generic server template for request/reply and fire-and-forget
//! interactions, and supervisors that restart failed children under
//! declarative policies. All processes live inside task groups (no task is
//! ever detached) and cancellation flows down the ownership tree.
//!
//! # Core guarantees
//!
//! - **Per-mailbox FIFO**: enqueue order is preserved; selective receive
//!   skips but never reorders.
//! - **Exactly-once delivery** per enqueue; a crash erases in-flight
//!   messages (no persistence).
//! - **Failure containment**: a handler error or panic terminates its own
//!   actor and is translated to an exit reason; it never tears down the
//!   owning task group directly.
//! - **Structured concurrency**: every task is owned by a [`TaskGroup`];
//!   cancelling an actor cancels its descendants.
//!
//! # Module structure
//!
//! - [`term`]: dynamic message values
//! - [`pattern`]: structural matcher for selective receive
//! - [`pid`]: process identifiers and correlation tokens
//! - [`mailbox`]: FIFO buffer with selective receive
//! - [`group`]: task groups and cancel scopes
//! - [`actor`]: lifecycle driver and failure translation
//! - [`messaging`]: `send` / `cast` / `call` and the protocol tags
//! - [`gen_server`]: the generic server template
//! - [`supervisor`]: child specs, restart policies, supervision
//! - [`registry`]: local name registry
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod actor;
pub mod error;
pub mod gen_server;
pub mod group;
pub mod mailbox;
pub mod messaging;
pub mod pattern;
pub mod pid;
pub mod registry;
pub mod supervisor;
pub mod term;

#[cfg(test)]
pub(crate) mod test_utils;

pub use actor::{
    start, start_link, Actor, ActorContext, ActorHandle, ExitHook, ExitReason, Lifecycle,
};
pub use error::{ActorError, ActorResult, MaxRestartsExceeded, ReceiveTimeout};
pub use gen_server::{GenServer, GenServerActor};
pub use group::{CancelScope, TaskGroup};
pub use mailbox::{Mailbox, ReceiveArm};
pub use messaging::{call, call_timeout, cast, send, DEFAULT_CALL_TIMEOUT};
pub use pattern::{match_term, Pattern, ANY, IGNORE};
pub use pid::{Pid, Ref};
pub use registry::{register, registered, unregister, whereis, Registry};
pub use supervisor::{ChildSpec, RestartLimit, RestartStrategy, RestartType, Supervisor};
pub use term::{Term, TermKind};
