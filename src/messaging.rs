//! Messaging: `send`, `cast`, and `call`, plus the reserved protocol tags.
//!
//! Protocol messages are tagged tuples; the tags below are reserved at the
//! wire-shape level. User code must not send messages whose first element
//! collides with a reserved tag unless it is deliberately impersonating the
//! protocol.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::error::ReceiveTimeout;
use crate::mailbox::{Mailbox, ReceiveArm};
use crate::pattern::{Pattern, ANY};
use crate::pid::{Pid, Ref};
use crate::term::Term;

/// Tag of a request/reply request: `("$call", ref, reply_to, request)`.
pub const TAG_CALL: &str = "$call";
/// Tag of a fire-and-forget request: `("$cast", request)`.
pub const TAG_CAST: &str = "$cast";
/// Tag of a call reply: `("$reply", ref, value)`.
pub const TAG_REPLY: &str = "$reply";
/// Tag of a child exit notification: `("$child_down", id, pid, reason)`.
pub const TAG_CHILD_DOWN: &str = "$child_down";
/// Tag of the terminate-child supervisor command.
pub const TAG_TERMINATE_CHILD: &str = "$terminate_child";
/// Tag of the restart-child supervisor command.
pub const TAG_RESTART_CHILD: &str = "$restart_child";
/// Tag of the which-children supervisor query.
pub const TAG_WHICH_CHILDREN: &str = "$which_children";
/// Tag of the count-children supervisor query.
pub const TAG_COUNT_CHILDREN: &str = "$count_children";
/// Tag of a background task success: `("$task_success", task_pid, result)`.
pub const TASK_SUCCESS: &str = "$task_success";
/// Tag of a background task failure: `("$task_failure", task_pid, reason)`.
pub const TASK_FAILURE: &str = "$task_failure";

/// Default deadline for [`call`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Enqueue `message` into `pid`'s mailbox.
///
/// Fire-and-forget: if the addressed process is gone, the message is dropped
/// silently. No backpressure, no error.
pub fn send(pid: &Pid, message: Term) {
    match pid.route() {
        Some(mailbox) => mailbox.put(message),
        None => trace!(to = %pid, "message to dead pid dropped"),
    }
}

/// Send a fire-and-forget request: `("$cast", request)`.
pub fn cast(pid: &Pid, request: Term) {
    send(pid, Term::tuple(vec![Term::from(TAG_CAST), request]));
}

/// Request/reply with the default timeout.
///
/// See [`call_timeout`].
pub async fn call(pid: &Pid, request: Term) -> Result<Term, ReceiveTimeout> {
    call_timeout(pid, request, DEFAULT_CALL_TIMEOUT).await
}

/// Request/reply against `pid`.
///
/// Allocates an ephemeral one-shot mailbox and a fresh [`Ref`], sends
/// `("$call", ref, reply_to, request)`, and awaits `("$reply", ref, value)`
/// on the ephemeral mailbox. The reply never races messages on the caller's
/// primary mailbox. On return or timeout the ephemeral mailbox is dropped,
/// so a late reply is silently discarded.
pub async fn call_timeout(
    pid: &Pid,
    request: Term,
    timeout: Duration,
) -> Result<Term, ReceiveTimeout> {
    let reply_mailbox = Arc::new(Mailbox::new());
    let reply_to = Pid::new(&reply_mailbox);
    let call_ref = Ref::new();

    send(
        pid,
        Term::tuple(vec![
            Term::from(TAG_CALL),
            Term::from(call_ref),
            Term::from(reply_to),
            request,
        ]),
    );

    let reply_pattern = Pattern::tuple(vec![
        Pattern::literal(TAG_REPLY),
        Pattern::literal(call_ref),
        ANY,
    ]);
    reply_mailbox
        .receive(
            vec![ReceiveArm::new(reply_pattern, |mut bindings: Vec<Term>| {
                bindings.remove(0)
            })],
            Some(timeout),
        )
        .await
    // reply_mailbox drops here; the reply pid becomes unroutable.
}
