//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use arbor::mailbox::{Mailbox, ReceiveArm};
use arbor::pattern::{Pattern, ANY};
use arbor::term::{Term, TermKind};
use arbor::Pid;

/// Initialize tracing for tests; safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .with_ansi(false)
        .try_init();
}

/// Log a test phase transition.
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
    };
}

/// Log test completion.
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// A pid + mailbox pair usable as a message sink for observations.
pub fn monitor() -> (Pid, Arc<Mailbox>) {
    let mailbox = Arc::new(Mailbox::new());
    let pid = Pid::new(&mailbox);
    (pid, mailbox)
}

/// Wait for a `("started", child_id, pid)` report and return the pid.
pub async fn recv_started(mailbox: &Mailbox, child_id: &str, timeout: Duration) -> Pid {
    let term = mailbox
        .receive(
            vec![ReceiveArm::new(
                Pattern::tuple(vec![
                    Pattern::literal("started"),
                    Pattern::literal(child_id),
                    Pattern::of_type(TermKind::Pid),
                ]),
                |mut b: Vec<Term>| b.remove(0),
            )],
            Some(timeout),
        )
        .await
        .expect("expected a started report");
    term.as_pid().expect("started report carries a pid").clone()
}

/// Wait for a `("down", child_id, pid, reason)` report and return the reason.
pub async fn recv_down(mailbox: &Mailbox, child_id: &str, pid: &Pid, timeout: Duration) -> String {
    mailbox
        .receive(
            vec![ReceiveArm::new(
                Pattern::tuple(vec![
                    Pattern::literal("down"),
                    Pattern::literal(child_id),
                    Pattern::literal(Term::from(pid.clone())),
                    Pattern::of_type(TermKind::Str),
                ]),
                |mut b: Vec<Term>| b.remove(0),
            )],
            Some(timeout),
        )
        .await
        .expect("expected a down report")
        .as_str()
        .expect("down report carries a reason string")
        .to_owned()
}

/// Receive the next message of any shape.
pub async fn recv_any(mailbox: &Mailbox, timeout: Duration) -> Option<Term> {
    mailbox
        .receive(
            vec![ReceiveArm::new(ANY, |mut b: Vec<Term>| b.remove(0))],
            Some(timeout),
        )
        .await
        .ok()
}
