//! FIFO mailbox with selective receive.
//!
//! Each process owns exactly one [`Mailbox`]. Producers enqueue from any task
//! or thread via [`Mailbox::put`], which never blocks and never fails; the
//! single logical consumer drains it with [`Mailbox::receive`], which scans
//! the buffer for the first message matching any of an ordered list of
//! pattern arms, removes that message, runs the winning arm's handler, and
//! returns the handler's value.
//!
//! Ordering: enqueue order is strictly preserved. Selective receive may skip
//! unmatched messages but never reorders the buffer. Each receive scan is
//! O(messages x patterns); mailbox depths are expected to stay small, and
//! indexing would break the selective-receive semantics.
//!
//! Concurrent `receive` calls on one mailbox are not supported; callers must
//! uphold the single-consumer discipline.

use std::collections::VecDeque;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ReceiveTimeout;
use crate::pattern::{match_term, Pattern};
use crate::term::Term;

/// One `(pattern, handler)` pair of a selective receive.
///
/// The handler receives the pattern's bindings and produces the receive's
/// return value, either synchronously ([`ReceiveArm::new`]) or
/// asynchronously ([`ReceiveArm::new_async`]).
pub struct ReceiveArm<'a, R> {
    pattern: Pattern,
    handler: Box<dyn FnOnce(Vec<Term>) -> BoxFuture<'a, R> + Send + 'a>,
}

impl<'a, R: Send + 'a> ReceiveArm<'a, R> {
    /// Arm with a synchronous handler.
    pub fn new<F>(pattern: Pattern, handler: F) -> Self
    where
        F: FnOnce(Vec<Term>) -> R + Send + 'a,
    {
        Self {
            pattern,
            handler: Box::new(move |bindings| Box::pin(async move { handler(bindings) })),
        }
    }

    /// Arm with an asynchronous handler.
    ///
    /// The receive is not complete until the handler's future completes; its
    /// output becomes the receive's return value.
    pub fn new_async<F, Fut>(pattern: Pattern, handler: F) -> Self
    where
        F: FnOnce(Vec<Term>) -> Fut + Send + 'a,
        Fut: std::future::Future<Output = R> + Send + 'a,
    {
        Self {
            pattern,
            handler: Box::new(move |bindings| Box::pin(handler(bindings))),
        }
    }
}

impl<R> std::fmt::Debug for ReceiveArm<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveArm")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// FIFO message buffer with a wake signal.
#[derive(Debug, Default)]
pub struct Mailbox {
    buffer: Mutex<VecDeque<Term>>,
    signal: Notify,
}

impl Mailbox {
    /// Create an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message at the tail and wake one waiting receiver.
    ///
    /// Never blocks, never fails. Safe to call from any thread.
    pub fn put(&self, message: Term) {
        {
            let mut buffer = self.buffer.lock();
            buffer.push_back(message);
        }
        self.signal.notify_one();
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Selectively receive one message.
    ///
    /// Scans buffered messages head to tail; for each message, arms are tried
    /// in order and the first match wins. The matched message is removed, the
    /// winning handler runs with the pattern's bindings (no lock held across
    /// its suspension), and its value is returned. If nothing matches, the
    /// call parks on the wake signal and rescans as messages arrive, until
    /// `timeout` elapses (unbounded when `None`).
    ///
    /// A timeout leaves the buffer untouched.
    ///
    /// # Panics
    ///
    /// Panics if `arms` is empty; a receive with no patterns is a caller bug.
    pub async fn receive<'a, R: Send + 'a>(
        &self,
        mut arms: Vec<ReceiveArm<'a, R>>,
        timeout: Option<Duration>,
    ) -> Result<R, ReceiveTimeout> {
        assert!(!arms.is_empty(), "receive requires at least one arm");

        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let matched = {
                let mut buffer = self.buffer.lock();
                let mut hit = None;
                'scan: for (msg_idx, message) in buffer.iter().enumerate() {
                    for (arm_idx, arm) in arms.iter().enumerate() {
                        if let Some(bindings) = match_term(message, &arm.pattern) {
                            hit = Some((msg_idx, arm_idx, bindings));
                            break 'scan;
                        }
                    }
                }
                hit.map(|(msg_idx, arm_idx, bindings)| {
                    buffer.remove(msg_idx);
                    (arm_idx, bindings)
                })
            };

            if let Some((arm_idx, bindings)) = matched {
                let arm = arms.swap_remove(arm_idx);
                return Ok((arm.handler)(bindings).await);
            }

            // Park until a producer wakes us or the deadline passes. A put()
            // racing this gap leaves a stored permit, so no wakeup is lost.
            let notified = self.signal.notified();
            match deadline {
                Some(at) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        return Err(ReceiveTimeout {
                            timeout: timeout.unwrap_or_default(),
                        });
                    }
                }
                None => notified.await,
            }
        }
    }
}
