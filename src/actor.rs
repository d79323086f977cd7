//! Actor lifecycle: the driver loop, contexts, and failure translation.
//!
//! An [`Actor`] is a cooperative task owning a private [`Mailbox`], addressed
//! by a [`Pid`]. The runtime drives it through a fixed lifecycle:
//!
//! ```text
//! PreInit → Initializing → Running → Terminating → Exited
//! ```
//!
//! - [`Actor::init`] runs once; a failure goes straight to `Terminating`.
//! - [`Actor::run`] is invoked repeatedly; each call must perform at least
//!   one suspension (normally a mailbox receive). Returning `Ok(())`
//!   re-enters `run`; returning `Err` or panicking terminates abnormally.
//! - [`Actor::terminate`] runs on every exit path the driver controls; its
//!   own failures are swallowed.
//!
//! Failures are translated, never propagated: a hook error or panic becomes
//! an [`ExitReason::Error`], external cancellation becomes
//! [`ExitReason::Cancelled`], and the optional `on_exit` hook registered at
//! [`start_link`] observes the reason exactly once. A handler exception can
//! therefore never tear down the owning task group directly.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{ActorResult, ReceiveTimeout};
use crate::group::{CancelScope, TaskGroup};
use crate::mailbox::{Mailbox, ReceiveArm};
use crate::messaging::{self, send};
use crate::pid::Pid;
use crate::term::Term;

/// Why an actor exited.
///
/// Internally structured; the legacy reason string consumed by supervision
/// policy is derived at the boundary via [`fmt::Display`]: `Normal` and
/// `Cancelled` render `"normal"`, `Error` renders `"error: {desc}"`. The
/// `"error"` substring is the contractual signal for `Transient` restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Clean exit: the actor stopped itself or its scope was cancelled from
    /// within the normal protocol.
    Normal,
    /// External cancellation, surfaced as a normal exit.
    Cancelled,
    /// A hook failed or panicked.
    Error(String),
}

impl ExitReason {
    /// Abnormal-exit reason from a description.
    pub fn error(desc: impl Into<String>) -> Self {
        Self::Error(desc.into())
    }

    /// Whether this reason counts as abnormal for restart policy.
    #[must_use]
    pub fn is_abnormal(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal | Self::Cancelled => write!(f, "normal"),
            Self::Error(desc) => write!(f, "error: {desc}"),
        }
    }
}

/// Lifecycle states of an actor, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created but not yet scheduled.
    PreInit,
    /// `init` is running.
    Initializing,
    /// The `run` loop is active.
    Running,
    /// Tearing down: descendants cancelled, `terminate` running.
    Terminating,
    /// Done; the mailbox is gone.
    Exited,
}

#[derive(Debug)]
pub(crate) struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    fn new() -> Self {
        Self(AtomicU8::new(encode_lifecycle(Lifecycle::PreInit)))
    }

    pub(crate) fn load(&self) -> Lifecycle {
        decode_lifecycle(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: Lifecycle) {
        self.0.store(encode_lifecycle(state), Ordering::Release);
    }
}

const fn encode_lifecycle(state: Lifecycle) -> u8 {
    match state {
        Lifecycle::PreInit => 0,
        Lifecycle::Initializing => 1,
        Lifecycle::Running => 2,
        Lifecycle::Terminating => 3,
        Lifecycle::Exited => 4,
    }
}

const fn decode_lifecycle(value: u8) -> Lifecycle {
    match value {
        0 => Lifecycle::PreInit,
        1 => Lifecycle::Initializing,
        2 => Lifecycle::Running,
        3 => Lifecycle::Terminating,
        _ => Lifecycle::Exited,
    }
}

/// Hook observing an actor's exit, registered via [`start_link`].
///
/// Invoked exactly once, after `terminate`. The runtime swallows panics from
/// the hook; from the actor's point of view it is infallible.
pub type ExitHook = Box<dyn Fn(Pid, &ExitReason) + Send + Sync + 'static>;

/// A cooperative, message-driven process.
///
/// State lives in `self`; the driver owns the instance for the whole
/// lifecycle, so cancellation mid-`run` never loses committed state. Hooks
/// return boxed futures to stay object-safe (the driver is generic, but
/// child specs erase the concrete type).
pub trait Actor: Send + 'static {
    /// One-time initialization. A failure skips `run` entirely.
    fn init<'a>(&'a mut self, ctx: &'a ActorContext) -> BoxFuture<'a, ActorResult<()>> {
        let _ = ctx;
        Box::pin(async { Ok(()) })
    }

    /// One iteration of the actor's loop.
    ///
    /// Must perform at least one suspension (normally [`ActorContext::receive`]).
    fn run<'a>(&'a mut self, ctx: &'a ActorContext) -> BoxFuture<'a, ActorResult<()>>;

    /// Cleanup hook, invoked on every exit path the driver controls.
    fn terminate<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        reason: &'a ExitReason,
    ) -> BoxFuture<'a, ()> {
        let _ = (ctx, reason);
        Box::pin(async {})
    }
}

/// Per-actor capabilities handed to every hook: identity, mailbox access,
/// the group for spawning owned sub-tasks, and self-termination.
#[derive(Debug)]
pub struct ActorContext {
    pid: Pid,
    mailbox: Arc<Mailbox>,
    group: TaskGroup,
    lifecycle: Arc<LifecycleCell>,
    tasks: Arc<Mutex<HashMap<u64, CancellationToken>>>,
}

impl ActorContext {
    /// This actor's address.
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid.clone()
    }

    /// The group owning this actor's descendants (children, background
    /// tasks). Its cancellation node is the actor's own scope: cancelling
    /// the actor cancels everything spawned through this group.
    #[must_use]
    pub fn group(&self) -> &TaskGroup {
        &self.group
    }

    /// A scope handle for this actor's own cancellation node.
    #[must_use]
    pub fn cancel_scope(&self) -> CancelScope {
        self.group.cancel_scope()
    }

    /// Request this actor's own termination as a normal exit.
    ///
    /// Takes effect at the next suspension point.
    pub fn stop(&self) {
        self.group.cancel();
    }

    /// Selectively receive one message from this actor's mailbox.
    ///
    /// See [`Mailbox::receive`].
    pub async fn receive<'a, R: Send + 'a>(
        &self,
        arms: Vec<ReceiveArm<'a, R>>,
        timeout: Option<Duration>,
    ) -> Result<R, ReceiveTimeout> {
        self.mailbox.receive(arms, timeout).await
    }

    /// Spawn a sub-task bound to this actor's lifetime.
    ///
    /// On completion the task posts `("$task_success", task_pid, result)` or
    /// `("$task_failure", task_pid, reason)` into this actor's mailbox; a
    /// [`GenServer`](crate::gen_server::GenServer) routes those to
    /// `handle_task_success` / `handle_task_failure`. The task is cancelled
    /// when the actor terminates, reporting reason `"cancelled"`.
    pub fn start_background_task<F>(&self, task: F) -> Pid
    where
        F: Future<Output = ActorResult<Term>> + Send + 'static,
    {
        let task_mailbox = Arc::new(Mailbox::new());
        let task_pid = Pid::new(&task_mailbox);
        let owner = self.pid.clone();
        let token = self.group.token().child_token();
        self.tasks.lock().insert(task_pid.id(), token.clone());
        let tasks = self.tasks.clone();
        let pid = task_pid.clone();
        trace!(owner = %owner, task = %pid, "background task spawned");
        self.group.spawn(async move {
            // Keeps the task pid routable for as long as the task lives.
            let _route = task_mailbox;
            tokio::select! {
                () = token.cancelled() => {
                    send(&owner, Term::tuple(vec![
                        Term::from(messaging::TASK_FAILURE),
                        Term::from(pid.clone()),
                        Term::from("cancelled"),
                    ]));
                }
                outcome = AssertUnwindSafe(task).catch_unwind() => {
                    let message = match outcome {
                        Ok(Ok(result)) => Term::tuple(vec![
                            Term::from(messaging::TASK_SUCCESS),
                            Term::from(pid.clone()),
                            result,
                        ]),
                        Ok(Err(e)) => Term::tuple(vec![
                            Term::from(messaging::TASK_FAILURE),
                            Term::from(pid.clone()),
                            Term::from(format!("error: {e}")),
                        ]),
                        Err(payload) => Term::tuple(vec![
                            Term::from(messaging::TASK_FAILURE),
                            Term::from(pid.clone()),
                            Term::from(format!("error: {}", panic_message(&payload))),
                        ]),
                    };
                    send(&owner, message);
                }
            }
            tasks.lock().remove(&pid.id());
        });
        task_pid
    }

    /// Cancel a background task started by this actor.
    ///
    /// Returns whether the task was still running. The task reports its
    /// cancellation through `("$task_failure", task_pid, "cancelled")`.
    pub fn cancel_background_task(&self, task: &Pid) -> bool {
        match self.tasks.lock().get(&task.id()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Handle to a started actor: its address plus targeted cancellation.
#[derive(Debug)]
pub struct ActorHandle {
    pid: Pid,
    cancel_scope: CancelScope,
    lifecycle: Arc<LifecycleCell>,
}

impl ActorHandle {
    /// The actor's address.
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid.clone()
    }

    /// Scope cancelling this actor and its descendants.
    #[must_use]
    pub fn cancel_scope(&self) -> CancelScope {
        self.cancel_scope.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.load()
    }
}

/// Start an actor in `group`, returning its address.
///
/// Synchronous: the pid and mailbox exist before this returns, so messages
/// sent afterwards are buffered and never lost. `init` completion is not
/// awaited.
pub fn start<A: Actor>(group: &TaskGroup, actor: A) -> Pid {
    start_link(group, actor, None).pid()
}

/// Start an actor and get a handle exposing its cancel scope.
///
/// `on_exit` is invoked exactly once when the actor exits, with the pid and
/// structured exit reason.
pub fn start_link<A: Actor>(group: &TaskGroup, actor: A, on_exit: Option<ExitHook>) -> ActorHandle {
    let mailbox = Arc::new(Mailbox::new());
    let pid = Pid::new(&mailbox);
    let lifecycle = Arc::new(LifecycleCell::new());
    let ctx = ActorContext {
        pid: pid.clone(),
        mailbox,
        group: group.child(),
        lifecycle: lifecycle.clone(),
        tasks: Arc::new(Mutex::new(HashMap::new())),
    };
    let cancel_scope = ctx.group.cancel_scope();
    debug!(pid = %pid, "actor spawned");
    group.spawn(run_driver(actor, ctx, on_exit));
    ActorHandle {
        pid,
        cancel_scope,
        lifecycle,
    }
}

/// Outcome of one guarded hook invocation.
enum Step<T> {
    Done(T),
    Panicked(String),
    Cancelled,
}

/// Run a hook future, translating panics and observing cancellation.
///
/// Cancellation wins ties so an already-cancelled actor never starts another
/// iteration.
async fn guarded<T>(ctx: &ActorContext, fut: BoxFuture<'_, T>) -> Step<T> {
    tokio::select! {
        biased;
        () = ctx.group.token().cancelled() => Step::Cancelled,
        outcome = AssertUnwindSafe(fut).catch_unwind() => match outcome {
            Ok(value) => Step::Done(value),
            Err(payload) => Step::Panicked(panic_message(&payload)),
        },
    }
}

async fn drive<A: Actor>(actor: &mut A, ctx: &ActorContext) -> ExitReason {
    match guarded(ctx, actor.init(ctx)).await {
        Step::Done(Ok(())) => {}
        Step::Done(Err(e)) => return ExitReason::error(e.to_string()),
        Step::Panicked(desc) => return ExitReason::error(format!("panicked: {desc}")),
        Step::Cancelled => return ExitReason::Cancelled,
    }
    ctx.lifecycle.store(Lifecycle::Running);
    trace!(pid = %ctx.pid, "actor running");
    loop {
        match guarded(ctx, actor.run(ctx)).await {
            Step::Done(Ok(())) => {}
            Step::Done(Err(e)) => return ExitReason::error(e.to_string()),
            Step::Panicked(desc) => return ExitReason::error(format!("panicked: {desc}")),
            Step::Cancelled => return ExitReason::Cancelled,
        }
    }
}

async fn run_driver<A: Actor>(mut actor: A, ctx: ActorContext, on_exit: Option<ExitHook>) {
    ctx.lifecycle.store(Lifecycle::Initializing);
    let reason = drive(&mut actor, &ctx).await;

    ctx.lifecycle.store(Lifecycle::Terminating);
    debug!(pid = %ctx.pid, reason = %reason, "actor terminating");
    // Tear down descendants (supervised children, background tasks) before
    // user cleanup runs.
    ctx.group.cancel();

    if AssertUnwindSafe(actor.terminate(&ctx, &reason))
        .catch_unwind()
        .await
        .is_err()
    {
        warn!(pid = %ctx.pid, "terminate hook panicked");
    }

    ctx.lifecycle.store(Lifecycle::Exited);
    if let Some(hook) = on_exit {
        let pid = ctx.pid.clone();
        if std::panic::catch_unwind(AssertUnwindSafe(|| hook(pid, &reason))).is_err() {
            warn!(pid = %ctx.pid, "exit hook panicked");
        }
    }
    // ctx (and with it the mailbox) drops here; unread messages are
    // discarded and late sends to this pid are dropped.
}

/// Best-effort description of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
