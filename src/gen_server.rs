//! GenServer: the generic request/reply and fire-and-forget server template.
//!
//! A [`GenServer`] structures a stateful process around three message shapes,
//! consumed with exactly one selective receive per loop iteration, arms tried
//! in order:
//!
//! 1. `("$call", ref, from, request)` → [`GenServer::handle_call`]; the
//!    runtime then sends `("$reply", ref, reply)` back to `from`.
//! 2. `("$cast", request)` → [`GenServer::handle_cast`].
//! 3. `("$task_success", task_pid, result)` /
//!    `("$task_failure", task_pid, reason)` →
//!    [`GenServer::handle_task_success`] / [`GenServer::handle_task_failure`]
//!    (outcomes of [`ActorContext::start_background_task`]).
//! 4. Anything else → [`GenServer::handle_info`].
//!
//! A handler error or panic is an abnormal exit of the underlying actor and
//! flows through the usual failure translation; see [`crate::actor`].
//!
//! # Example
//!
//! ```ignore
//! struct Counter { count: i64 }
//!
//! impl GenServer for Counter {
//!     fn handle_call<'a>(
//!         &'a mut self,
//!         _ctx: &'a ActorContext,
//!         request: Term,
//!         _from: Ref,
//!     ) -> BoxFuture<'a, ActorResult<Term>> {
//!         Box::pin(async move {
//!             match request.as_tuple() {
//!                 Some([tag, n]) if tag.as_str() == Some("add") => {
//!                     self.count += n.as_int().unwrap_or(0);
//!                     Ok(Term::from(self.count))
//!                 }
//!                 _ => Ok(Term::from(self.count)),
//!             }
//!         })
//!     }
//! }
//!
//! let pid = gen_server::start(&group, Counter { count: 0 });
//! let total = call(&pid, Term::tuple(vec!["add".into(), 5.into()])).await?;
//! ```

use futures::future::BoxFuture;

use crate::actor::{Actor, ActorContext, ActorHandle, ExitHook, ExitReason};
use crate::error::ActorResult;
use crate::group::TaskGroup;
use crate::mailbox::ReceiveArm;
use crate::messaging::{
    send, TAG_CALL, TAG_CAST, TAG_REPLY, TASK_FAILURE, TASK_SUCCESS,
};
use crate::pattern::{Pattern, ANY};
use crate::pid::{Pid, Ref};
use crate::term::{Term, TermKind};

/// Behaviour hooks of a generic server.
///
/// `handle_cast` and `handle_info` default to leaving state untouched, and
/// the task-outcome hooks default to forwarding into `handle_info`.
/// [`GenServer::handle_call`] is the exception: its default fails the actor,
/// because a server receiving calls it does not implement is a bug worth
/// surfacing.
pub trait GenServer: Send + 'static {
    /// One-time initialization, before any message is dispatched.
    fn init<'a>(&'a mut self, ctx: &'a ActorContext) -> BoxFuture<'a, ActorResult<()>> {
        let _ = ctx;
        Box::pin(async { Ok(()) })
    }

    /// Handle a synchronous request; the returned term is sent back to the
    /// caller as the reply, correlated by `from`.
    fn handle_call<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        request: Term,
        from: Ref,
    ) -> BoxFuture<'a, ActorResult<Term>> {
        let _ = (ctx, from);
        Box::pin(async move {
            Err(format!(
                "{} does not implement handle_call (got {request:?})",
                std::any::type_name::<Self>()
            )
            .into())
        })
    }

    /// Handle a fire-and-forget request.
    fn handle_cast<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        request: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        let _ = (ctx, request);
        Box::pin(async { Ok(()) })
    }

    /// Handle any message that is neither a call, a cast, nor a task outcome.
    fn handle_info<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        message: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        let _ = (ctx, message);
        Box::pin(async { Ok(()) })
    }

    /// A background task completed.
    ///
    /// The default forwards the full `("$task_success", task_pid, result)`
    /// tuple to [`GenServer::handle_info`]; override for dedicated handling.
    fn handle_task_success<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        task: Pid,
        result: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        self.handle_info(
            ctx,
            Term::tuple(vec![Term::from(TASK_SUCCESS), Term::from(task), result]),
        )
    }

    /// A background task failed or was cancelled.
    ///
    /// The default forwards the full `("$task_failure", task_pid, reason)`
    /// tuple to [`GenServer::handle_info`]; override for dedicated handling.
    fn handle_task_failure<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        task: Pid,
        reason: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        self.handle_info(
            ctx,
            Term::tuple(vec![Term::from(TASK_FAILURE), Term::from(task), reason]),
        )
    }

    /// Cleanup hook; see [`Actor::terminate`].
    fn terminate<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        reason: &'a ExitReason,
    ) -> BoxFuture<'a, ()> {
        let _ = (ctx, reason);
        Box::pin(async {})
    }
}

/// Start a generic server in `group`, returning its address.
pub fn start<S: GenServer>(group: &TaskGroup, server: S) -> Pid {
    crate::actor::start(group, GenServerActor::new(server))
}

/// Start a generic server with an exit hook; see [`crate::actor::start_link`].
pub fn start_link<S: GenServer>(
    group: &TaskGroup,
    server: S,
    on_exit: Option<ExitHook>,
) -> ActorHandle {
    crate::actor::start_link(group, GenServerActor::new(server), on_exit)
}

/// Adapter driving a [`GenServer`] as an [`Actor`].
pub struct GenServerActor<S> {
    server: S,
}

impl<S: GenServer> GenServerActor<S> {
    /// Wrap a server for use where an [`Actor`] is expected (e.g. a
    /// supervisor's child factory).
    #[must_use]
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S> std::fmt::Debug for GenServerActor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenServerActor").finish_non_exhaustive()
    }
}

/// One decoded mailbox message, ready for dispatch.
enum Dispatch {
    Call { from: Pid, call_ref: Ref, request: Term },
    Cast(Term),
    TaskSuccess(Pid, Term),
    TaskFailure(Pid, Term),
    Info(Term),
}

fn dispatch_arms<'a>() -> Vec<ReceiveArm<'a, Dispatch>> {
    vec![
        ReceiveArm::new(
            Pattern::tuple(vec![
                Pattern::literal(TAG_CALL),
                Pattern::of_type(TermKind::Ref),
                Pattern::of_type(TermKind::Pid),
                ANY,
            ]),
            |mut b: Vec<Term>| {
                let request = b.pop().unwrap_or_else(Term::unit);
                let from = take_pid(b.pop());
                let call_ref = take_ref(b.pop());
                Dispatch::Call {
                    from,
                    call_ref,
                    request,
                }
            },
        ),
        ReceiveArm::new(
            Pattern::tuple(vec![Pattern::literal(TAG_CAST), ANY]),
            |mut b: Vec<Term>| Dispatch::Cast(b.pop().unwrap_or_else(Term::unit)),
        ),
        ReceiveArm::new(
            Pattern::tuple(vec![
                Pattern::literal(TASK_SUCCESS),
                Pattern::of_type(TermKind::Pid),
                ANY,
            ]),
            |mut b: Vec<Term>| {
                let result = b.pop().unwrap_or_else(Term::unit);
                Dispatch::TaskSuccess(take_pid(b.pop()), result)
            },
        ),
        ReceiveArm::new(
            Pattern::tuple(vec![
                Pattern::literal(TASK_FAILURE),
                Pattern::of_type(TermKind::Pid),
                ANY,
            ]),
            |mut b: Vec<Term>| {
                let reason = b.pop().unwrap_or_else(Term::unit);
                Dispatch::TaskFailure(take_pid(b.pop()), reason)
            },
        ),
        ReceiveArm::new(ANY, |mut b: Vec<Term>| {
            Dispatch::Info(b.pop().unwrap_or_else(Term::unit))
        }),
    ]
}

// The patterns above guarantee these shapes.
fn take_pid(binding: Option<Term>) -> Pid {
    match binding {
        Some(Term::Pid(pid)) => pid,
        other => unreachable!("pattern bound a pid, got {other:?}"),
    }
}

fn take_ref(binding: Option<Term>) -> Ref {
    match binding {
        Some(Term::Ref(r)) => r,
        other => unreachable!("pattern bound a ref, got {other:?}"),
    }
}

impl<S: GenServer> Actor for GenServerActor<S> {
    fn init<'a>(&'a mut self, ctx: &'a ActorContext) -> BoxFuture<'a, ActorResult<()>> {
        self.server.init(ctx)
    }

    fn run<'a>(&'a mut self, ctx: &'a ActorContext) -> BoxFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            // Exactly one receive per iteration; the winning arm only decodes
            // the message, the handler runs with exclusive access to state.
            let dispatch = ctx
                .receive(dispatch_arms(), None)
                .await
                .expect("receive without timeout cannot time out");
            match dispatch {
                Dispatch::Call {
                    from,
                    call_ref,
                    request,
                } => {
                    let reply = self.server.handle_call(ctx, request, call_ref).await?;
                    send(
                        &from,
                        Term::tuple(vec![
                            Term::from(TAG_REPLY),
                            Term::from(call_ref),
                            reply,
                        ]),
                    );
                    Ok(())
                }
                Dispatch::Cast(request) => self.server.handle_cast(ctx, request).await,
                Dispatch::TaskSuccess(task, result) => {
                    self.server.handle_task_success(ctx, task, result).await
                }
                Dispatch::TaskFailure(task, reason) => {
                    self.server.handle_task_failure(ctx, task, reason).await
                }
                Dispatch::Info(message) => self.server.handle_info(ctx, message).await,
            }
        })
    }

    fn terminate<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        reason: &'a ExitReason,
    ) -> BoxFuture<'a, ()> {
        self.server.terminate(ctx, reason)
    }
}
