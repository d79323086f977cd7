//! Supervision: child specs, restart policies, and the supervisor actor.
//!
//! A [`Supervisor`] owns the lifecycle of a set of children. It starts them
//! in spec order inside its own task group, listens for `$child_down`
//! notifications produced by each child's exit hook, and reacts per the
//! configured [`RestartStrategy`] under a sliding-window [`RestartLimit`]:
//!
//! - [`RestartStrategy::OneForOne`]: restart only the failed child.
//! - [`RestartStrategy::OneForAll`]: cancel the remaining children, then
//!   restart all of them in spec order.
//! - [`RestartStrategy::RestForOne`]: cancel and restart the failed child
//!   and every child listed after it.
//!
//! Per-child [`RestartType`] decides whether a given exit qualifies at all:
//! `Permanent` always restarts, `Temporary` never, `Transient` only on an
//! abnormal exit (a reason string containing `"error"`, the legacy
//! contract).
//!
//! Restarts replace the child's pid, so a late `$child_down` from a previous
//! incarnation is detected by pid mismatch and discarded.
//!
//! # Example
//!
//! ```ignore
//! let sup = Supervisor::new()
//!     .strategy(RestartStrategy::OneForOne)
//!     .limit(RestartLimit::new(3, Duration::from_secs(5)))
//!     .child(ChildSpec::new("worker", || Worker::new()))
//!     .child(ChildSpec::new("cache", || Cache::new()).restart(RestartType::Transient));
//! let handle = actor::start_link(&group, sup, None);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::actor::{self, Actor, ActorContext, ActorHandle, ExitHook};
use crate::error::{ActorResult, MaxRestartsExceeded};
use crate::gen_server::{GenServer, GenServerActor};
use crate::group::{CancelScope, TaskGroup};
use crate::mailbox::ReceiveArm;
use crate::messaging::{
    send, TAG_CALL, TAG_CHILD_DOWN, TAG_COUNT_CHILDREN, TAG_REPLY, TAG_RESTART_CHILD,
    TAG_TERMINATE_CHILD, TAG_WHICH_CHILDREN,
};
use crate::pattern::{Pattern, ANY};
use crate::pid::{Pid, Ref};
use crate::term::{Term, TermKind};

/// Which siblings are affected when one child fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartStrategy {
    /// Restart only the failed child.
    #[default]
    OneForOne,
    /// Cancel the remaining children, then restart all in spec order.
    OneForAll,
    /// Cancel and restart the failed child and all later-listed children.
    RestForOne,
}

/// Whether a given exit qualifies a child for restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartType {
    /// Always restart.
    #[default]
    Permanent,
    /// Restart only on abnormal exit.
    Transient,
    /// Never restart.
    Temporary,
}

impl RestartType {
    /// Lowercase name, as reported by `$which_children`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Transient => "transient",
            Self::Temporary => "temporary",
        }
    }

    /// Decide restart eligibility for an exit reason string.
    ///
    /// `Transient` keys on the `"error"` substring; this is the load-bearing
    /// legacy contract for exit reasons crossing the wire.
    #[must_use]
    pub fn should_restart(self, reason: &str) -> bool {
        match self {
            Self::Permanent => true,
            Self::Temporary => false,
            Self::Transient => reason.contains("error"),
        }
    }
}

/// Sliding-window restart rate limit.
///
/// More than `max_restarts` restarts within any `window` fail the supervisor
/// with [`MaxRestartsExceeded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartLimit {
    /// Maximum restarts tolerated within the window.
    pub max_restarts: u32,
    /// Sliding window the restarts are counted in.
    pub window: Duration,
}

impl Default for RestartLimit {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            window: Duration::from_secs(5),
        }
    }
}

impl RestartLimit {
    /// Limit of `max_restarts` restarts per `window`.
    #[must_use]
    pub fn new(max_restarts: u32, window: Duration) -> Self {
        Self {
            max_restarts,
            window,
        }
    }
}

type ChildStart = Arc<dyn Fn(&TaskGroup, ExitHook) -> ActorHandle + Send + Sync>;

/// Declarative recipe for one supervised child.
///
/// The factory produces a fresh actor instance per (re)start; the spec itself
/// is immutable and reused across restarts.
#[derive(Clone)]
pub struct ChildSpec {
    id: String,
    restart: RestartType,
    start: ChildStart,
}

impl ChildSpec {
    /// Spec for an [`Actor`] child.
    pub fn new<A, F>(id: impl Into<String>, factory: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let start: ChildStart =
            Arc::new(move |group, hook| actor::start_link(group, factory(), Some(hook)));
        Self {
            id: id.into(),
            restart: RestartType::Permanent,
            start,
        }
    }

    /// Spec for a [`GenServer`] child.
    pub fn gen_server<S, F>(id: impl Into<String>, factory: F) -> Self
    where
        S: GenServer,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::new(id, move || GenServerActor::new(factory()))
    }

    /// Set the restart type (default [`RestartType::Permanent`]).
    #[must_use]
    pub fn restart(mut self, restart: RestartType) -> Self {
        self.restart = restart;
        self
    }

    /// The child's id, unique within its supervisor.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildSpec")
            .field("id", &self.id)
            .field("restart", &self.restart)
            .finish_non_exhaustive()
    }
}

/// A live child: current incarnation's pid and cancel scope.
#[derive(Debug)]
struct ChildRecord {
    pid: Pid,
    scope: CancelScope,
}

/// Decoded supervisor mailbox message.
enum SupMsg {
    ChildDown {
        id: String,
        pid: Pid,
        reason: String,
    },
    TerminateChild(String),
    RestartChild(String),
    Command {
        from: Pid,
        call_ref: Ref,
        request: Term,
    },
}

/// Actor owning and restarting a set of children.
///
/// Built with [`Supervisor::new`] plus the builder methods, then started
/// like any actor via [`crate::actor::start`] / [`crate::actor::start_link`].
pub struct Supervisor {
    specs: Vec<ChildSpec>,
    strategy: RestartStrategy,
    limit: RestartLimit,
    children: HashMap<String, ChildRecord>,
    restarts: VecDeque<Instant>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// An empty supervisor with default strategy and limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            strategy: RestartStrategy::default(),
            limit: RestartLimit::default(),
            children: HashMap::new(),
            restarts: VecDeque::new(),
        }
    }

    /// Set the restart strategy (default [`RestartStrategy::OneForOne`]).
    #[must_use]
    pub fn strategy(mut self, strategy: RestartStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the restart rate limit (default 3 restarts per 5 seconds).
    #[must_use]
    pub fn limit(mut self, limit: RestartLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Append a child spec; children start in the order they are added.
    #[must_use]
    pub fn child(mut self, spec: ChildSpec) -> Self {
        self.specs.push(spec);
        self
    }

    fn spec_index(&self, id: &str) -> Option<usize> {
        self.specs.iter().position(|spec| spec.id == id)
    }

    /// Start (or re-start) the child at `idx`, registering the exit hook
    /// that routes `$child_down` back into the supervisor's mailbox.
    fn start_child(&mut self, ctx: &ActorContext, idx: usize) {
        let spec = &self.specs[idx];
        let sup_pid = ctx.pid();
        let child_id = spec.id.clone();
        let hook: ExitHook = Box::new(move |pid, reason| {
            send(
                &sup_pid,
                Term::tuple(vec![
                    Term::from(TAG_CHILD_DOWN),
                    Term::from(child_id.clone()),
                    Term::from(pid),
                    Term::from(reason.to_string()),
                ]),
            );
        });
        let handle = (spec.start)(ctx.group(), hook);
        debug!(child = %spec.id, pid = %handle.pid(), "child started");
        self.children.insert(
            spec.id.clone(),
            ChildRecord {
                pid: handle.pid(),
                scope: handle.cancel_scope(),
            },
        );
    }

    /// Cancel the current incarnation (if any) and start a fresh one.
    ///
    /// Does not touch the restart accounting; used for the explicit
    /// `$restart_child` command and internally after [`Self::note_restart`].
    fn replace_child(&mut self, ctx: &ActorContext, idx: usize) {
        if let Some(record) = self.children.get(&self.specs[idx].id) {
            record.scope.cancel();
        }
        self.start_child(ctx, idx);
    }

    /// Record one restart event against the sliding window.
    fn note_restart(&mut self, child_id: &str) -> Result<(), MaxRestartsExceeded> {
        let now = Instant::now();
        self.restarts.push_back(now);
        if let Some(cutoff) = now.checked_sub(self.limit.window) {
            while self.restarts.front().is_some_and(|&t| t < cutoff) {
                self.restarts.pop_front();
            }
        }
        if self.restarts.len() > self.limit.max_restarts as usize {
            warn!(
                child = %child_id,
                max_restarts = self.limit.max_restarts,
                window = ?self.limit.window,
                "restart limit exceeded"
            );
            return Err(MaxRestartsExceeded {
                child_id: child_id.to_owned(),
                max_restarts: self.limit.max_restarts,
                window: self.limit.window,
            });
        }
        Ok(())
    }

    fn restart_child(&mut self, ctx: &ActorContext, idx: usize) -> ActorResult<()> {
        let id = self.specs[idx].id.clone();
        self.note_restart(&id)?;
        debug!(child = %id, "restarting child");
        self.replace_child(ctx, idx);
        Ok(())
    }

    fn handle_child_down(
        &mut self,
        ctx: &ActorContext,
        id: &str,
        pid: &Pid,
        reason: &str,
    ) -> ActorResult<()> {
        let Some(record) = self.children.get(id) else {
            // Already removed (terminated, or exited without restart).
            return Ok(());
        };
        if record.pid != *pid {
            // A previous incarnation's exit arriving after the restart; the
            // pid is the sole discriminator for staleness.
            trace!(child = %id, stale = %pid, current = %record.pid, "stale child_down ignored");
            return Ok(());
        }

        let idx = self
            .spec_index(id)
            .expect("live children always have a spec");
        if !self.specs[idx].restart.should_restart(reason) {
            debug!(child = %id, reason = %reason, "child down, not restarting");
            self.children.remove(id);
            return Ok(());
        }

        debug!(child = %id, reason = %reason, strategy = ?self.strategy, "child down");
        match self.strategy {
            RestartStrategy::OneForOne => self.restart_child(ctx, idx)?,
            RestartStrategy::OneForAll => {
                for record in self.children.values() {
                    record.scope.cancel();
                }
                for i in 0..self.specs.len() {
                    if self.children.contains_key(&self.specs[i].id) {
                        self.restart_child(ctx, i)?;
                    }
                }
            }
            RestartStrategy::RestForOne => {
                for i in idx..self.specs.len() {
                    if let Some(record) = self.children.get(&self.specs[i].id) {
                        record.scope.cancel();
                    }
                }
                for i in idx..self.specs.len() {
                    if self.children.contains_key(&self.specs[i].id) {
                        self.restart_child(ctx, i)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, from: &Pid, call_ref: Ref, request: &Term) {
        let reply = match request.as_tuple() {
            Some([tag]) if tag.as_str() == Some(TAG_WHICH_CHILDREN) => self.which_children(),
            Some([tag]) if tag.as_str() == Some(TAG_COUNT_CHILDREN) => {
                Term::from(self.children.len() as i64)
            }
            _ => Term::tuple(vec![Term::from("error"), Term::from("unknown_request")]),
        };
        send(
            from,
            Term::tuple(vec![
                Term::from(TAG_REPLY),
                Term::from(call_ref),
                reply,
            ]),
        );
    }

    /// `(id, pid, restart)` for every live child, in spec order.
    fn which_children(&self) -> Term {
        let entries = self
            .specs
            .iter()
            .filter_map(|spec| {
                self.children.get(&spec.id).map(|record| {
                    Term::tuple(vec![
                        Term::from(spec.id.clone()),
                        Term::from(record.pid.clone()),
                        Term::from(spec.restart.as_str()),
                    ])
                })
            })
            .collect();
        Term::tuple(entries)
    }

    fn terminate_child(&mut self, id: &str) {
        if let Some(record) = self.children.remove(id) {
            debug!(child = %id, pid = %record.pid, "terminating child");
            record.scope.cancel();
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("strategy", &self.strategy)
            .field("limit", &self.limit)
            .field("specs", &self.specs.len())
            .field("children", &self.children.len())
            .finish()
    }
}

fn supervisor_arms<'a>() -> Vec<ReceiveArm<'a, SupMsg>> {
    vec![
        ReceiveArm::new(
            Pattern::tuple(vec![
                Pattern::literal(TAG_CHILD_DOWN),
                Pattern::of_type(TermKind::Str),
                Pattern::of_type(TermKind::Pid),
                Pattern::of_type(TermKind::Str),
            ]),
            |mut b: Vec<Term>| {
                let reason = take_string(b.pop());
                let pid = take_pid(b.pop());
                let id = take_string(b.pop());
                SupMsg::ChildDown { id, pid, reason }
            },
        ),
        ReceiveArm::new(
            Pattern::tuple(vec![
                Pattern::literal(TAG_TERMINATE_CHILD),
                Pattern::of_type(TermKind::Str),
            ]),
            |mut b: Vec<Term>| SupMsg::TerminateChild(take_string(b.pop())),
        ),
        ReceiveArm::new(
            Pattern::tuple(vec![
                Pattern::literal(TAG_RESTART_CHILD),
                Pattern::of_type(TermKind::Str),
            ]),
            |mut b: Vec<Term>| SupMsg::RestartChild(take_string(b.pop())),
        ),
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
                SupMsg::Command {
                    from,
                    call_ref,
                    request,
                }
            },
        ),
    ]
}

fn take_string(binding: Option<Term>) -> String {
    match binding {
        Some(Term::Str(s)) => s,
        other => unreachable!("pattern bound a string, got {other:?}"),
    }
}

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

impl Actor for Supervisor {
    fn init<'a>(&'a mut self, ctx: &'a ActorContext) -> BoxFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            for (idx, spec) in self.specs.iter().enumerate() {
                if spec.id.is_empty() {
                    return Err("child id cannot be empty".into());
                }
                if self.specs[..idx].iter().any(|other| other.id == spec.id) {
                    return Err(format!("duplicate child id {:?}", spec.id).into());
                }
            }
            for idx in 0..self.specs.len() {
                self.start_child(ctx, idx);
            }
            Ok(())
        })
    }

    fn run<'a>(&'a mut self, ctx: &'a ActorContext) -> BoxFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            let msg = ctx
                .receive(supervisor_arms(), None)
                .await
                .expect("receive without timeout cannot time out");
            match msg {
                SupMsg::ChildDown { id, pid, reason } => {
                    self.handle_child_down(ctx, &id, &pid, &reason)
                }
                SupMsg::TerminateChild(id) => {
                    self.terminate_child(&id);
                    Ok(())
                }
                SupMsg::RestartChild(id) => {
                    // Spec list is authoritative: restart even a child that
                    // is not currently running. Unknown ids are ignored.
                    if let Some(idx) = self.spec_index(&id) {
                        self.replace_child(ctx, idx);
                    }
                    Ok(())
                }
                SupMsg::Command {
                    from,
                    call_ref,
                    request,
                } => {
                    self.handle_command(&from, call_ref, &request);
                    Ok(())
                }
            }
        })
    }
}
