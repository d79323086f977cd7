//! End-to-end GenServer scenarios.
//!
//! Run with: `cargo test --test e2e_gen_server`

#[macro_use]
mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use arbor::actor::{ActorContext, ExitReason};
use arbor::error::ActorResult;
use arbor::gen_server::{self, GenServer};
use arbor::messaging::{call, call_timeout, cast, send};
use arbor::pid::Ref;
use arbor::term::Term;
use arbor::{Pid, TaskGroup};

use common::init_test_logging;

/// Counter server with observable state, mirroring the classic counter
/// example: `call` mutates and replies, `cast` mutates silently, everything
/// else lands in `handle_info`.
#[derive(Default)]
struct Counting {
    count: i64,
    data: HashMap<String, Term>,
    last_info: Option<Term>,
}

impl GenServer for Counting {
    fn handle_call<'a>(
        &'a mut self,
        _ctx: &'a ActorContext,
        request: Term,
        _from: Ref,
    ) -> BoxFuture<'a, ActorResult<Term>> {
        Box::pin(async move {
            let reply = match request.as_str() {
                Some("get") => Term::from(self.count),
                Some("get_last_info") => {
                    self.last_info.clone().unwrap_or_else(Term::unit)
                }
                _ => match request.as_tuple() {
                    Some([tag, n]) if tag.as_str() == Some("add") => {
                        self.count += n.as_int().unwrap_or(0);
                        Term::from(self.count)
                    }
                    Some([tag, key]) if tag.as_str() == Some("get_data") => {
                        let key = key.as_str().unwrap_or_default();
                        self.data.get(key).cloned().unwrap_or_else(Term::unit)
                    }
                    _ => Term::unit(),
                },
            };
            Ok(reply)
        })
    }

    fn handle_cast<'a>(
        &'a mut self,
        _ctx: &'a ActorContext,
        request: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            if request.as_str() == Some("reset") {
                self.count = 0;
            } else if let Some(items) = request.as_tuple() {
                match items {
                    [tag, n] if tag.as_str() == Some("set") => {
                        self.count = n.as_int().unwrap_or(0);
                    }
                    [tag, key, value] if tag.as_str() == Some("put_data") => {
                        if let Some(key) = key.as_str() {
                            self.data.insert(key.to_owned(), value.clone());
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }

    fn handle_info<'a>(
        &'a mut self,
        _ctx: &'a ActorContext,
        message: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            self.last_info = Some(message);
            Ok(())
        })
    }
}

fn add(n: i64) -> Term {
    Term::tuple(vec![Term::from("add"), Term::from(n)])
}

#[tokio::test]
async fn call_updates_state_and_replies() {
    init_test_logging();
    test_phase!("call_updates_state_and_replies");

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, Counting::default());

    assert_eq!(call(&pid, Term::from("get")).await.unwrap(), Term::from(0));
    assert_eq!(call(&pid, add(5)).await.unwrap(), Term::from(5));
    assert_eq!(call(&pid, add(3)).await.unwrap(), Term::from(8));

    group.shutdown().await;

    test_complete!("call_updates_state_and_replies");
}

#[tokio::test]
async fn cast_is_observable_via_followup_call() {
    init_test_logging();
    test_phase!("cast_is_observable_via_followup_call");

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, Counting::default());

    // Cast then call: mailbox ordering guarantees the cast is processed
    // before the call, no sleeps needed.
    cast(&pid, Term::tuple(vec![Term::from("set"), Term::from(100)]));
    assert_eq!(call(&pid, Term::from("get")).await.unwrap(), Term::from(100));

    cast(&pid, Term::from("reset"));
    assert_eq!(call(&pid, Term::from("get")).await.unwrap(), Term::from(0));

    cast(
        &pid,
        Term::tuple(vec![
            Term::from("put_data"),
            Term::from("k"),
            Term::from("v1"),
        ]),
    );
    assert_eq!(
        call(
            &pid,
            Term::tuple(vec![Term::from("get_data"), Term::from("k")])
        )
        .await
        .unwrap(),
        Term::from("v1")
    );

    group.shutdown().await;

    test_complete!("cast_is_observable_via_followup_call");
}

#[tokio::test]
async fn plain_messages_reach_handle_info() {
    init_test_logging();
    test_phase!("plain_messages_reach_handle_info");

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, Counting::default());

    let msg = Term::tuple(vec![
        Term::from("custom"),
        Term::from("info"),
        Term::from("message"),
    ]);
    send(&pid, msg.clone());

    assert_eq!(call(&pid, Term::from("get_last_info")).await.unwrap(), msg);

    group.shutdown().await;

    test_complete!("plain_messages_reach_handle_info");
}

#[tokio::test(start_paused = true)]
async fn call_timeout_leaves_the_server_unaffected() {
    init_test_logging();
    test_phase!("call_timeout_leaves_the_server_unaffected");

    struct Slow;
    impl GenServer for Slow {
        fn handle_call<'a>(
            &'a mut self,
            _ctx: &'a ActorContext,
            request: Term,
            _from: Ref,
        ) -> BoxFuture<'a, ActorResult<Term>> {
            Box::pin(async move {
                if request.as_str() == Some("slow") {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Term::from("done"))
                } else {
                    Ok(Term::from("pong"))
                }
            })
        }
    }

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, Slow);

    let err = call_timeout(&pid, Term::from("slow"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err.timeout, Duration::from_millis(50));

    // The server finishes its slow handler (the late reply is dropped on
    // the expired ephemeral mailbox) and keeps serving.
    let pong = call_timeout(&pid, Term::from("ping"), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(pong, Term::from("pong"));

    group.shutdown().await;

    test_complete!("call_timeout_leaves_the_server_unaffected");
}

#[tokio::test]
async fn concurrent_calls_all_reply_consistently() {
    init_test_logging();
    test_phase!("concurrent_calls_all_reply_consistently");

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, Counting::default());

    let calls = (0..10).map(|_| call(&pid, add(1)));
    let mut results: Vec<i64> = futures::future::join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap().as_int().unwrap())
        .collect();
    results.sort_unstable();
    assert_eq!(results, (1..=10).collect::<Vec<_>>());
    assert_eq!(call(&pid, Term::from("get")).await.unwrap(), Term::from(10));

    group.shutdown().await;

    test_complete!("concurrent_calls_all_reply_consistently");
}

#[tokio::test]
async fn default_handlers_leave_state_unchanged() {
    init_test_logging();
    test_phase!("default_handlers_leave_state_unchanged");

    struct Minimal {
        value: i64,
    }
    impl GenServer for Minimal {
        fn handle_call<'a>(
            &'a mut self,
            _ctx: &'a ActorContext,
            _request: Term,
            _from: Ref,
        ) -> BoxFuture<'a, ActorResult<Term>> {
            Box::pin(async move { Ok(Term::from(self.value)) })
        }
    }

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, Minimal { value: 1 });

    cast(&pid, Term::from("some_cast"));
    send(&pid, Term::tuple(vec![Term::from("info"), Term::from("x")]));
    assert_eq!(call(&pid, Term::from("get")).await.unwrap(), Term::from(1));

    group.shutdown().await;

    test_complete!("default_handlers_leave_state_unchanged");
}

#[tokio::test(start_paused = true)]
async fn unimplemented_handle_call_fails_the_server() {
    init_test_logging();
    test_phase!("unimplemented_handle_call_fails_the_server");

    struct NoCalls;
    impl GenServer for NoCalls {}

    let group = TaskGroup::new();
    let reasons: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = reasons.clone();
    let handle = gen_server::start_link(
        &group,
        NoCalls,
        Some(Box::new(move |_pid, reason: &ExitReason| {
            seen.lock().push(reason.to_string());
        })),
    );

    // The server dies before replying, so the call times out...
    let err = call_timeout(&handle.pid(), Term::from("x"), Duration::from_millis(100)).await;
    assert!(err.is_err());

    // ...and the exit reason surfaces the bug.
    group.shutdown().await;
    let reasons = reasons.lock();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("error"));
    assert!(reasons[0].contains("handle_call"));

    test_complete!("unimplemented_handle_call_fails_the_server");
}

/// Server exercising background tasks: spawning, success/failure routing,
/// and cancellation.
#[derive(Default)]
struct TaskRunner {
    done: Option<(Pid, Term)>,
    failed: Option<(Pid, Term)>,
    last_task: Option<Pid>,
}

impl GenServer for TaskRunner {
    fn handle_call<'a>(
        &'a mut self,
        ctx: &'a ActorContext,
        request: Term,
        _from: Ref,
    ) -> BoxFuture<'a, ActorResult<Term>> {
        Box::pin(async move {
            let reply = match request.as_str() {
                Some("start_ok") => {
                    let task = ctx.start_background_task(async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(Term::from("OK"))
                    });
                    Term::from(task)
                }
                Some("start_fail") => {
                    let task = ctx.start_background_task(async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err("task exploded".into())
                    });
                    Term::from(task)
                }
                Some("start_slow") => {
                    let task = ctx.start_background_task(async {
                        tokio::time::sleep(Duration::from_secs(600)).await;
                        Ok(Term::from("NOPE"))
                    });
                    self.last_task = Some(task.clone());
                    Term::from(task)
                }
                Some("cancel_last") => {
                    let task = self.last_task.as_ref().expect("a slow task was started");
                    Term::from(ctx.cancel_background_task(task))
                }
                Some("get_done") => match &self.done {
                    Some((pid, result)) => {
                        Term::tuple(vec![Term::from(pid.clone()), result.clone()])
                    }
                    None => Term::unit(),
                },
                Some("get_failed") => match &self.failed {
                    Some((pid, reason)) => {
                        Term::tuple(vec![Term::from(pid.clone()), reason.clone()])
                    }
                    None => Term::unit(),
                },
                _ => Term::unit(),
            };
            Ok(reply)
        })
    }

    fn handle_task_success<'a>(
        &'a mut self,
        _ctx: &'a ActorContext,
        task: Pid,
        result: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            self.done = Some((task, result));
            Ok(())
        })
    }

    fn handle_task_failure<'a>(
        &'a mut self,
        _ctx: &'a ActorContext,
        task: Pid,
        reason: Term,
    ) -> BoxFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            self.failed = Some((task, reason));
            Ok(())
        })
    }
}

async fn poll_until_some(pid: &Pid, request: &str) -> Term {
    loop {
        let got = call(pid, Term::from(request)).await.unwrap();
        if got != Term::unit() {
            return got;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn background_task_success_reaches_its_handler() {
    init_test_logging();
    test_phase!("background_task_success_reaches_its_handler");

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, TaskRunner::default());

    let task = call(&pid, Term::from("start_ok")).await.unwrap();
    let task_pid = task.as_pid().expect("reply is the task pid").clone();

    let done = poll_until_some(&pid, "get_done").await;
    let items = done.as_tuple().unwrap();
    assert_eq!(items[0], Term::from(task_pid));
    assert_eq!(items[1], Term::from("OK"));

    group.shutdown().await;

    test_complete!("background_task_success_reaches_its_handler");
}

#[tokio::test(start_paused = true)]
async fn background_task_failure_and_cancellation_reach_their_handler() {
    init_test_logging();
    test_phase!("background_task_failure_and_cancellation_reach_their_handler");

    let group = TaskGroup::new();
    let pid = gen_server::start(&group, TaskRunner::default());

    let failing = call(&pid, Term::from("start_fail")).await.unwrap();
    let failing_pid = failing.as_pid().unwrap().clone();

    let failed = poll_until_some(&pid, "get_failed").await;
    let items = failed.as_tuple().unwrap();
    assert_eq!(items[0], Term::from(failing_pid));
    let reason = items[1].as_str().unwrap();
    assert!(reason.contains("error"), "failure reason: {reason}");
    assert!(reason.contains("task exploded"));

    // Cancellation also routes through handle_task_failure.
    let slow = call(&pid, Term::from("start_slow")).await.unwrap();
    let slow_pid = slow.as_pid().unwrap().clone();
    assert_eq!(
        call(&pid, Term::from("cancel_last")).await.unwrap(),
        Term::from(true)
    );
    loop {
        let failed = poll_until_some(&pid, "get_failed").await;
        let items = failed.as_tuple().unwrap();
        if items[0] == Term::from(slow_pid.clone()) {
            assert_eq!(items[1], Term::from("cancelled"));
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    group.shutdown().await;

    test_complete!("background_task_failure_and_cancellation_reach_their_handler");
}
