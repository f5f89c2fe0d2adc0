//! Local chain mutation rules, before and during execution.

use super::CallContext;
use crate::errors::PipelineError;
use crate::events::{event_types, CollectingEventSink};
use crate::pipeline::HttpPipeline;
use crate::policy::{FnPolicy, Policy, PolicyEntry};
use crate::testing::{test_pipeline, test_request, CallLog, MockTransport, RecordingPolicy};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

type Outcomes = Arc<Mutex<Vec<String>>>;

fn code(result: Result<(), PipelineError>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(err) => err.code().to_string(),
    }
}

/// A policy named "probe" that logs itself, then runs `f`.
fn probe<F>(log: &CallLog, f: F) -> PolicyEntry
where
    F: Fn(&mut CallContext) + Send + Sync + 'static,
{
    let log = log.clone();
    let policy = FnPolicy::new("probe", move |ctx: &mut CallContext| {
        log.push("probe");
        f(ctx);
        Ok(())
    });
    PolicyEntry::new("probe", Arc::new(policy))
}

fn rec(name: &str, log: &CallLog) -> PolicyEntry {
    PolicyEntry::new(name, RecordingPolicy::shared(name, log))
}

fn pipeline(entries: Vec<PolicyEntry>, log: &CallLog) -> HttpPipeline {
    HttpPipeline::new(entries, Arc::new(MockTransport::ok().with_log(log, "t"))).unwrap()
}

fn shared(name: &str, log: &CallLog) -> Arc<dyn Policy> {
    RecordingPolicy::shared(name, log)
}

#[tokio::test]
async fn test_every_edit_is_allowed_before_start() {
    let log = CallLog::new();
    let pipeline = test_pipeline(&["a", "b"], &log, Arc::new(MockTransport::ok().with_log(&log, "t")));
    let mut ctx = pipeline.new_context(test_request());

    ctx.add_policy_first("x", shared("x", &log)).unwrap();
    ctx.add_policy_last("y", shared("y", &log)).unwrap();
    ctx.add_policy_after("a", "a2", shared("a2", &log)).unwrap();
    ctx.add_policy_before("b", "b0", shared("b0", &log)).unwrap();
    ctx.replace_policy("y", "y2", shared("y2", &log)).unwrap();

    assert_eq!(ctx.policy_names(), vec!["x", "a", "a2", "b0", "b", "y2"]);
    pipeline.send_request(&mut ctx).await.unwrap();
    assert_eq!(log.entries(), vec!["x", "a", "a2", "b0", "b", "y2", "t"]);
    assert_eq!(pipeline.policy_names(), vec!["a", "b"]);
}

#[test]
fn test_name_conflicts_ignore_case() {
    let log = CallLog::new();
    let pipeline = test_pipeline(&["Auth", "b"], &log, Arc::new(MockTransport::ok()));
    let mut ctx = pipeline.new_context(test_request());

    assert_eq!(code(ctx.add_policy_first("auth", shared("x", &log))), "POLICY-NAME-CONFLICT");
    assert_eq!(code(ctx.add_policy_last("AUTH", shared("x", &log))), "POLICY-NAME-CONFLICT");
    assert_eq!(code(ctx.add_policy_before("b", "aUTH", shared("x", &log))), "POLICY-NAME-CONFLICT");
    assert_eq!(ctx.policy_names(), vec!["Auth", "b"]);
}

#[test]
fn test_lookup_errors_are_ordered() {
    let log = CallLog::new();
    let pipeline = test_pipeline(&["a", "b"], &log, Arc::new(MockTransport::ok()));
    let mut ctx = pipeline.new_context(test_request());

    // a taken name wins over a missing base for inserts
    assert_eq!(code(ctx.add_policy_after("missing", "a", shared("x", &log))), "POLICY-NAME-CONFLICT");
    assert_eq!(code(ctx.add_policy_before("missing", "b", shared("x", &log))), "POLICY-NAME-CONFLICT");
    assert_eq!(code(ctx.add_policy_after("missing", "x", shared("x", &log))), "POLICY-NOT-FOUND");

    // a missing base wins over a taken name for replace
    assert_eq!(code(ctx.replace_policy("missing", "a", shared("x", &log))), "POLICY-NOT-FOUND");
    assert_eq!(code(ctx.replace_policy("a", "b", shared("x", &log))), "POLICY-NAME-CONFLICT");
    assert_eq!(code(ctx.replace_policy("a", "A", shared("x", &log))), "ok");
}

#[tokio::test]
async fn test_add_first_rejected_once_started() {
    let log = CallLog::new();
    let outcomes: Outcomes = Arc::default();

    let out = Arc::clone(&outcomes);
    let l = log.clone();
    let entries = vec![
        probe(&log, move |ctx| {
            out.lock().push(code(ctx.add_policy_first("x", shared("x", &l))));
            out.lock().push(code(ctx.add_policy_first("b", shared("x", &l))));
        }),
        rec("b", &log),
    ];
    pipeline(entries, &log).send(test_request()).await.unwrap();

    assert_eq!(*outcomes.lock(), vec!["ILLEGAL-STATE", "ILLEGAL-STATE"]);
    assert_eq!(log.entries(), vec!["probe", "b", "t"]);
}

#[tokio::test]
async fn test_add_after_during_execution() {
    let log = CallLog::new();
    let outcomes: Outcomes = Arc::default();

    let out = Arc::clone(&outcomes);
    let l = log.clone();
    let entries = vec![
        rec("a", &log),
        probe(&log, move |ctx| {
            out.lock().push(code(ctx.add_policy_after("a", "x", shared("x", &l))));
            out.lock().push(code(ctx.add_policy_after("a", "c", shared("x", &l))));
            out.lock().push(code(ctx.add_policy_after("probe", "x", shared("x", &l))));
        }),
        rec("c", &log),
    ];
    pipeline(entries, &log).send(test_request()).await.unwrap();

    assert_eq!(*outcomes.lock(), vec!["ILLEGAL-STATE", "POLICY-NAME-CONFLICT", "ok"]);
    assert_eq!(log.entries(), vec!["a", "probe", "x", "c", "t"]);
}

#[tokio::test]
async fn test_add_before_rejects_current_policy() {
    let log = CallLog::new();
    let outcomes: Outcomes = Arc::default();

    let out = Arc::clone(&outcomes);
    let l = log.clone();
    let entries = vec![
        rec("a", &log),
        probe(&log, move |ctx| {
            out.lock().push(code(ctx.add_policy_before("a", "x", shared("x", &l))));
            out.lock().push(code(ctx.add_policy_before("probe", "x", shared("x", &l))));
            out.lock().push(code(ctx.add_policy_before("c", "x", shared("x", &l))));
        }),
        rec("c", &log),
    ];
    pipeline(entries, &log).send(test_request()).await.unwrap();

    assert_eq!(*outcomes.lock(), vec!["ILLEGAL-STATE", "ILLEGAL-STATE", "ok"]);
    assert_eq!(log.entries(), vec!["a", "probe", "x", "c", "t"]);
}

#[tokio::test]
async fn test_replace_during_execution() {
    let log = CallLog::new();
    let outcomes: Outcomes = Arc::default();

    let out = Arc::clone(&outcomes);
    let l = log.clone();
    let entries = vec![
        rec("a", &log),
        probe(&log, move |ctx| {
            out.lock().push(code(ctx.replace_policy("a", "x", shared("x", &l))));
            out.lock().push(code(ctx.replace_policy("probe", "x", shared("x", &l))));
            out.lock().push(code(ctx.replace_policy("c", "d", shared("x", &l))));
            out.lock().push(code(ctx.replace_policy("c", "C", shared("C", &l))));
        }),
        rec("c", &log),
        rec("d", &log),
    ];
    pipeline(entries, &log).send(test_request()).await.unwrap();

    assert_eq!(
        *outcomes.lock(),
        vec!["ILLEGAL-STATE", "ILLEGAL-STATE", "POLICY-NAME-CONFLICT", "ok"]
    );
    assert_eq!(log.entries(), vec!["a", "probe", "C", "d", "t"]);
}

#[tokio::test]
async fn test_add_last_always_allowed() {
    let log = CallLog::new();
    let l = log.clone();
    let entries = vec![
        probe(&log, move |ctx| {
            ctx.add_policy_last("late", shared("late", &l)).unwrap();
        }),
        rec("a", &log),
    ];
    let pipeline = pipeline(entries, &log);

    let mut ctx = pipeline.new_context(test_request());
    pipeline.send_request(&mut ctx).await.unwrap();
    assert_eq!(log.entries(), vec!["probe", "a", "late", "t"]);

    // the chain is exhausted, only appends still succeed
    assert_eq!(code(ctx.add_policy_last("after", shared("x", &log))), "ok");
    assert_eq!(code(ctx.add_policy_after("a", "z", shared("x", &log))), "ILLEGAL-STATE");
    assert_eq!(code(ctx.add_policy_before("late", "z", shared("x", &log))), "ILLEGAL-STATE");
    assert_eq!(code(ctx.replace_policy("a", "z", shared("x", &log))), "ILLEGAL-STATE");
    assert_eq!(code(ctx.add_policy_after("gone", "z", shared("x", &log))), "POLICY-NOT-FOUND");
    assert_eq!(ctx.current_policy(), None);
}

#[tokio::test]
async fn test_current_policy_tracks_cursor() {
    let log = CallLog::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    let entries = vec![
        rec("a", &log),
        probe(&log, move |ctx| {
            s.lock().push((ctx.is_started(), ctx.current_policy().map(str::to_string)));
        }),
    ];
    let pipeline = pipeline(entries, &log);

    let mut ctx = pipeline.new_context(test_request());
    assert!(!ctx.is_started());
    assert_eq!(ctx.current_policy(), None);

    pipeline.send_request(&mut ctx).await.unwrap();
    assert_eq!(*seen.lock(), vec![(true, Some("probe".to_string()))]);
}

#[tokio::test]
async fn test_mutations_emit_events() {
    let sink = Arc::new(CollectingEventSink::new());
    let log = CallLog::new();
    let pipeline = test_pipeline(&["a"], &log, Arc::new(MockTransport::ok())).with_event_sink(sink.clone());

    let mut ctx = pipeline.new_context(test_request());
    ctx.add_policy_after("a", "b", shared("b", &log)).unwrap();
    let _ = ctx.add_policy_after("a", "b", shared("b", &log));

    let mutated = sink.events_of_type(event_types::CHAIN_MUTATED);
    assert_eq!(mutated.len(), 1);
    assert_eq!(mutated[0].field("operation"), Some("add_after"));
    assert_eq!(mutated[0].field("base"), Some("a"));
    assert_eq!(mutated[0].field("policy"), Some("b"));
}
