use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::Envelope;
use evalctl_reactor::audit::AuditWriter;
use evalctl_reactor::handlers::{build_dispatch_table, ReactorCtx};
use evalctl_schemas::{EventEnvelope, Status, Topic};
use evalctl_testkit::Harness;
use serde_json::json;
use uuid::Uuid;

fn envelope(eval_id: Uuid, topic: Topic, payload: serde_json::Value) -> Envelope {
    EventEnvelope::new(eval_id, topic, None, payload)
}

fn ctx(harness: &Harness, dir: &std::path::Path) -> Arc<ReactorCtx> {
    let audit = AuditWriter::new(dir.join("reactor.jsonl")).unwrap();
    Arc::new(ReactorCtx::new(
        harness.store.clone(),
        harness.index.clone(),
        harness.bus.clone(),
        audit,
        100 * 1024,
        dir.display().to_string(),
        Duration::from_secs(5),
    ))
}

#[tokio::test]
async fn redelivered_eval_queued_does_not_duplicate_or_reopen_the_row() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(&harness, dir.path());
    let table = build_dispatch_table();
    let eval_id = Uuid::new_v4();

    let payload = json!({
        "source_text": "print(1)",
        "language_tag": "python3",
        "timeout_s": 10,
        "max_output_bytes": 4096,
    });

    let first = envelope(eval_id, Topic::EvalQueued, payload.clone());
    (table.get(&Topic::EvalQueued).unwrap())(ctx.clone(), first).await;
    (table.get(&Topic::EvalStarted).unwrap())(
        ctx.clone(),
        envelope(eval_id, Topic::EvalStarted, json!({"runner_id": "r1", "slot": 0})),
    )
    .await;

    // the Dispatcher's at-least-once Queue redelivers the same eval.queued
    // event after the evaluation has already moved on to running.
    let redelivered = envelope(eval_id, Topic::EvalQueued, payload);
    (table.get(&Topic::EvalQueued).unwrap())(ctx.clone(), redelivered).await;

    let row = harness.store.get(eval_id).await.unwrap();
    assert_eq!(row.status, Status::Running);
}

#[tokio::test]
async fn redelivered_eval_started_is_a_silent_noop() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(&harness, dir.path());
    let table = build_dispatch_table();
    let eval_id = Uuid::new_v4();

    (table.get(&Topic::EvalQueued).unwrap())(
        ctx.clone(),
        envelope(
            eval_id,
            Topic::EvalQueued,
            json!({
                "source_text": "print(1)",
                "language_tag": "python3",
                "timeout_s": 10,
                "max_output_bytes": 4096,
            }),
        ),
    )
    .await;

    let started = json!({"runner_id": "r1", "slot": 0});
    (table.get(&Topic::EvalStarted).unwrap())(
        ctx.clone(),
        envelope(eval_id, Topic::EvalStarted, started.clone()),
    )
    .await;
    let first_started_at = harness.store.get(eval_id).await.unwrap().started_at;

    (table.get(&Topic::EvalStarted).unwrap())(
        ctx.clone(),
        envelope(eval_id, Topic::EvalStarted, started),
    )
    .await;
    let row = harness.store.get(eval_id).await.unwrap();
    assert_eq!(row.status, Status::Running);
    assert_eq!(row.started_at, first_started_at);
}

#[tokio::test]
async fn redelivered_terminal_event_does_not_reopen_a_resolved_evaluation() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(&harness, dir.path());
    let table = build_dispatch_table();
    let eval_id = Uuid::new_v4();

    (table.get(&Topic::EvalQueued).unwrap())(
        ctx.clone(),
        envelope(
            eval_id,
            Topic::EvalQueued,
            json!({
                "source_text": "print(1)",
                "language_tag": "python3",
                "timeout_s": 10,
                "max_output_bytes": 4096,
            }),
        ),
    )
    .await;
    (table.get(&Topic::EvalStarted).unwrap())(
        ctx.clone(),
        envelope(eval_id, Topic::EvalStarted, json!({"runner_id": "r1", "slot": 0})),
    )
    .await;
    (table.get(&Topic::EvalCompleted).unwrap())(
        ctx.clone(),
        envelope(eval_id, Topic::EvalCompleted, json!({"exit_code": 0, "output": "1\n"})),
    )
    .await;

    // a late-arriving failed event for an already-completed evaluation must
    // never flip it back to failed.
    (table.get(&Topic::EvalFailed).unwrap())(
        ctx.clone(),
        envelope(eval_id, Topic::EvalFailed, json!({"reason": "late", "output": ""})),
    )
    .await;

    let row = harness.store.get(eval_id).await.unwrap();
    assert_eq!(row.status, Status::Completed);
    assert_eq!(row.exit_code, Some(0));
}
