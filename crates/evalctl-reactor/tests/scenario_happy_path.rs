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

#[tokio::test]
async fn full_lifecycle_reaches_completed_and_clears_the_index() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let audit = AuditWriter::new(dir.path().join("reactor.jsonl")).unwrap();
    let ctx = Arc::new(ReactorCtx::new(
        harness.store.clone(),
        harness.index.clone(),
        harness.bus.clone(),
        audit,
        100 * 1024,
        dir.path().display().to_string(),
        Duration::from_secs(5),
    ));
    let table = build_dispatch_table();
    let eval_id = Uuid::new_v4();

    let queued = envelope(
        eval_id,
        Topic::EvalQueued,
        json!({
            "source_text": "print(1)",
            "language_tag": "python3",
            "timeout_s": 10,
            "max_output_bytes": 4096,
        }),
    );
    (table.get(&Topic::EvalQueued).unwrap())(ctx.clone(), queued).await;
    let row = harness.store.get(eval_id).await.unwrap();
    assert_eq!(row.status, Status::Queued);

    let dispatched = envelope(
        eval_id,
        Topic::EvalDispatched,
        json!({"runner_url": "http://runner-1"}),
    );
    (table.get(&Topic::EvalDispatched).unwrap())(ctx.clone(), dispatched).await;

    let started = envelope(
        eval_id,
        Topic::EvalStarted,
        json!({"runner_id": "runner-1", "slot": 0}),
    );
    (table.get(&Topic::EvalStarted).unwrap())(ctx.clone(), started).await;
    let row = harness.store.get(eval_id).await.unwrap();
    assert_eq!(row.status, Status::Running);
    let entry = harness.index.get(eval_id).await.unwrap().unwrap();
    assert_eq!(entry.runner_url, "http://runner-1");

    let heartbeat = envelope(
        eval_id,
        Topic::EvalHeartbeat,
        json!({"runner_id": "runner-1", "slot": 0}),
    );
    (table.get(&Topic::EvalHeartbeat).unwrap())(ctx.clone(), heartbeat).await;
    assert!(harness.index.get(eval_id).await.unwrap().is_some());

    let completed = envelope(
        eval_id,
        Topic::EvalCompleted,
        json!({"exit_code": 0, "output": "1\n"}),
    );
    (table.get(&Topic::EvalCompleted).unwrap())(ctx.clone(), completed).await;

    let row = harness.store.get(eval_id).await.unwrap();
    assert_eq!(row.status, Status::Completed);
    assert_eq!(row.exit_code, Some(0));
    assert_eq!(row.output_preview.as_deref(), Some("1\n"));
    assert!(row.output_ref.is_none());
    assert!(harness.index.get(eval_id).await.unwrap().is_none());

    let audit_contents = std::fs::read_to_string(dir.path().join("reactor.jsonl")).unwrap();
    // queued, dispatched, started, completed — heartbeats are not audited.
    assert_eq!(audit_contents.lines().count(), 4);
}

#[tokio::test]
async fn large_output_spills_to_disk_and_store_keeps_only_a_preview() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let audit = AuditWriter::new(dir.path().join("reactor.jsonl")).unwrap();
    let ctx = Arc::new(ReactorCtx::new(
        harness.store.clone(),
        harness.index.clone(),
        harness.bus.clone(),
        audit,
        16,
        dir.path().display().to_string(),
        Duration::from_secs(5),
    ));
    let table = build_dispatch_table();
    let eval_id = Uuid::new_v4();

    let queued = envelope(
        eval_id,
        Topic::EvalQueued,
        json!({
            "source_text": "print('x' * 1000)",
            "language_tag": "python3",
            "timeout_s": 10,
            "max_output_bytes": 4096,
        }),
    );
    (table.get(&Topic::EvalQueued).unwrap())(ctx.clone(), queued).await;
    (table.get(&Topic::EvalStarted).unwrap())(
        ctx.clone(),
        envelope(eval_id, Topic::EvalStarted, json!({"runner_id": "r1", "slot": 0})),
    )
    .await;

    let big_output = "x".repeat(1000);
    let completed = envelope(
        eval_id,
        Topic::EvalCompleted,
        json!({"exit_code": 0, "output": big_output}),
    );
    (table.get(&Topic::EvalCompleted).unwrap())(ctx.clone(), completed).await;

    let row = harness.store.get(eval_id).await.unwrap();
    assert_eq!(row.output_preview.as_ref().map(|p| p.len()), Some(16));
    let output_ref = row.output_ref.expect("large output must spill to a ref");
    let spilled = std::fs::read_to_string(&output_ref).unwrap();
    assert_eq!(spilled.len(), 1000);
}
