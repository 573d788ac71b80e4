use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::{Bus, InMemoryBus};
use evalctl_runner::exec::{run_on_slot, RunRequest};
use evalctl_runner::state::AppState;
use evalctl_sandbox::Sandbox;
use evalctl_schemas::Topic;
use evalctl_testkit::FakeSandbox;
use futures_util::StreamExt;
use uuid::Uuid;

#[tokio::test]
async fn hung_process_is_killed_by_timeout() {
    let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());
    let sandbox: Arc<dyn Sandbox> = Arc::new(FakeSandbox::new().with_hang("while True: pass"));
    let state = Arc::new(AppState::new(
        "runner-1".to_string(),
        sandbox,
        bus.clone(),
        Duration::from_secs(1),
        1,
    ));

    let mut failed = bus.subscribe(Topic::EvalFailed).await.unwrap();
    let eval_id = Uuid::new_v4();
    let slot_idx = state.claim_idle_slot(eval_id).await.unwrap();
    run_on_slot(
        state.clone(),
        slot_idx,
        RunRequest {
            eval_id,
            language_tag: "python3".to_string(),
            source_text: "while True: pass".to_string(),
            timeout_s: 1,
            max_memory_bytes: None,
            max_output_bytes: 1024,
        },
    )
    .await;

    let event = failed.next().await.unwrap();
    assert_eq!(event.eval_id, eval_id);
    assert_eq!(event.payload["reason"], "timeout");
    assert!(matches!(event.payload["exit_code"].as_i64(), Some(124) | Some(143)));
    assert_eq!(state.free_slots().await, 1);
}
