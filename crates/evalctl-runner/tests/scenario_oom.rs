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
async fn memory_blowup_is_reported_as_failed_out_of_memory() {
    let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());
    let sandbox: Arc<dyn Sandbox> =
        Arc::new(FakeSandbox::new().with_oom("x = [0] * (10 ** 12)"));
    let state = Arc::new(AppState::new(
        "runner-1".to_string(),
        sandbox,
        bus.clone(),
        Duration::from_secs(5),
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
            source_text: "x = [0] * (10 ** 12)".to_string(),
            timeout_s: 5,
            max_memory_bytes: Some(64 * 1024 * 1024),
            max_output_bytes: 1024,
        },
    )
    .await;

    let event = failed.next().await.unwrap();
    assert_eq!(event.eval_id, eval_id);
    assert_eq!(event.payload["reason"], "oom");
    assert_eq!(event.payload["exit_code"], 137);
}
