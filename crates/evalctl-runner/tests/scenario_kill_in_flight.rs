use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::{Bus, InMemoryBus};
use evalctl_runner::exec::{run_on_slot, RunRequest};
use evalctl_runner::state::AppState;
use evalctl_sandbox::{KillSwitch, Sandbox};
use evalctl_schemas::Topic;
use evalctl_testkit::FakeSandbox;
use futures_util::StreamExt;
use uuid::Uuid;

#[tokio::test]
async fn kill_request_while_running_terminates_before_timeout() {
    let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());
    let sandbox: Arc<dyn Sandbox> = Arc::new(FakeSandbox::new().with_hang("while True: pass"));
    let state = Arc::new(AppState::new(
        "runner-1".to_string(),
        sandbox,
        bus.clone(),
        Duration::from_secs(30),
        1,
    ));

    let mut cancelled = bus.subscribe(Topic::EvalCancelled).await.unwrap();
    let eval_id = Uuid::new_v4();
    let slot_idx = state.claim_idle_slot(eval_id).await.unwrap();

    let run_state = state.clone();
    let run_task = tokio::spawn(run_on_slot(
        run_state,
        slot_idx,
        RunRequest {
            eval_id,
            language_tag: "python3".to_string(),
            source_text: "while True: pass".to_string(),
            timeout_s: 30,
            max_memory_bytes: None,
            max_output_bytes: 1024,
        },
    ));

    // Give the spawn a moment to land in the slot, then kill it. A 30s
    // timeout on the sandbox means this only passes if the kill switch
    // actually short-circuits `wait`, not the timeout path.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let kill_switch = {
        let slot = state.slots[slot_idx].lock().await;
        slot.kill_switch.clone()
    };
    kill_switch.expect("slot should have a kill switch once spawned").kill().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), run_task)
        .await
        .expect("run_on_slot should return promptly after kill")
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), cancelled.next())
        .await
        .expect("eval.cancelled should already be published")
        .unwrap();
    assert_eq!(event.eval_id, eval_id);
    assert_eq!(state.free_slots().await, 1);
}
