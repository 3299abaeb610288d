//! Agent/file-claim round-trip and idempotence checks. Needs a live
//! database; see `tests/common/mod.rs`.

mod common;

use std::collections::HashSet;

#[tokio::test]
#[ignore]
async fn claim_then_release_restores_the_pre_claim_state() {
    let h = common::harness().await;
    h.agents
        .spawn_agent("a1".to_string(), HashSet::new(), "/tmp".to_string(), None)
        .await
        .unwrap();

    let before = h.agents.file_metadata("src/lib.rs").await.unwrap();
    assert!(before.is_none());

    let (claimed, holder) = h.agents.claim_file("src/lib.rs", "a1").await.unwrap();
    assert!(claimed);
    assert_eq!(holder.as_deref(), Some("a1"));

    h.agents.release_file("src/lib.rs", "a1").await.unwrap();
    let after = h.agents.file_metadata("src/lib.rs").await.unwrap();
    assert!(after.is_none());
}

#[tokio::test]
#[ignore]
async fn a_second_claim_on_the_same_path_never_succeeds() {
    let h = common::harness().await;
    h.agents.spawn_agent("a1".to_string(), HashSet::new(), "/tmp".to_string(), None).await.unwrap();
    h.agents.spawn_agent("a2".to_string(), HashSet::new(), "/tmp".to_string(), None).await.unwrap();

    let (first, _) = h.agents.claim_file("src/shared.rs", "a1").await.unwrap();
    assert!(first);

    let (second, holder) = h.agents.claim_file("src/shared.rs", "a2").await.unwrap();
    assert!(!second);
    assert_eq!(holder.as_deref(), Some("a1"));
}

#[tokio::test]
#[ignore]
async fn terminate_agent_is_idempotent() {
    let h = common::harness().await;
    h.agents.spawn_agent("a1".to_string(), HashSet::new(), "/tmp".to_string(), None).await.unwrap();

    h.agents.terminate_agent("a1").await.unwrap();
    h.agents.terminate_agent("a1").await.unwrap();

    let agent = h.agents.get_agent("a1").await.unwrap();
    assert_eq!(agent.status, spiral_core::models::AgentStatus::Terminated);
}
