//! Scenario tests mirroring the task graph and security behaviors an
//! operator exercises end-to-end. All of these need a live database;
//! see `tests/common/mod.rs`.

mod common;

use spiral_core::config::SanitizeMode;
use spiral_core::models::{OrderScope, Priority, TaskStatus};
use spiral_core::SpiralError;
use std::collections::HashSet;

#[tokio::test]
#[ignore]
async fn create_assign_complete_transitions_through_the_fsm() {
    let h = common::harness().await;
    h.agents
        .spawn_agent("a1".to_string(), HashSet::from(["backend".to_string()]), "/tmp".to_string(), None)
        .await
        .unwrap();

    let mut events = h.channels.subscribe("tasks").await;

    let task = h
        .tasks
        .create_task("t1".to_string(), None, "a1".to_string(), None, vec![], Priority::Medium, HashSet::new())
        .await
        .unwrap();

    h.tasks.assign(&task.task_id, Some("a1")).await.unwrap();
    h.tasks.transition(&task.task_id, TaskStatus::InProgress).await.unwrap();
    let completed = h.tasks.transition(&task.task_id, TaskStatus::Completed).await.unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.assigned_to.as_deref(), Some("a1"));

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.event_type == "task_status_changed" && event.entity_id == task.task_id {
            statuses.push(event.changes["status"].as_str().unwrap().to_string());
        }
    }
    assert_eq!(statuses, vec!["InProgress", "Completed"]);
}

#[tokio::test]
#[ignore]
async fn introducing_a_cycle_through_parent_is_rejected() {
    let h = common::harness().await;
    let a = h
        .tasks
        .create_task("A".to_string(), None, "system".to_string(), None, vec![], Priority::Medium, HashSet::new())
        .await
        .unwrap();
    let b = h
        .tasks
        .create_task(
            "B".to_string(),
            None,
            "system".to_string(),
            Some(a.task_id.clone()),
            vec![],
            Priority::Medium,
            HashSet::new(),
        )
        .await
        .unwrap();
    let c = h
        .tasks
        .create_task(
            "C".to_string(),
            None,
            "system".to_string(),
            Some(b.task_id.clone()),
            vec![],
            Priority::Medium,
            HashSet::new(),
        )
        .await
        .unwrap();

    let err = h
        .tasks
        .update_fields(&a.task_id, None, None, None, None, None, None, Some(Some(c.task_id.clone())), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SpiralError::InvalidRelation(_)));

    let reloaded = h.tasks.get_task(&a.task_id).await.unwrap();
    assert_eq!(reloaded.parent_task, None);
}

#[tokio::test]
#[ignore]
async fn reordering_moves_the_task_to_the_front_of_its_scope() {
    let h = common::harness().await;
    let parent = h
        .tasks
        .create_task("P".to_string(), None, "system".to_string(), None, vec![], Priority::Medium, HashSet::new())
        .await
        .unwrap();
    let mut children = Vec::new();
    for title in ["X", "Y", "Z"] {
        children.push(
            h.tasks
                .create_task(
                    title.to_string(),
                    None,
                    "system".to_string(),
                    Some(parent.task_id.clone()),
                    vec![],
                    Priority::Medium,
                    HashSet::new(),
                )
                .await
                .unwrap(),
        );
    }
    let z = &children[2];

    h.tasks.reorder(&z.task_id, OrderScope::Parent(Some(parent.task_id.clone())), 0).await.unwrap();

    let mut siblings = h.tasks.list_tasks().await.unwrap();
    siblings.retain(|t| t.parent_task.as_deref() == Some(parent.task_id.as_str()));
    siblings.sort_by_key(|t| t.display_order);
    let titles: Vec<&str> = siblings.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Z", "X", "Y"]);
    assert_eq!(
        siblings.iter().map(|t| t.display_order).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[tokio::test]
#[ignore]
async fn blocked_mode_rejects_critical_content_and_creates_no_task() {
    let h = common::harness_with_sanitize_mode(SanitizeMode::Block).await;
    let before = h.tasks.list_tasks().await.unwrap().len();

    let err = h
        .tasks
        .create_task(
            "ok".to_string(),
            Some("<script>steal_system_prompt()</script>".to_string()),
            "system".to_string(),
            None,
            vec![],
            Priority::Medium,
            HashSet::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SpiralError::Security(_)));

    let after = h.tasks.list_tasks().await.unwrap().len();
    assert_eq!(before, after);
}
