//! Task Store & Ordering: the task graph's status FSM, placement
//! validation (dangling references, cycles), and display-order
//! maintenance in either per-parent or global scope.

use crate::models::{ChangeEvent, OrderScope, Priority, Task, TaskStatus};
use crate::persistence::PgStore;
use crate::realtime::ChannelRegistry;
use crate::validation::SecurityPipeline;
use crate::{Result, SpiralError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct TaskStore {
    store: Arc<PgStore>,
    channels: Arc<ChannelRegistry>,
    security: Arc<SecurityPipeline>,
}

impl TaskStore {
    pub fn new(store: Arc<PgStore>, channels: Arc<ChannelRegistry>, security: Arc<SecurityPipeline>) -> Self {
        Self { store, channels, security }
    }

    pub async fn create_task(
        &self,
        title: String,
        description: Option<String>,
        created_by: String,
        parent_task: Option<String>,
        depends_on_tasks: Vec<String>,
        priority: Priority,
        tags: HashSet<String>,
    ) -> Result<Task> {
        if title.trim().is_empty() || title.len() > crate::constants::MAX_TITLE_LENGTH {
            return Err(SpiralError::Validation(format!(
                "title must be 1-{} characters",
                crate::constants::MAX_TITLE_LENGTH
            )));
        }
        if let Some(ref d) = description {
            if d.len() > crate::constants::MAX_DESCRIPTION_LENGTH {
                return Err(SpiralError::Validation(format!(
                    "description must be at most {} characters",
                    crate::constants::MAX_DESCRIPTION_LENGTH
                )));
            }
        }
        if tags.len() > crate::constants::MAX_TASK_TAGS {
            return Err(SpiralError::Validation(format!(
                "at most {} tags are allowed",
                crate::constants::MAX_TASK_TAGS
            )));
        }

        let title = self.security.validate_and_sanitize_task_content(&title)?;
        let description = description
            .map(|d| self.security.validate_and_sanitize_task_content(&d))
            .transpose()?;

        if let Some(ref parent_id) = parent_task {
            self.store
                .get_task(parent_id)
                .await?
                .ok_or_else(|| SpiralError::InvalidRelation(format!("parent task does not exist: {parent_id}")))?;
        }
        for dep in &depends_on_tasks {
            self.store
                .get_task(dep)
                .await?
                .ok_or_else(|| SpiralError::InvalidRelation(format!("dependency does not exist: {dep}")))?;
        }
        self.ensure_no_cycle(None, &depends_on_tasks, parent_task.as_deref()).await?;

        let mut task = Task::new(title, created_by);
        task.description = description;
        task.parent_task = parent_task.clone();
        task.depends_on_tasks = depends_on_tasks;
        task.priority = priority;
        task.tags = tags;
        task.display_order = self.next_display_order(OrderScope::Parent(parent_task)).await?;

        self.store.insert_task(task.clone()).await?;
        self.channels
            .publish("tasks", ChangeEvent::new("task_created", &task.task_id, serde_json::json!({})))
            .await;
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| SpiralError::NotFound(format!("task not found: {task_id}")))
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.store.list_tasks().await
    }

    /// Transitions a task's status, enforcing the FSM in
    /// [`TaskStatus::can_transition_to`].
    pub async fn transition(&self, task_id: &str, next: TaskStatus) -> Result<Task> {
        let task = self.get_task(task_id).await?;
        if !task.status.can_transition_to(&next) {
            return Err(SpiralError::InvalidTransition(format!(
                "cannot move task {task_id} from {:?} to {:?}",
                task.status, next
            )));
        }
        self.store.update_task_status(task_id, next).await?;
        self.channels
            .publish("tasks", ChangeEvent::new("task_status_changed", task_id, serde_json::json!({"status": format!("{next:?}")})))
            .await;
        self.get_task(task_id).await
    }

    /// Reorders a task within its scope, shifting neighbors to keep
    /// `display_order` dense (0..n) within the scope.
    pub async fn reorder(&self, task_id: &str, scope: OrderScope, new_position: i64) -> Result<()> {
        let siblings = self.siblings_in_scope(&scope).await?;
        if !siblings.iter().any(|t| t.task_id == task_id) {
            return Err(SpiralError::InvalidRelation(format!(
                "task {task_id} is not a member of the requested scope"
            )));
        }
        let mut ordered: Vec<&Task> = siblings.iter().filter(|t| t.task_id != task_id).collect();
        let clamped = new_position.clamp(0, ordered.len() as i64);
        ordered.insert(clamped as usize, siblings.iter().find(|t| t.task_id == task_id).unwrap());

        for (idx, task) in ordered.iter().enumerate() {
            self.store.set_display_order(&task.task_id, idx as i64).await?;
        }
        Ok(())
    }

    async fn siblings_in_scope(&self, scope: &OrderScope) -> Result<Vec<Task>> {
        let all = self.store.list_tasks().await?;
        Ok(match scope {
            OrderScope::Global => all,
            OrderScope::Parent(parent) => all.into_iter().filter(|t| &t.parent_task == parent).collect(),
        })
    }

    async fn next_display_order(&self, scope: OrderScope) -> Result<i64> {
        Ok(self.siblings_in_scope(&scope).await?.len() as i64)
    }

    /// DFS cycle check over the combined dependency/parent graph, treating
    /// the candidate task (identified by `task_id`, `None` for a
    /// not-yet-created task) as depending on `new_deps` and parented under
    /// `new_parent`. Every other task's edges come from its current
    /// `depends_on_tasks` and `parent_task`, so a cycle introduced purely
    /// by reparenting is caught the same way a dependency cycle is.
    async fn ensure_no_cycle(&self, task_id: Option<&str>, new_deps: &[String], new_parent: Option<&str>) -> Result<()> {
        let all = self.store.list_tasks().await?;
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for t in &all {
            let mut edges = t.depends_on_tasks.clone();
            if let Some(parent) = &t.parent_task {
                edges.push(parent.clone());
            }
            adjacency.insert(t.task_id.clone(), edges);
        }

        let mut candidate_edges = new_deps.to_vec();
        if let Some(parent) = new_parent {
            candidate_edges.push(parent.to_string());
        }
        let start = task_id.unwrap_or("__pending__").to_string();
        adjacency.insert(start.clone(), candidate_edges);

        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        if has_cycle(&start, &adjacency, &mut visiting, &mut visited) {
            return Err(SpiralError::InvalidRelation("dependency graph would contain a cycle".to_string()));
        }
        Ok(())
    }

    pub async fn bulk_update_status(&self, task_ids: &[String], next: TaskStatus) -> Result<Vec<Result<Task>>> {
        let mut results = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            results.push(self.transition(id, next).await);
        }
        Ok(results)
    }

    pub async fn assign(&self, task_id: &str, agent_id: Option<&str>) -> Result<Task> {
        self.get_task(task_id).await?;
        self.store.assign_task(task_id, agent_id).await?;
        self.channels
            .publish(
                "tasks",
                ChangeEvent::new("task_assigned", task_id, serde_json::json!({"assigned_to": agent_id})),
            )
            .await;
        self.get_task(task_id).await
    }

    /// Patches title/description/priority/tags/due_date/metadata and
    /// optionally `parent_task`/`depends_on_tasks`. Runs the same
    /// placement validation `create_task` does whenever relations
    /// change.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_fields(
        &self,
        task_id: &str,
        title: Option<String>,
        description: Option<Option<String>>,
        priority: Option<Priority>,
        tags: Option<HashSet<String>>,
        due_date: Option<Option<chrono::NaiveDate>>,
        metadata: Option<HashMap<String, serde_json::Value>>,
        parent_task: Option<Option<String>>,
        depends_on_tasks: Option<Vec<String>>,
    ) -> Result<Task> {
        let mut task = self.get_task(task_id).await?;

        if let Some(title) = title {
            if title.trim().is_empty() || title.len() > crate::constants::MAX_TITLE_LENGTH {
                return Err(SpiralError::Validation(format!(
                    "title must be 1-{} characters",
                    crate::constants::MAX_TITLE_LENGTH
                )));
            }
            task.title = self.security.validate_and_sanitize_task_content(&title)?;
        }
        if let Some(description) = description {
            task.description = description
                .map(|d| self.security.validate_and_sanitize_task_content(&d))
                .transpose()?;
        }
        if let Some(priority) = priority {
            task.priority = priority;
        }
        if let Some(tags) = tags {
            if tags.len() > crate::constants::MAX_TASK_TAGS {
                return Err(SpiralError::Validation(format!(
                    "at most {} tags are allowed",
                    crate::constants::MAX_TASK_TAGS
                )));
            }
            task.tags = tags;
        }
        if let Some(due_date) = due_date {
            task.due_date = due_date;
        }
        if let Some(metadata) = metadata {
            task.metadata = metadata;
        }

        let relations_changed = parent_task.is_some() || depends_on_tasks.is_some();
        if let Some(parent_task) = parent_task {
            if let Some(ref parent_id) = parent_task {
                if parent_id == task_id {
                    return Err(SpiralError::InvalidRelation("a task cannot be its own parent".to_string()));
                }
                self.store
                    .get_task(parent_id)
                    .await?
                    .ok_or_else(|| SpiralError::InvalidRelation(format!("parent task does not exist: {parent_id}")))?;
            }
            task.parent_task = parent_task;
        }
        if let Some(depends_on_tasks) = depends_on_tasks {
            for dep in &depends_on_tasks {
                self.store
                    .get_task(dep)
                    .await?
                    .ok_or_else(|| SpiralError::InvalidRelation(format!("dependency does not exist: {dep}")))?;
            }
            task.depends_on_tasks = depends_on_tasks;
        }
        if relations_changed {
            self.ensure_no_cycle(Some(task_id), &task.depends_on_tasks, task.parent_task.as_deref()).await?;
        }

        self.store.update_task_fields(&task).await?;
        self.channels
            .publish("tasks", ChangeEvent::new("task_updated", task_id, serde_json::json!({})))
            .await;
        self.get_task(task_id).await
    }

    /// Deletes a task. Refuses unless every descendant is in a terminal
    /// state, so a delete can never orphan in-flight work.
    pub async fn delete(&self, task_id: &str) -> Result<()> {
        let task = self.get_task(task_id).await?;
        let all = self.store.list_tasks().await?;
        let descendants = collect_descendants(task_id, &all);
        if let Some(blocker) = descendants.iter().find(|t| !t.status.is_terminal()) {
            return Err(SpiralError::InvalidRelation(format!(
                "cannot delete {task_id}: descendant {} is not in a terminal state",
                blocker.task_id
            )));
        }
        self.store.delete_task(task_id).await?;
        self.channels
            .publish("tasks", ChangeEvent::new("task_deleted", &task.task_id, serde_json::json!({})))
            .await;
        Ok(())
    }

    pub async fn search(&self, query: &str, status: Option<TaskStatus>, tag: Option<&str>) -> Result<Vec<Task>> {
        let query_lower = query.to_lowercase();
        let tasks = self.store.list_tasks().await?;
        Ok(tasks
            .into_iter()
            .filter(|t| query.is_empty() || t.title.to_lowercase().contains(&query_lower))
            .filter(|t| status.map(|s| t.status == s).unwrap_or(true))
            .filter(|t| tag.map(|tag| t.tags.contains(tag)).unwrap_or(true))
            .collect())
    }
}

fn collect_descendants(task_id: &str, all: &[Task]) -> Vec<Task> {
    let mut out = Vec::new();
    let mut frontier = vec![task_id.to_string()];
    while let Some(parent) = frontier.pop() {
        for task in all {
            if task.parent_task.as_deref() == Some(parent.as_str()) {
                frontier.push(task.task_id.clone());
                out.push(task.clone());
            }
        }
    }
    out
}

fn has_cycle(
    node: &str,
    adjacency: &HashMap<String, Vec<String>>,
    visiting: &mut HashSet<String>,
    visited: &mut HashSet<String>,
) -> bool {
    if visited.contains(node) {
        return false;
    }
    if !visiting.insert(node.to_string()) {
        return true;
    }
    if let Some(deps) = adjacency.get(node) {
        for dep in deps {
            if has_cycle(dep, adjacency, visiting, visited) {
                return true;
            }
        }
    }
    visiting.remove(node);
    visited.insert(node.to_string());
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[test]
    fn direct_self_dependency_is_a_cycle() {
        let mut adjacency = Map::new();
        adjacency.insert("a".to_string(), vec!["a".to_string()]);
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        assert!(has_cycle("a", &adjacency, &mut visiting, &mut visited));
    }

    #[test]
    fn transitive_cycle_is_detected() {
        let mut adjacency = Map::new();
        adjacency.insert("a".to_string(), vec!["b".to_string()]);
        adjacency.insert("b".to_string(), vec!["c".to_string()]);
        adjacency.insert("c".to_string(), vec!["a".to_string()]);
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        assert!(has_cycle("a", &adjacency, &mut visiting, &mut visited));
    }

    #[test]
    fn dag_without_cycle_passes() {
        let mut adjacency = Map::new();
        adjacency.insert("a".to_string(), vec!["b".to_string(), "c".to_string()]);
        adjacency.insert("b".to_string(), vec!["c".to_string()]);
        adjacency.insert("c".to_string(), vec![]);
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        assert!(!has_cycle("a", &adjacency, &mut visiting, &mut visited));
    }
}
