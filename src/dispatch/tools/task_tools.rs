use super::{field, opt_str_field, str_field};
use crate::dispatch::{RequestContext, Tool, ToolOutput};
use crate::models::{OrderScope, Priority, TaskStatus};
use crate::tasks::TaskStore;
use crate::{Result, SpiralError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

fn parse_status(raw: &str) -> Result<TaskStatus> {
    raw.parse().map_err(|_| SpiralError::Validation(format!("unknown task status: {raw}")))
}

fn parse_priority(raw: &str) -> Result<Priority> {
    raw.parse().map_err(|_| SpiralError::Validation(format!("unknown priority: {raw}")))
}

pub struct CreateTask(pub Arc<TaskStore>);

#[async_trait]
impl Tool for CreateTask {
    fn name(&self) -> &str {
        "create_task"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"},
                "parent_task": {"type": "string"},
                "depends_on_tasks": {"type": "array", "items": {"type": "string"}},
                "priority": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["title"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "title").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let title = str_field(&args, "title")?;
        let description = opt_str_field(&args, "description");
        let parent_task = opt_str_field(&args, "parent_task");
        let depends_on_tasks: Vec<String> = args
            .get("depends_on_tasks")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let priority = match opt_str_field(&args, "priority") {
            Some(raw) => parse_priority(&raw)?,
            None => Priority::Medium,
        };
        let tags: HashSet<String> = args
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let task = self
            .0
            .create_task(title, description, ctx.subject.as_str().to_string(), parent_task, depends_on_tasks, priority, tags)
            .await?;
        Ok(ToolOutput::json(&serde_json::json!({"task": task})))
    }
}

pub struct UpdateTaskStatus(pub Arc<TaskStore>);

#[async_trait]
impl Tool for UpdateTaskStatus {
    fn name(&self) -> &str {
        "update_task_status"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"task_id": {"type": "string"}, "status": {"type": "string"}},
            "required": ["task_id", "status"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "task_id").map(drop)?;
        str_field(args, "status").map(drop)
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let task_id = str_field(&args, "task_id")?;
        let status = parse_status(&str_field(&args, "status")?)?;
        let task = self.0.transition(&task_id, status).await?;
        Ok(ToolOutput::json(&serde_json::json!({"task": task})))
    }
}

pub struct UpdateTaskFields(pub Arc<TaskStore>);

#[async_trait]
impl Tool for UpdateTaskFields {
    fn name(&self) -> &str {
        "update_task_fields"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "title": {"type": "string"},
                "description": {"type": ["string", "null"]},
                "priority": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "due_date": {"type": ["string", "null"]},
                "metadata": {"type": "object"},
                "parent_task": {"type": ["string", "null"]},
                "depends_on_tasks": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["task_id"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        field(args, "task_id")?.as_str().ok_or_else(|| SpiralError::Validation("task_id must be a string".to_string()))?;
        Ok(())
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let task_id = str_field(&args, "task_id")?;
        let title = opt_str_field(&args, "title");
        let description = args.get("description").map(|v| v.as_str().map(str::to_string));
        let priority = opt_str_field(&args, "priority").map(|p| parse_priority(&p)).transpose()?;
        let tags: Option<HashSet<String>> = args.get("tags").and_then(|v| v.as_array()).map(|items| {
            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
        });
        let due_date = args.get("due_date").map(|v| {
            v.as_str().and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        });
        let metadata = args
            .get("metadata")
            .and_then(|v| v.as_object())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        let parent_task = args.get("parent_task").map(|v| v.as_str().map(str::to_string));
        let depends_on_tasks: Option<Vec<String>> = args.get("depends_on_tasks").and_then(|v| v.as_array()).map(|items| {
            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
        });

        let task = self
            .0
            .update_fields(&task_id, title, description, priority, tags, due_date, metadata, parent_task, depends_on_tasks)
            .await?;
        Ok(ToolOutput::json(&serde_json::json!({"task": task})))
    }
}

pub struct ViewTasks(pub Arc<TaskStore>);

#[async_trait]
impl Tool for ViewTasks {
    fn name(&self) -> &str {
        "view_tasks"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"task_id": {"type": "string"}}})
    }

    fn validate(&self, _args: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        match opt_str_field(&args, "task_id") {
            Some(task_id) => {
                let task = self.0.get_task(&task_id).await?;
                Ok(ToolOutput::json(&serde_json::json!({"task": task})))
            }
            None => {
                let tasks = self.0.list_tasks().await?;
                Ok(ToolOutput::json(&serde_json::json!({"tasks": tasks})))
            }
        }
    }
}

pub struct SearchTasks(pub Arc<TaskStore>);

#[async_trait]
impl Tool for SearchTasks {
    fn name(&self) -> &str {
        "search_tasks"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}, "status": {"type": "string"}, "tag": {"type": "string"}}
        })
    }

    fn validate(&self, _args: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let query = opt_str_field(&args, "query").unwrap_or_default();
        let status = opt_str_field(&args, "status").map(|s| parse_status(&s)).transpose()?;
        let tag = opt_str_field(&args, "tag");
        let tasks = self.0.search(&query, status, tag.as_deref()).await?;
        Ok(ToolOutput::json(&serde_json::json!({"tasks": tasks})))
    }
}

pub struct BulkUpdateTasks(pub Arc<TaskStore>);

#[async_trait]
impl Tool for BulkUpdateTasks {
    fn name(&self) -> &str {
        "bulk_update_tasks"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_ids": {"type": "array", "items": {"type": "string"}},
                "op": {"type": "string", "enum": ["set_status", "set_priority", "assign", "delete"]},
                "value": {"type": "string"}
            },
            "required": ["task_ids", "op"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        let ids = field(args, "task_ids")?.as_array().ok_or_else(|| SpiralError::Validation("task_ids must be an array".to_string()))?;
        if ids.is_empty() {
            return Err(SpiralError::Validation("task_ids must not be empty".to_string()));
        }
        str_field(args, "op").map(drop)
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let task_ids: Vec<String> = field(&args, "task_ids")?
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let op = str_field(&args, "op")?;
        let value = opt_str_field(&args, "value");

        let mut outcomes = Vec::with_capacity(task_ids.len());
        for id in &task_ids {
            let outcome = match op.as_str() {
                "set_status" => {
                    let status = match value.as_deref().map(parse_status).transpose() {
                        Ok(Some(s)) => s,
                        Ok(None) => {
                            outcomes.push(serde_json::json!({"task_id": id, "ok": false, "error": "set_status requires value"}));
                            continue;
                        }
                        Err(e) => {
                            outcomes.push(serde_json::json!({"task_id": id, "ok": false, "error": e.to_string()}));
                            continue;
                        }
                    };
                    self.0.transition(id, status).await.map(|_| ())
                }
                "set_priority" => match value.as_deref().map(parse_priority).transpose() {
                    Ok(Some(priority)) => {
                        self.0.update_fields(id, None, None, Some(priority), None, None, None, None, None).await.map(|_| ())
                    }
                    Ok(None) => Err(SpiralError::Validation("set_priority requires value".to_string())),
                    Err(e) => Err(e),
                },
                "assign" => self.0.assign(id, value.as_deref()).await.map(|_| ()),
                "delete" => self.0.delete(id).await,
                other => Err(SpiralError::Validation(format!("unknown bulk op: {other}"))),
            };
            match outcome {
                Ok(()) => outcomes.push(serde_json::json!({"task_id": id, "ok": true})),
                Err(e) => outcomes.push(serde_json::json!({"task_id": id, "ok": false, "error": e.to_string()})),
            }
        }
        Ok(ToolOutput::json(&serde_json::json!({"outcomes": outcomes})))
    }
}

pub struct ReorderTasks(pub Arc<TaskStore>);

#[async_trait]
impl Tool for ReorderTasks {
    fn name(&self) -> &str {
        "reorder_tasks"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "new_index": {"type": "integer"},
                "scope": {"type": "string", "enum": ["parent", "global"]}
            },
            "required": ["task_id", "new_index"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "task_id").map(drop)?;
        field(args, "new_index")?.as_i64().ok_or_else(|| SpiralError::Validation("new_index must be an integer".to_string()))?;
        Ok(())
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let task_id = str_field(&args, "task_id")?;
        let new_index = field(&args, "new_index")?.as_i64().unwrap();
        let scope = match opt_str_field(&args, "scope").as_deref() {
            Some("global") => OrderScope::Global,
            _ => {
                let task = self.0.get_task(&task_id).await?;
                OrderScope::Parent(task.parent_task)
            }
        };
        self.0.reorder(&task_id, scope, new_index).await?;
        Ok(ToolOutput::json(&serde_json::json!({"reordered": true})))
    }
}

pub struct DeleteTask(pub Arc<TaskStore>);

#[async_trait]
impl Tool for DeleteTask {
    fn name(&self) -> &str {
        "delete_task"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"task_id": {"type": "string"}}, "required": ["task_id"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "task_id").map(drop)
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let task_id = str_field(&args, "task_id")?;
        self.0.delete(&task_id).await?;
        Ok(ToolOutput::json(&serde_json::json!({"deleted": true})))
    }
}

pub struct AssignTask(pub Arc<TaskStore>);

#[async_trait]
impl Tool for AssignTask {
    fn name(&self) -> &str {
        "assign_task"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"task_id": {"type": "string"}, "agent_id": {"type": ["string", "null"]}},
            "required": ["task_id"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "task_id").map(drop)
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let task_id = str_field(&args, "task_id")?;
        let agent_id = opt_str_field(&args, "agent_id");
        let task = self.0.assign(&task_id, agent_id.as_deref()).await?;
        Ok(ToolOutput::json(&serde_json::json!({"task": task})))
    }
}
