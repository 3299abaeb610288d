//! Context Store: key/value project context with append-only history
//! and a glob/substring query surface.

use crate::models::{ChangeEvent, ContextEntry, ContextHistoryRow};
use crate::persistence::PgStore;
use crate::realtime::ChannelRegistry;
use crate::validation::SecurityPipeline;
use crate::{Result, SpiralError};
use std::sync::Arc;

pub struct ContextStore {
    store: Arc<PgStore>,
    channels: Arc<ChannelRegistry>,
    security: Arc<SecurityPipeline>,
}

impl ContextStore {
    pub fn new(store: Arc<PgStore>, channels: Arc<ChannelRegistry>, security: Arc<SecurityPipeline>) -> Self {
        Self { store, channels, security }
    }

    /// Validates `key` as a safe identifier and `value` as a JSON object
    /// under the configured size cap, then writes the entry and appends
    /// to history in one transaction.
    pub async fn update_project_context(
        &self,
        key: &str,
        value: serde_json::Value,
        description: Option<String>,
        updated_by: String,
    ) -> Result<ContextEntry> {
        self.security.validate_context_key(key)?;
        if !value.is_object() {
            return Err(SpiralError::Validation("context value must be a JSON object".to_string()));
        }
        let serialized = serde_json::to_string(&value)?;
        self.security.validate_and_sanitize_context_value(&serialized)?;

        let entry = ContextEntry {
            context_key: key.to_string(),
            value,
            description,
            updated_by,
            updated_at: chrono::Utc::now(),
        };
        self.store.set_context(entry.clone()).await?;
        self.channels
            .publish("context", ChangeEvent::new("context.updated", key, serde_json::json!({})))
            .await;
        Ok(entry)
    }

    pub async fn view_project_context(&self, key: Option<&str>) -> Result<Vec<ContextEntry>> {
        match key {
            Some(key) => {
                let entry = self
                    .store
                    .get_context(key)
                    .await?
                    .ok_or_else(|| SpiralError::NotFound(format!("context key not found: {key}")))?;
                Ok(vec![entry])
            }
            None => self.store.list_context().await,
        }
    }

    /// `*`-glob or literal-substring match on keys. A pattern containing no
    /// `*` is treated as a substring search; otherwise each `*` is
    /// translated to "match anything" the way a shell glob would.
    pub async fn query_project_context(&self, pattern: &str) -> Result<Vec<ContextEntry>> {
        let all = self.store.list_context().await?;
        Ok(all.into_iter().filter(|e| glob_or_substring_match(pattern, &e.context_key)).collect())
    }

    pub async fn history(&self, key: &str) -> Result<Vec<ContextHistoryRow>> {
        self.store.get_history(key).await
    }
}

fn glob_or_substring_match(pattern: &str, candidate: &str) -> bool {
    if !pattern.contains('*') {
        return candidate.contains(pattern);
    }
    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = candidate;
    for (idx, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if idx == 0 && !pattern.starts_with('*') {
            if !rest.starts_with(segment) {
                return false;
            }
            rest = &rest[segment.len()..];
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    if !pattern.ends_with('*') {
        let last = segments.last().unwrap();
        if !last.is_empty() && !candidate.ends_with(last) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_is_substring_match() {
        assert!(glob_or_substring_match("project", "project.name"));
        assert!(!glob_or_substring_match("other", "project.name"));
    }

    #[test]
    fn glob_prefix_and_suffix() {
        assert!(glob_or_substring_match("project.*", "project.name"));
        assert!(glob_or_substring_match("*.name", "project.name"));
        assert!(!glob_or_substring_match("*.name", "project.value"));
    }

    #[test]
    fn glob_middle_wildcard() {
        assert!(glob_or_substring_match("project.*.value", "project.sub.value"));
        assert!(!glob_or_substring_match("project.*.value", "project.sub.other"));
    }
}
