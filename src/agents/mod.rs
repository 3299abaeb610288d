//! Agent Manager: agent lifecycle, file claims, and inter-agent messaging.
//!
//! Agents are lightweight identities registered against a working
//! directory and a capability set. File claims are advisory locks the
//! dispatcher consults before letting two agents edit the same path
//! concurrently; they are never enforced at the filesystem level.

use crate::auth::TokenRegistry;
use crate::models::{Agent, AgentMessage, AgentStatus, ChangeEvent, FileClaim};
use crate::persistence::PgStore;
use crate::realtime::ChannelRegistry;
use crate::{Result, SpiralError};
use std::collections::HashSet;
use std::sync::Arc;

pub struct AgentManager {
    store: Arc<PgStore>,
    tokens: Arc<TokenRegistry>,
    channels: Arc<ChannelRegistry>,
    max_agents: usize,
    agent_timeout_secs: u64,
}

impl AgentManager {
    pub fn new(
        store: Arc<PgStore>,
        tokens: Arc<TokenRegistry>,
        channels: Arc<ChannelRegistry>,
        max_agents: usize,
        agent_timeout_secs: u64,
    ) -> Self {
        Self { store, tokens, channels, max_agents, agent_timeout_secs }
    }

    pub async fn spawn_agent(
        &self,
        agent_id: String,
        capabilities: HashSet<String>,
        working_directory: String,
        role: Option<String>,
    ) -> Result<(Agent, String)> {
        if self.store.get_agent(&agent_id).await?.is_some() {
            return Err(SpiralError::AlreadyExists(format!("agent already exists: {agent_id}")));
        }
        if self.store.list_agents().await?.len() >= self.max_agents {
            return Err(SpiralError::ResourceExhausted(format!(
                "agent limit of {} reached",
                self.max_agents
            )));
        }

        let mut agent = Agent::new(agent_id.clone(), capabilities, working_directory);
        agent.role = role;
        agent.status = AgentStatus::Active;
        self.store.insert_agent(agent.clone()).await?;
        let token = self.tokens.issue(&agent_id).await?;

        self.channels
            .publish("agents", ChangeEvent::new("agent_created", &agent_id, serde_json::json!({})))
            .await;

        Ok((agent, token))
    }

    /// Terminates an agent and cleans up everything it was holding: its
    /// bearer tokens are revoked, its file claims released, and any task
    /// it had in progress goes back to `pending` unassigned rather than
    /// sitting stuck forever.
    pub async fn terminate_agent(&self, agent_id: &str) -> Result<()> {
        self.store.terminate_agent(agent_id).await?;
        self.tokens.revoke_all_for(agent_id).await?;
        self.store.release_claims_for_agent(agent_id).await?;
        self.store.reassign_in_progress_tasks(agent_id).await?;
        self.channels
            .publish("agents", ChangeEvent::new("agent_terminated", agent_id, serde_json::json!({})))
            .await;
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| SpiralError::NotFound(format!("agent not found: {agent_id}")))
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.store.list_agents().await
    }

    /// Returns `(claimed, holder)`: `(true, agent_id)` on success,
    /// `(false, Some(other_holder))` without erroring when the path is
    /// already held by someone else -- an atomic insert-if-absent, not
    /// a lock acquisition that blocks or fails.
    pub async fn claim_file(&self, file_path: &str, agent_id: &str) -> Result<(bool, Option<String>)> {
        self.get_agent(agent_id).await?;
        match self.store.claim_file(file_path, agent_id).await {
            Ok(()) => {
                self.channels
                    .publish("agents", ChangeEvent::new("file_claimed", file_path, serde_json::json!({"agent_id": agent_id})))
                    .await;
                Ok((true, Some(agent_id.to_string())))
            }
            Err(SpiralError::Conflict(_)) => {
                let holder = self.store.get_claim(file_path).await?.map(|c| c.agent_id);
                Ok((false, holder))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn file_metadata(&self, file_path: &str) -> Result<Option<FileClaim>> {
        self.store.get_claim(file_path).await
    }

    pub async fn release_file(&self, file_path: &str, agent_id: &str) -> Result<()> {
        self.store.release_file(file_path, agent_id).await?;
        self.channels
            .publish("agents", ChangeEvent::new("file_released", file_path, serde_json::json!({"agent_id": agent_id})))
            .await;
        Ok(())
    }

    pub async fn claims_for(&self, agent_id: &str) -> Result<Vec<FileClaim>> {
        self.store.list_claims_for_agent(agent_id).await
    }

    pub async fn send_message(&self, from: &str, to: Option<&str>, payload: serde_json::Value) -> Result<AgentMessage> {
        self.get_agent(from).await?;
        if let Some(to) = to {
            self.get_agent(to).await?;
        }
        let message = AgentMessage::new(from.to_string(), to.map(str::to_string), payload);
        self.store.insert_message(message.clone()).await?;
        self.channels
            .publish("agents", ChangeEvent::new("message_sent", &message.message_id, serde_json::json!({"from": from, "to": to})))
            .await;
        Ok(message)
    }

    pub async fn inbox(&self, agent_id: &str) -> Result<Vec<AgentMessage>> {
        self.store.inbox_for(agent_id).await
    }

    /// Terminates any `Active` agent whose last activity is older than
    /// `agent_timeout_secs * ABANDONED_AGENT_TIMEOUT_MULTIPLE`. Returns
    /// the ids terminated, for the caller to log.
    pub async fn prune_abandoned(&self) -> Result<Vec<String>> {
        let threshold = chrono::Duration::seconds(
            self.agent_timeout_secs as i64 * crate::constants::ABANDONED_AGENT_TIMEOUT_MULTIPLE as i64,
        );
        let cutoff = chrono::Utc::now() - threshold;

        let mut terminated = Vec::new();
        for agent in self.store.list_agents().await? {
            if agent.status == AgentStatus::Active && agent.updated_at < cutoff {
                self.terminate_agent(&agent.agent_id).await?;
                terminated.push(agent.agent_id);
            }
        }
        Ok(terminated)
    }
}

#[cfg(test)]
mod tests {
    // Every method here round-trips through `PgStore`, so exercising
    // them needs a live database; see `tests/agent_lifecycle.rs` for
    // the ignored integration coverage.
}
