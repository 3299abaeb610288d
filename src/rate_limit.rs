//! Per-process rate limiting for the tool dispatch surface. Each agent
//! gets its own limiter so a noisy agent cannot starve others; a single
//! shared limiter caps total call volume regardless of origin.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{collections::HashMap, num::NonZeroU32, sync::Arc};
use tokio::sync::RwLock;

pub const GLOBAL_REQUESTS_PER_MINUTE: u32 = 600;
pub const PER_AGENT_REQUESTS_PER_MINUTE: u32 = 60;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RateLimitRegistry {
    global: Arc<Limiter>,
    per_agent: RwLock<HashMap<String, Arc<Limiter>>>,
}

impl RateLimitRegistry {
    pub fn new() -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(GLOBAL_REQUESTS_PER_MINUTE).unwrap());
        Self {
            global: Arc::new(RateLimiter::direct(quota)),
            per_agent: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if the call is admitted, `false` if it should be
    /// rejected with `ResourceExhausted`.
    pub async fn check(&self, agent_id: &str) -> bool {
        if self.global.check().is_err() {
            return false;
        }
        let limiter = {
            let guard = self.per_agent.read().await;
            guard.get(agent_id).cloned()
        };
        let limiter = match limiter {
            Some(l) => l,
            None => {
                let quota = Quota::per_minute(NonZeroU32::new(PER_AGENT_REQUESTS_PER_MINUTE).unwrap());
                let created = Arc::new(RateLimiter::direct(quota));
                self.per_agent.write().await.insert(agent_id.to_string(), created.clone());
                created
            }
        };
        limiter.check().is_ok()
    }
}

impl Default for RateLimitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_is_admitted() {
        let registry = RateLimitRegistry::new();
        assert!(registry.check("agent-1").await);
    }

    #[tokio::test]
    async fn distinct_agents_get_independent_budgets() {
        let registry = RateLimitRegistry::new();
        for _ in 0..5 {
            assert!(registry.check("agent-a").await);
            assert!(registry.check("agent-b").await);
        }
    }

    #[tokio::test]
    async fn exhausting_per_agent_quota_rejects_further_calls() {
        let registry = RateLimitRegistry::new();
        let mut admitted = 0;
        for _ in 0..(PER_AGENT_REQUESTS_PER_MINUTE + 5) {
            if registry.check("agent-busy").await {
                admitted += 1;
            }
        }
        assert_eq!(admitted, PER_AGENT_REQUESTS_PER_MINUTE as usize);
    }
}
