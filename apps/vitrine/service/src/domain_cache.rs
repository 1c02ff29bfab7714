use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::Config;
use crate::domain_store::VerifiedDomainMatch;

#[derive(Debug)]
pub struct DomainResolutionCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    generation: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    resolved: VerifiedDomainMatch,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

impl DomainResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_secs(config.custom_domain_cache_ttl_seconds))
    }

    pub async fn get(&self, hostname: &str) -> Option<VerifiedDomainMatch> {
        let key = cache_key(hostname);
        {
            let state = self.state.read().await;
            match state.entries.get(&key) {
                None => return None,
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.resolved.clone());
                }
                Some(_) => {}
            }
        }

        let mut state = self.state.write().await;
        let expired = state
            .entries
            .get(&key)
            .is_some_and(|entry| entry.inserted_at.elapsed() >= self.ttl);
        if expired {
            state.entries.remove(&key);
            return None;
        }
        state.entries.get(&key).map(|entry| entry.resolved.clone())
    }

    pub async fn put(&self, hostname: &str, resolved: VerifiedDomainMatch) {
        let mut state = self.state.write().await;
        state.entries.insert(
            cache_key(hostname),
            CacheEntry {
                resolved,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn ticket(&self) -> FillTicket {
        FillTicket(self.state.read().await.generation)
    }

    pub async fn fill(
        &self,
        hostname: &str,
        resolved: VerifiedDomainMatch,
        ticket: FillTicket,
    ) -> bool {
        let mut state = self.state.write().await;
        // An invalidation since `ticket` means the lookup may predate the change.
        if state.generation != ticket.0 {
            return false;
        }
        state.entries.insert(
            cache_key(hostname),
            CacheEntry {
                resolved,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    pub async fn invalidate(&self, hostname: &str) {
        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        state.entries.remove(&cache_key(hostname));
    }

    pub async fn invalidate_all(&self) {
        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        state.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn cache_key(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_lowercase()
}
