use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::TapClawResult;

/// Importance given to memory writes that come from a model turn.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// A fact the model asked to remember, as carried in a plan and in requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub key: String,
    pub value: String,
    pub category: String,
    pub importance: f32,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl MemoryRecord {
    pub fn entry(&self) -> MemoryEntry {
        MemoryEntry {
            key: self.key.clone(),
            value: self.value.clone(),
            category: self.category.clone(),
        }
    }
}

/// Persistent key-value memory consumed by the session.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn remember(&self, key: &str, value: &str, category: &str, importance: f32) -> TapClawResult<()>;

    /// Records relevant to `query`, most relevant first.
    async fn recall(&self, query: &str) -> TapClawResult<Vec<MemoryRecord>>;

    /// General-purpose context: most important, then most recent.
    async fn get_context_memories(&self, limit: usize) -> TapClawResult<Vec<MemoryRecord>>;

    async fn forget(&self, key: &str) -> TapClawResult<()>;
}

/// Process-local store; keys are unique, later writes replace earlier ones.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

fn newest_first(a: &MemoryRecord, b: &MemoryRecord) -> std::cmp::Ordering {
    b.updated_at.cmp(&a.updated_at).then_with(|| a.key.cmp(&b.key))
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn remember(&self, key: &str, value: &str, category: &str, importance: f32) -> TapClawResult<()> {
        let record = MemoryRecord {
            key: key.to_string(),
            value: value.to_string(),
            category: category.to_string(),
            importance: importance.clamp(0.0, 1.0),
            updated_at: chrono::Utc::now(),
        };
        tracing::debug!(key = %key, category = %category, "memory stored");
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn recall(&self, query: &str) -> TapClawResult<Vec<MemoryRecord>> {
        let wanted = tokens(query);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.records.read().await;
        let mut scored: Vec<(f32, &MemoryRecord)> = records
            .values()
            .filter_map(|r| {
                let haystack = tokens(&format!("{} {} {}", r.key, r.value, r.category));
                let overlap = wanted.iter().filter(|w| haystack.contains(w)).count();
                (overlap > 0).then(|| (overlap as f32 * (0.5 + r.importance), r))
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| newest_first(a, b))
        });
        Ok(scored.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn get_context_memories(&self, limit: usize) -> TapClawResult<Vec<MemoryRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<&MemoryRecord> = records.values().collect();
        all.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| newest_first(a, b))
        });
        Ok(all.into_iter().take(limit).cloned().collect())
    }

    async fn forget(&self, key: &str) -> TapClawResult<()> {
        self.records.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recall_ranks_by_overlap_and_importance() {
        let store = InMemoryStore::new();
        store.remember("home_wifi", "Home network is called Falcon", "network", 0.2).await.unwrap();
        store.remember("wifi_password", "Falcon network password is on the fridge", "network", 0.9).await.unwrap();
        store.remember("favourite_app", "Uses Maps for commuting", "preference", 0.9).await.unwrap();

        let hits = store.recall("falcon network").await.unwrap();
        let keys: Vec<_> = hits.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["wifi_password", "home_wifi"]);
        assert!(store.recall("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_memories_prefer_importance_and_respect_limit() {
        let store = InMemoryStore::new();
        store.remember("a", "low", "misc", 0.1).await.unwrap();
        store.remember("b", "high", "misc", 0.8).await.unwrap();
        store.remember("c", "mid", "misc", 0.5).await.unwrap();

        let top = store.get_context_memories(2).await.unwrap();
        let keys: Vec<_> = top.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn remember_overwrites_and_forget_removes() {
        let store = InMemoryStore::new();
        store.remember("name", "Alice", "profile", 0.5).await.unwrap();
        store.remember("name", "Alicia", "profile", 2.0).await.unwrap();

        let all = store.get_context_memories(10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "Alicia");
        assert_eq!(all[0].importance, 1.0);

        store.forget("name").await.unwrap();
        assert!(store.get_context_memories(10).await.unwrap().is_empty());
    }
}
