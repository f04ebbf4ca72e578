use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use centim_core::Category;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A learned or user-provided merchant → category association. At most one
/// mapping exists per merchant; re-imports overwrite in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantMapping {
    pub merchant: String,
    pub category: Category,
    pub confidence: f32,
    #[serde(default)]
    pub is_manual: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl MerchantMapping {
    pub fn new(merchant: impl Into<String>, category: Category, confidence: f32) -> Self {
        Self {
            merchant: merchant.into(),
            category,
            confidence,
            is_manual: false,
            aliases: Vec::new(),
        }
    }

    /// A user-curated mapping: full confidence, protected from overwrites
    /// by learned results.
    pub fn manual(merchant: impl Into<String>, category: Category) -> Self {
        Self {
            merchant: merchant.into(),
            category,
            confidence: 1.0,
            is_manual: true,
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Exact-match test used by the stored tier: the canonical name or any
    /// registered alias.
    pub fn matches(&self, merchant: &str) -> bool {
        self.merchant == merchant || self.aliases.iter().any(|alias| alias == merchant)
    }
}

/// A description pattern evaluated in insertion order; the first matching
/// pattern wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPattern {
    pub pattern: String,
    pub category: Category,
    pub confidence: f32,
    #[serde(default)]
    pub is_regex: bool,
}

/// Cached similar-merchant lookups: query → (candidate, score) pairs,
/// descending by score, at most five per query.
pub type SimilarityCache = HashMap<String, Vec<(String, f32)>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(error: impl fmt::Display) -> Self {
        StoreError::Backend(error.to_string())
    }
}

/// Persistence contract for the categorizer's three collections. Each save
/// replaces the whole collection; callers read-modify-write. There is no
/// transactional guarantee across collections.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn load_merchant_mappings(&self) -> Result<Vec<MerchantMapping>, StoreError>;
    async fn save_merchant_mappings(&self, mappings: &[MerchantMapping]) -> Result<(), StoreError>;

    async fn load_patterns(&self) -> Result<Vec<TransactionPattern>, StoreError>;
    async fn save_patterns(&self, patterns: &[TransactionPattern]) -> Result<(), StoreError>;

    async fn load_similarity_cache(&self) -> Result<SimilarityCache, StoreError>;
    async fn save_similarity_cache(&self, cache: &SimilarityCache) -> Result<(), StoreError>;
}

// ── In-memory backend (always available, used for tests) ──────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    mappings: Vec<MerchantMapping>,
    patterns: Vec<TransactionPattern>,
    similarity: SimilarityCache,
}

/// Volatile backend used in tests and one-off runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn load_merchant_mappings(&self) -> Result<Vec<MerchantMapping>, StoreError> {
        Ok(self.state.lock().unwrap().mappings.clone())
    }

    async fn save_merchant_mappings(&self, mappings: &[MerchantMapping]) -> Result<(), StoreError> {
        self.state.lock().unwrap().mappings = mappings.to_vec();
        Ok(())
    }

    async fn load_patterns(&self) -> Result<Vec<TransactionPattern>, StoreError> {
        Ok(self.state.lock().unwrap().patterns.clone())
    }

    async fn save_patterns(&self, patterns: &[TransactionPattern]) -> Result<(), StoreError> {
        self.state.lock().unwrap().patterns = patterns.to_vec();
        Ok(())
    }

    async fn load_similarity_cache(&self) -> Result<SimilarityCache, StoreError> {
        Ok(self.state.lock().unwrap().similarity.clone())
    }

    async fn save_similarity_cache(&self, cache: &SimilarityCache) -> Result<(), StoreError> {
        self.state.lock().unwrap().similarity = cache.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_replace_the_full_collection() {
        let store = MemoryStore::new();
        store
            .save_merchant_mappings(&[
                MerchantMapping::new("A", Category::Food, 0.9),
                MerchantMapping::new("B", Category::Shopping, 0.8),
            ])
            .await
            .unwrap();

        store
            .save_merchant_mappings(&[MerchantMapping::new("C", Category::Transport, 0.7)])
            .await
            .unwrap();

        let loaded = store.load_merchant_mappings().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].merchant, "C");
    }

    #[tokio::test]
    async fn collections_start_empty() {
        let store = MemoryStore::new();
        assert!(store.load_merchant_mappings().await.unwrap().is_empty());
        assert!(store.load_patterns().await.unwrap().is_empty());
        assert!(store.load_similarity_cache().await.unwrap().is_empty());
    }

    #[test]
    fn mapping_matches_name_and_aliases() {
        let mapping = MerchantMapping::manual("CASA AMETLLER", Category::Food)
            .with_aliases(vec!["AMETLLER ORIGEN".to_string()]);
        assert!(mapping.matches("CASA AMETLLER"));
        assert!(mapping.matches("AMETLLER ORIGEN"));
        assert!(!mapping.matches("MERCADONA"));
    }
}
