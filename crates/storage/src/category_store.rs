use std::str::FromStr;

use async_trait::async_trait;
use centim_categorize::{
    CategoryStore, MerchantMapping, SimilarityCache, StoreError, TransactionPattern,
};
use centim_core::Category;

use crate::db::DbPool;

/// SQLite-backed [`CategoryStore`]. Every save replaces the full collection
/// inside one database transaction, honoring the read-modify-write
/// contract; there is still no transactional guarantee across the three
/// collections.
pub struct SqliteCategoryStore {
    pool: DbPool,
}

impl SqliteCategoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

type MappingRow = (String, String, f64, i64, String);
type PatternRow = (String, String, f64, i64);

#[async_trait]
impl CategoryStore for SqliteCategoryStore {
    async fn load_merchant_mappings(&self) -> Result<Vec<MerchantMapping>, StoreError> {
        let rows = sqlx::query_as::<_, MappingRow>(
            "SELECT merchant, category, confidence, is_manual, aliases FROM merchant_mappings ORDER BY merchant",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|(merchant, category, confidence, is_manual, aliases)| {
                Ok(MerchantMapping {
                    merchant,
                    category: Category::from_str(&category).map_err(StoreError::Backend)?,
                    confidence: confidence as f32,
                    is_manual: is_manual != 0,
                    aliases: serde_json::from_str(&aliases).map_err(StoreError::backend)?,
                })
            })
            .collect()
    }

    async fn save_merchant_mappings(&self, mappings: &[MerchantMapping]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        sqlx::query("DELETE FROM merchant_mappings")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        for mapping in mappings {
            let aliases = serde_json::to_string(&mapping.aliases).map_err(StoreError::backend)?;
            sqlx::query(
                "INSERT INTO merchant_mappings (merchant, category, confidence, is_manual, aliases) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&mapping.merchant)
            .bind(mapping.category.as_str())
            .bind(f64::from(mapping.confidence))
            .bind(i64::from(mapping.is_manual))
            .bind(aliases)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        tx.commit().await.map_err(StoreError::backend)
    }

    async fn load_patterns(&self) -> Result<Vec<TransactionPattern>, StoreError> {
        let rows = sqlx::query_as::<_, PatternRow>(
            "SELECT pattern, category, confidence, is_regex FROM transaction_patterns ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|(pattern, category, confidence, is_regex)| {
                Ok(TransactionPattern {
                    pattern,
                    category: Category::from_str(&category).map_err(StoreError::Backend)?,
                    confidence: confidence as f32,
                    is_regex: is_regex != 0,
                })
            })
            .collect()
    }

    async fn save_patterns(&self, patterns: &[TransactionPattern]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        sqlx::query("DELETE FROM transaction_patterns")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        // AUTOINCREMENT keeps issuing fresh positions after the delete, so
        // insertion order, which is the evaluation order, survives the rewrite.
        for pattern in patterns {
            sqlx::query(
                "INSERT INTO transaction_patterns (pattern, category, confidence, is_regex) VALUES (?, ?, ?, ?)",
            )
            .bind(&pattern.pattern)
            .bind(pattern.category.as_str())
            .bind(f64::from(pattern.confidence))
            .bind(i64::from(pattern.is_regex))
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        tx.commit().await.map_err(StoreError::backend)
    }

    async fn load_similarity_cache(&self) -> Result<SimilarityCache, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT merchant, neighbors FROM similarity_cache",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|(merchant, neighbors)| {
                let neighbors: Vec<(String, f32)> =
                    serde_json::from_str(&neighbors).map_err(StoreError::backend)?;
                Ok((merchant, neighbors))
            })
            .collect()
    }

    async fn save_similarity_cache(&self, cache: &SimilarityCache) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        sqlx::query("DELETE FROM similarity_cache")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        for (merchant, neighbors) in cache {
            let neighbors = serde_json::to_string(neighbors).map_err(StoreError::backend)?;
            sqlx::query("INSERT INTO similarity_cache (merchant, neighbors) VALUES (?, ?)")
                .bind(merchant)
                .bind(neighbors)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
        }

        tx.commit().await.map_err(StoreError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;

    async fn test_store() -> (tempfile::TempDir, SqliteCategoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("centim.db")).await.unwrap();
        (dir, SqliteCategoryStore::new(pool))
    }

    #[tokio::test]
    async fn merchant_mappings_round_trip() {
        let (_dir, store) = test_store().await;

        let mappings = vec![
            MerchantMapping::manual("CASA AMETLLER", Category::Food)
                .with_aliases(vec!["AMETLLER ORIGEN".to_string()]),
            MerchantMapping::new("NETFLIX", Category::Entertainment, 0.7),
        ];
        store.save_merchant_mappings(&mappings).await.unwrap();

        let loaded = store.load_merchant_mappings().await.unwrap();
        assert_eq!(loaded.len(), 2);

        let casa = loaded.iter().find(|m| m.merchant == "CASA AMETLLER").unwrap();
        assert!(casa.is_manual);
        assert_eq!(casa.aliases, ["AMETLLER ORIGEN"]);
        assert_eq!(casa.category, Category::Food);

        let netflix = loaded.iter().find(|m| m.merchant == "NETFLIX").unwrap();
        assert!(!netflix.is_manual);
        assert!((netflix.confidence - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn saves_replace_the_previous_collection() {
        let (_dir, store) = test_store().await;

        store
            .save_merchant_mappings(&[
                MerchantMapping::new("A", Category::Food, 0.5),
                MerchantMapping::new("B", Category::Shopping, 0.6),
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
    async fn patterns_keep_insertion_order_across_rewrites() {
        let (_dir, store) = test_store().await;

        let pattern = |p: &str, c| TransactionPattern {
            pattern: p.to_string(),
            category: c,
            confidence: 0.8,
            is_regex: false,
        };

        store
            .save_patterns(&[
                pattern("energia", Category::Utilities),
                pattern("amazon", Category::Shopping),
            ])
            .await
            .unwrap();

        // Read-modify-write appending a third pattern.
        let mut patterns = store.load_patterns().await.unwrap();
        patterns.push(pattern("netflix", Category::Entertainment));
        store.save_patterns(&patterns).await.unwrap();

        let loaded = store.load_patterns().await.unwrap();
        let order: Vec<&str> = loaded.iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(order, ["energia", "amazon", "netflix"]);
    }

    #[tokio::test]
    async fn similarity_cache_round_trips() {
        let (_dir, store) = test_store().await;

        let mut cache = SimilarityCache::new();
        cache.insert(
            "Starbuks".to_string(),
            vec![("Starbucks".to_string(), 0.888)],
        );
        store.save_similarity_cache(&cache).await.unwrap();

        let loaded = store.load_similarity_cache().await.unwrap();
        let entry = loaded.get("Starbuks").unwrap();
        assert_eq!(entry[0].0, "Starbucks");
        assert!((entry[0].1 - 0.888).abs() < 1e-6);
    }
}
