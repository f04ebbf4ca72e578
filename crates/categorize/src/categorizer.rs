use std::collections::{HashMap, HashSet};

use centim_ai::{ChatMessage, InferenceClient};
use centim_core::{Categorization, CategorizationMethod, Category, Transaction};
use regex::{Regex, RegexBuilder};
use tracing::{info, warn};

use crate::fuzzy::{calculate_similarity, find_similar_merchants, DEFAULT_MIN_SIMILARITY};
use crate::store::{
    CategoryStore, MerchantMapping, SimilarityCache, StoreError, TransactionPattern,
};

/// Confidence assigned to an AI answer that used the allowed vocabulary.
const AI_BATCH_CONFIDENCE: f32 = 0.7;
/// Confidence of the degraded fallback when the AI answer is missing,
/// out-of-vocabulary, or the call failed outright.
const AI_FALLBACK_CONFIDENCE: f32 = 0.1;

/// Outcome of a bulk mapping import, per merchant.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub rejected: Vec<(String, String)>,
}

/// Resolves merchant categories through four tiers: stored mapping →
/// pattern → fuzzy match → batched AI fallback. Newly learned categories
/// are written back through the store so later batches resolve locally.
pub struct TransactionCategorizer<S: CategoryStore, L: InferenceClient> {
    store: S,
    inference: L,
}

impl<S: CategoryStore, L: InferenceClient> TransactionCategorizer<S, L> {
    pub fn new(store: S, inference: L) -> Self {
        Self { store, inference }
    }

    /// Resolve one merchant through the local tiers only (no AI). A newly
    /// computed similarity entry is persisted before returning.
    pub async fn find_merchant_category(
        &self,
        merchant: &str,
    ) -> Result<Option<Categorization>, StoreError> {
        let mappings = self.store.load_merchant_mappings().await?;
        let patterns = self.store.load_patterns().await?;
        let mut cache = self.store.load_similarity_cache().await?;
        let compiled = compile_patterns(&patterns);

        let mut cache_dirty = false;
        let result = resolve_local(merchant, &mappings, &compiled, &mut cache, &mut cache_dirty);

        if cache_dirty {
            self.store.save_similarity_cache(&cache).await?;
        }

        Ok(result)
    }

    /// Categorize a whole upload batch. Merchants are deduplicated before
    /// resolution so the AI fallback sees each unknown name exactly once.
    /// Every transaction comes back with either its resolved categorization
    /// applied atomically, or untouched when nothing could be resolved.
    pub async fn bulk_categorize(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut mappings = self.store.load_merchant_mappings().await?;
        let patterns = self.store.load_patterns().await?;
        let mut cache = self.store.load_similarity_cache().await?;
        let compiled = compile_patterns(&patterns);

        let mut seen = HashSet::new();
        let unique: Vec<&str> = transactions
            .iter()
            .map(|tx| tx.merchant.as_str())
            .filter(|merchant| seen.insert(merchant.to_string()))
            .collect();

        let mut resolved: HashMap<String, Categorization> = HashMap::new();
        let mut unmatched: Vec<String> = Vec::new();
        let mut cache_dirty = false;

        for merchant in unique {
            match resolve_local(merchant, &mappings, &compiled, &mut cache, &mut cache_dirty) {
                Some(categorization) => {
                    resolved.insert(merchant.to_string(), categorization);
                }
                None => unmatched.push(merchant.to_string()),
            }
        }

        if !unmatched.is_empty() {
            info!(merchants = unmatched.len(), "batching unresolved merchants to AI");
            let ai_results = self.ai_batch_categorize(&unmatched).await;

            let mut learned = false;
            for (merchant, categorization) in ai_results {
                // A confident answer is learned only when the merchant has
                // no mapping yet; manual mappings are never overwritten.
                if categorization.method == CategorizationMethod::AiBatch
                    && !mappings.iter().any(|m| m.merchant == merchant)
                {
                    mappings.push(MerchantMapping::new(
                        &merchant,
                        categorization.category,
                        categorization.confidence,
                    ));
                    learned = true;
                }
                resolved.insert(merchant, categorization);
            }

            if learned {
                self.store.save_merchant_mappings(&mappings).await?;
            }
        }

        if cache_dirty {
            self.store.save_similarity_cache(&cache).await?;
        }

        Ok(transactions
            .into_iter()
            .map(|tx| match resolved.get(&tx.merchant) {
                Some(categorization) => tx.categorize(*categorization),
                None => tx,
            })
            .collect())
    }

    /// Send unresolved merchants to the model in one batched request. This
    /// tier never fails upward: any transport, timeout, or format problem
    /// degrades the affected merchants to `other` with the fallback
    /// confidence and the error provenance tag.
    pub async fn ai_batch_categorize(
        &self,
        merchants: &[String],
    ) -> HashMap<String, Categorization> {
        let mut results: HashMap<String, Categorization> = merchants
            .iter()
            .map(|merchant| {
                (
                    merchant.clone(),
                    Categorization::new(
                        Category::Other,
                        AI_FALLBACK_CONFIDENCE,
                        CategorizationMethod::AiBatchError,
                    ),
                )
            })
            .collect();

        let messages = [
            ChatMessage::system(batch_prompt()),
            ChatMessage::user(format!(
                "Categorize these transactions merchants: {}",
                merchants.join(", ")
            )),
        ];

        let content = match self.inference.request_inference(&messages).await {
            Ok(response) => match response.first_content() {
                Some(content) => content.trim().to_string(),
                None => {
                    warn!("AI batch categorization returned an empty completion");
                    return results;
                }
            },
            Err(error) => {
                warn!(%error, "AI batch categorization failed");
                return results;
            }
        };

        // Expected shape: [{"Merchant": "category"}, ...]. Anything else
        // leaves the whole batch on the fallback.
        let parsed: Vec<HashMap<String, String>> = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%error, "unparseable AI batch response");
                return results;
            }
        };

        for entry in parsed {
            let Some((merchant, category)) = entry.into_iter().next() else {
                continue;
            };
            // Names we never asked about are ignored.
            let Some(slot) = results.get_mut(&merchant) else {
                continue;
            };
            if let Ok(category) = category.parse::<Category>() {
                *slot = Categorization::new(
                    category,
                    AI_BATCH_CONFIDENCE,
                    CategorizationMethod::AiBatch,
                );
            } else {
                warn!(%merchant, %category, "AI answered outside the vocabulary");
            }
        }

        results
    }

    /// Import a batch of mappings, replacing same-merchant entries in
    /// place. Aliases seed the similarity cache so alternate spellings
    /// resolve through the fuzzy tier.
    pub async fn bulk_import_categories(
        &self,
        incoming: Vec<MerchantMapping>,
    ) -> Result<ImportReport, StoreError> {
        let mut mappings = self.store.load_merchant_mappings().await?;
        let mut cache = self.store.load_similarity_cache().await?;
        let mut cache_dirty = false;
        let mut report = ImportReport::default();

        for mapping in incoming {
            if mapping.merchant.trim().is_empty() {
                report
                    .rejected
                    .push((mapping.merchant, "merchant name is empty".to_string()));
                continue;
            }
            if !(0.0..=1.0).contains(&mapping.confidence) {
                report.rejected.push((
                    mapping.merchant,
                    format!("confidence {} out of range", mapping.confidence),
                ));
                continue;
            }

            for alias in &mapping.aliases {
                let score = calculate_similarity(&mapping.merchant, alias);
                cache.insert(alias.clone(), vec![(mapping.merchant.clone(), score)]);
                cache_dirty = true;
            }

            report.imported.push(mapping.merchant.clone());
            match mappings.iter_mut().find(|m| m.merchant == mapping.merchant) {
                Some(existing) => *existing = mapping,
                None => mappings.push(mapping),
            }
        }

        self.store.save_merchant_mappings(&mappings).await?;
        if cache_dirty {
            self.store.save_similarity_cache(&cache).await?;
        }

        Ok(report)
    }

    /// Manual override: full confidence, protected from learned updates,
    /// and short-circuits every other tier on future lookups.
    pub async fn add_merchant_mapping(
        &self,
        merchant: &str,
        category: Category,
    ) -> Result<(), StoreError> {
        let mut mappings = self.store.load_merchant_mappings().await?;
        let manual = MerchantMapping::manual(merchant, category);

        match mappings.iter_mut().find(|m| m.merchant == merchant) {
            Some(existing) => *existing = manual,
            None => mappings.push(manual),
        }

        self.store.save_merchant_mappings(&mappings).await
    }

    /// Append a pattern; evaluation keeps insertion order.
    pub async fn add_pattern(&self, pattern: TransactionPattern) -> Result<(), StoreError> {
        let mut patterns = self.store.load_patterns().await?;
        patterns.push(pattern);
        self.store.save_patterns(&patterns).await
    }
}

fn batch_prompt() -> String {
    let vocabulary = Category::ALL
        .iter()
        .map(|category| category.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are a financial categorization expert. Respond with a json array \
         of categories matching the input merchants.\n\
         Use only these categories: {vocabulary}\n\
         Format: \"[{{ Merchant1:Category1}}, {{Merchant2:Category2}}, ...]\""
    )
}

/// A pattern with its regex compiled once per batch. An invalid regex is
/// reported and never matches.
struct CompiledPattern<'a> {
    rule: &'a TransactionPattern,
    regex: Option<Regex>,
}

impl CompiledPattern<'_> {
    fn matches(&self, merchant: &str) -> bool {
        if self.rule.is_regex {
            self.regex.as_ref().is_some_and(|re| re.is_match(merchant))
        } else {
            merchant
                .to_lowercase()
                .contains(&self.rule.pattern.to_lowercase())
        }
    }
}

fn compile_patterns(patterns: &[TransactionPattern]) -> Vec<CompiledPattern<'_>> {
    patterns
        .iter()
        .map(|rule| {
            let regex = if rule.is_regex {
                match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
                    Ok(regex) => Some(regex),
                    Err(error) => {
                        warn!(pattern = %rule.pattern, %error, "invalid pattern regex");
                        None
                    }
                }
            } else {
                None
            };
            CompiledPattern { rule, regex }
        })
        .collect()
}

/// Tiers 1–3. A missing similarity entry is computed against every known
/// merchant name and recorded in the cache (the caller persists it).
fn resolve_local(
    merchant: &str,
    mappings: &[MerchantMapping],
    patterns: &[CompiledPattern<'_>],
    cache: &mut SimilarityCache,
    cache_dirty: &mut bool,
) -> Option<Categorization> {
    if let Some(mapping) = mappings.iter().find(|m| m.matches(merchant)) {
        return Some(Categorization::new(
            mapping.category,
            mapping.confidence,
            CategorizationMethod::Stored,
        ));
    }

    if let Some(compiled) = patterns.iter().find(|p| p.matches(merchant)) {
        return Some(Categorization::new(
            compiled.rule.category,
            compiled.rule.confidence,
            CategorizationMethod::Pattern,
        ));
    }

    if !cache.contains_key(merchant) {
        let known: Vec<String> = mappings.iter().map(|m| m.merchant.clone()).collect();
        let similar = find_similar_merchants(merchant, &known, DEFAULT_MIN_SIMILARITY);
        cache.insert(merchant.to_string(), similar);
        *cache_dirty = true;
    }

    let (best, score) = cache.get(merchant)?.first()?;
    let mapping = mappings.iter().find(|m| m.merchant == *best)?;
    Some(Categorization::new(
        mapping.category,
        mapping.confidence * score,
        CategorizationMethod::Fuzzy,
    ))
}
