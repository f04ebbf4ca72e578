use std::path::{Path, PathBuf};

use centim_ai::InferenceClient;
use centim_categorize::{CategoryStore, TransactionCategorizer};
use centim_import::TransactionParser;
use centim_storage::{insert_transactions, DbPool};
use tracing::{info, warn};

/// What happened to one upload batch, for the final report.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub parsed: usize,
    pub categorized: usize,
    pub persisted: u64,
    pub failures: Vec<(String, String)>,
}

/// Orchestrates one upload batch: read files → parse → categorize →
/// persist. Failures of individual files are reported, not fatal.
pub struct IngestPipeline<S: CategoryStore, L: InferenceClient> {
    parser: TransactionParser<L>,
    categorizer: TransactionCategorizer<S, L>,
    pool: DbPool,
}

impl<S: CategoryStore, L: InferenceClient + Clone> IngestPipeline<S, L> {
    pub fn new(pool: DbPool, store: S, inference: L) -> Self {
        Self {
            parser: TransactionParser::new(inference.clone()),
            categorizer: TransactionCategorizer::new(store, inference),
            pool,
        }
    }
}

impl<S: CategoryStore, L: InferenceClient> IngestPipeline<S, L> {
    pub async fn ingest_files(&mut self, paths: &[PathBuf]) -> anyhow::Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let mut files = Vec::new();

        for path in paths {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => files.push((display_name(path), text)),
                Err(error) => {
                    warn!(file = %path.display(), %error, "unreadable file");
                    summary.failures.push((display_name(path), error.to_string()));
                }
            }
        }

        let outcome = self.parser.parse_files(&files).await;
        summary.parsed = outcome.transactions.len();
        summary
            .failures
            .extend(outcome.failures.into_iter().map(|f| (f.file, f.error.to_string())));

        let transactions = self.categorizer.bulk_categorize(outcome.transactions).await?;
        summary.categorized = transactions
            .iter()
            .filter(|tx| tx.categorization.is_some())
            .count();

        summary.persisted = insert_transactions(&self.pool, &transactions).await?;
        info!(
            parsed = summary.parsed,
            categorized = summary.categorized,
            persisted = summary.persisted,
            failures = summary.failures.len(),
            "ingest complete"
        );

        Ok(summary)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
