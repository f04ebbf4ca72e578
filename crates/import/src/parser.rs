use std::collections::HashMap;

use centim_ai::InferenceClient;
use centim_core::{RawTransaction, Transaction};
use tracing::{info, warn};

use crate::columns::{translate_headers, CsvMapping, MappingCache};
use crate::detect::{detect_delimiter, extract_header_line};
use crate::errors::ImportError;
use crate::value::{parse_amount, parse_date};

/// The result of parsing an upload batch. A file that fails structurally
/// (not a CSV, missing required column) is recorded here and the remaining
/// files are still processed.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub transactions: Vec<Transaction>,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug)]
pub struct FileFailure {
    pub file: String,
    pub error: ImportError,
}

/// Converts raw statement text into normalized transactions. Holds the
/// mapping cache, so parsing statements with a previously seen header row
/// needs no AI round-trip.
pub struct TransactionParser<L: InferenceClient> {
    inference: L,
    cache: MappingCache,
}

impl<L: InferenceClient> TransactionParser<L> {
    pub fn new(inference: L) -> Self {
        Self {
            inference,
            cache: MappingCache::new(),
        }
    }

    /// Parse a batch of `(name, contents)` files, preserving input order.
    /// Whole-file failures do not abort the batch.
    pub async fn parse_files(&mut self, files: &[(String, String)]) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        for (name, text) in files {
            match self.parse_file(name, text).await {
                Ok(transactions) => outcome.transactions.extend(transactions),
                Err(error) => {
                    warn!(file = %name, %error, "statement rejected");
                    outcome.failures.push(FileFailure {
                        file: name.clone(),
                        error,
                    });
                }
            }
        }

        outcome
    }

    pub async fn parse_file(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<Vec<Transaction>, ImportError> {
        let lines: Vec<String> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        if lines.len() < 2 {
            return Err(ImportError::TooFewLines);
        }

        let (header_line, headers, mapping) = self.resolve_mapping(&lines).await?;

        // Statements often carry preamble rows (account holder, IBAN,
        // currency) above the header; data rows start after it.
        let start = lines
            .iter()
            .position(|line| line.contains(&header_line))
            .map(|idx| idx + 1)
            .unwrap_or(0);

        let transactions = parse_rows(&lines[start..], &headers, &mapping);
        info!(
            file = %name,
            rows = lines.len().saturating_sub(start),
            parsed = transactions.len(),
            "statement parsed"
        );

        Ok(transactions)
    }

    /// Number of AI header-extraction calls avoided so far is observable
    /// through the cache size vs. files parsed; exposed for diagnostics.
    pub fn cached_mappings(&self) -> usize {
        self.cache.len()
    }

    /// Find the header row and its column mapping, preferring a cached
    /// mapping keyed by header signature over a fresh AI extraction.
    async fn resolve_mapping(
        &mut self,
        lines: &[String],
    ) -> Result<(String, Vec<String>, CsvMapping), ImportError> {
        // A line whose signature is already cached IS the header row of a
        // previously seen format, so no AI call is needed.
        for line in lines {
            let delimiter = detect_delimiter(line);
            let headers = split_header(line, delimiter);
            if let Some(mapping) = self.cache.get(&headers) {
                return Ok((line.clone(), headers, mapping.clone()));
            }
        }

        let header_line = extract_header_line(&self.inference, lines).await?;
        let delimiter = detect_delimiter(&header_line);
        let headers = split_header(&header_line, delimiter);

        let translated = translate_headers(&headers);
        let mapping = CsvMapping::build(&translated, delimiter)?;
        self.cache.insert(&headers, mapping.clone());

        Ok((header_line, headers, mapping))
    }
}

fn split_header(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter).map(|h| h.trim().to_string()).collect()
}

/// Parse the data rows through the csv reader (quoted fields may embed the
/// delimiter). A row that fails to convert is logged and skipped; one bad
/// line never sinks the statement.
fn parse_rows(rows: &[String], headers: &[String], mapping: &CsvMapping) -> Vec<Transaction> {
    let positions: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| (crate::columns::standardize_header(header), idx))
        .collect();

    let data = rows.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(mapping.delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let mut transactions = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                warn!(row = row_idx + 1, %error, "unreadable row skipped");
                continue;
            }
        };

        match convert_row(&record, &positions, mapping) {
            Ok(raw) => transactions.push(raw.into()),
            Err(error) => {
                warn!(row = row_idx + 1, %error, "row skipped");
            }
        }
    }

    transactions
}

/// Look up a mapped column's value in a record; empty fields count as absent.
fn field<'r>(
    record: &'r csv::StringRecord,
    positions: &HashMap<String, usize>,
    name: &str,
) -> Option<&'r str> {
    positions
        .get(name)
        .and_then(|&idx| record.get(idx))
        .filter(|value| !value.is_empty())
}

fn convert_row(
    record: &csv::StringRecord,
    positions: &HashMap<String, usize>,
    mapping: &CsvMapping,
) -> Result<RawTransaction, ImportError> {
    let merchant = field(record, positions, &mapping.merchant)
        .ok_or(ImportError::MissingField("merchant"))?;
    let amount = field(record, positions, &mapping.amount)
        .ok_or(ImportError::MissingField("amount"))
        .and_then(parse_amount)?;
    let transaction_date = field(record, positions, &mapping.transaction_date)
        .ok_or(ImportError::MissingField("transaction date"))
        .and_then(parse_date)?;

    // A balance that fails to parse degrades to "no balance" instead of
    // dropping the whole row; an unparseable effective date does drop it,
    // since a wrong date corrupts ordering downstream.
    let balance = mapping
        .balance
        .as_deref()
        .and_then(|name| field(record, positions, name))
        .and_then(|value| match parse_amount(value) {
            Ok(money) => Some(money),
            Err(error) => {
                warn!(%error, "unparseable balance ignored");
                None
            }
        });

    let effective_date = mapping
        .effective_date
        .as_deref()
        .and_then(|name| field(record, positions, name))
        .map(parse_date)
        .transpose()?;

    Ok(RawTransaction {
        merchant: merchant.to_string(),
        amount,
        balance,
        transaction_date,
        effective_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use centim_ai::{InferenceError, MockInference};
    use chrono::NaiveDate;

    const CANONICAL_HEADERS: &str =
        r#"{"headers": "Transaction Date,Effective Date,Description,Amount,Balance"}"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn files(specs: &[(&str, &str)]) -> Vec<(String, String)> {
        specs
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn parses_canonical_statement() {
        let mock = MockInference::replying([CANONICAL_HEADERS]);
        let mut parser = TransactionParser::new(mock);

        let csv = "Transaction Date,Effective Date,Description,Amount,Balance\n\
                   2024-01-01,2024-01-02,Coffee,10.00,100.00";
        let transactions = parser.parse_file("test.csv", csv).await.unwrap();

        assert_eq!(transactions.len(), 1);
        let tx = &transactions[0];
        assert_eq!(tx.merchant, "Coffee");
        assert_eq!(tx.amount.to_cents(), 1000);
        assert_eq!(tx.balance.unwrap().to_cents(), 10000);
        assert_eq!(tx.transaction_date, date(2024, 1, 1));
        assert_eq!(tx.effective_date, Some(date(2024, 1, 2)));
        assert!(tx.categorization.is_none());
    }

    #[tokio::test]
    async fn skips_preamble_above_header_row() {
        let mock = MockInference::replying([CANONICAL_HEADERS]);
        let mut parser = TransactionParser::new(mock);

        let csv = "IBAN: ES1901280535460100021246;;;\n\
                   titular: SIMON MOORE / ;;;;\n\
                   ;;;Divisa:;EUR\n\
                   Transaction Date,Effective Date,Description,Amount,Balance\n\
                   2024-01-01,2024-01-02,Coffee,10.00,100.00";
        let transactions = parser.parse_file("test.csv", csv).await.unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].merchant, "Coffee");
    }

    #[tokio::test]
    async fn semicolon_statement_with_comma_decimals() {
        let mock = MockInference::replying(
            [r#"{"headers": "Transaction Date;Effective Date;Description;Amount;Balance"}"#],
        );
        let mut parser = TransactionParser::new(mock);

        let csv = "Transaction Date;Effective Date;Description;Amount;Balance\n\
                   2024-01-01;2024-01-02;Coffee;10,50;100,00";
        let transactions = parser.parse_file("test.csv", csv).await.unwrap();

        assert_eq!(transactions[0].amount.to_cents(), 1050);
        assert_eq!(transactions[0].balance.unwrap().to_cents(), 10000);
    }

    #[tokio::test]
    async fn bad_rows_are_skipped_not_fatal() {
        let mock = MockInference::replying([CANONICAL_HEADERS]);
        let mut parser = TransactionParser::new(mock);

        let csv = "Transaction Date,Effective Date,Description,Amount,Balance\n\
                   2024-01-01,2024-01-02,Coffee,10.00,100.00\n\
                   invalid,line,data";
        let transactions = parser.parse_file("test.csv", csv).await.unwrap();

        assert_eq!(transactions.len(), 1);
    }

    #[tokio::test]
    async fn absurdly_large_amounts_are_skipped_rows() {
        let mock = MockInference::replying([CANONICAL_HEADERS]);
        let mut parser = TransactionParser::new(mock);

        let csv = "Transaction Date,Effective Date,Description,Amount,Balance\n\
                   2024-01-01,2024-01-02,Typo,99999999999999999999.99,100.00\n\
                   2024-01-03,2024-01-04,Coffee,10.00,90.00";
        let transactions = parser.parse_file("test.csv", csv).await.unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].merchant, "Coffee");
    }

    #[tokio::test]
    async fn requires_at_least_two_lines() {
        let mut parser = TransactionParser::new(MockInference::new());
        let result = parser.parse_file("empty.csv", "").await;
        assert!(matches!(result, Err(ImportError::TooFewLines)));
        assert_eq!(
            result.unwrap_err().to_string(),
            "CSV file must have at least 2 lines"
        );
    }

    #[tokio::test]
    async fn missing_amount_column_is_named() {
        let mock = MockInference::replying([r#"{"headers": "Transaction Date;Description;Balance"}"#]);
        let mut parser = TransactionParser::new(mock);

        let csv = "Transaction Date;Description;Balance\n2024-01-01;Coffee;100,00";
        let err = parser.parse_file("test.csv", csv).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required column: AMOUNT");
    }

    #[tokio::test]
    async fn not_csv_rejects_file() {
        let mock = MockInference::replying([r#"{"error": "not_csv"}"#]);
        let mut parser = TransactionParser::new(mock);

        let result = parser.parse_file("letter.txt", "Dear customer,\nyour account").await;
        assert!(matches!(result, Err(ImportError::NotCsv)));
    }

    #[tokio::test]
    async fn effective_date_substitutes_for_transaction_date() {
        let mock = MockInference::replying([r#"{"headers": "Effective Date;Description;Amount"}"#]);
        let mut parser = TransactionParser::new(mock);

        let csv = "Effective Date;Description;Amount\n02/01/2024;Coffee;10,00";
        let transactions = parser.parse_file("test.csv", csv).await.unwrap();

        assert_eq!(transactions[0].transaction_date, date(2024, 1, 2));
        assert_eq!(transactions[0].effective_date, Some(date(2024, 1, 2)));
    }

    #[tokio::test]
    async fn identical_headers_hit_the_mapping_cache() {
        // Only one scripted response: a second AI call would fail the test.
        let mock = MockInference::replying([CANONICAL_HEADERS]);
        let mut parser = TransactionParser::new(mock);

        let csv = "Transaction Date,Effective Date,Description,Amount,Balance\n\
                   2024-01-01,2024-01-02,Coffee,10.00,100.00";
        let outcome = parser
            .parse_files(&files(&[("a.csv", csv), ("b.csv", csv)]))
            .await;

        assert_eq!(outcome.transactions.len(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(parser.cached_mappings(), 1);
    }

    #[tokio::test]
    async fn multi_file_batch_continues_past_a_failing_file() {
        let mock = MockInference::new();
        mock.enqueue_error(InferenceError::Timeout);
        mock.enqueue_content(CANONICAL_HEADERS);
        let mut parser = TransactionParser::new(mock);

        let good = "Transaction Date,Effective Date,Description,Amount,Balance\n\
                    2024-01-01,2024-01-02,Coffee,10.00,100.00";
        let outcome = parser
            .parse_files(&files(&[("bad.csv", "x\ny\nz"), ("good.csv", good)]))
            .await;

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].file, "bad.csv");
        assert_eq!(outcome.transactions.len(), 1);
    }

    #[tokio::test]
    async fn multilingual_statement_parses() {
        let mock = MockInference::replying([r#"{"headers": "DATA VALOR;DESCRIPCIO;IMPORT;SALDO"}"#]);
        let mut parser = TransactionParser::new(mock);

        let csv = "DATA VALOR;DESCRIPCIO;IMPORT;SALDO\n02/10/2023;Cafe;-92,19;186.869,50";
        let transactions = parser.parse_file("caixa.csv", csv).await.unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].merchant, "Cafe");
        assert_eq!(transactions[0].amount.to_cents(), -9219);
        assert_eq!(transactions[0].balance.unwrap().to_cents(), 18686950);
        assert_eq!(transactions[0].transaction_date, date(2023, 10, 2));
    }

    #[tokio::test]
    async fn quoted_fields_may_embed_the_delimiter() {
        let mock = MockInference::replying([CANONICAL_HEADERS]);
        let mut parser = TransactionParser::new(mock);

        let csv = "Transaction Date,Effective Date,Description,Amount,Balance\n\
                   2024-01-01,2024-01-02,\"ACME, Inc.\",10.00,100.00";
        let transactions = parser.parse_file("test.csv", csv).await.unwrap();

        assert_eq!(transactions[0].merchant, "ACME, Inc.");
    }
}
