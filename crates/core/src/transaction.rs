use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::category::{CategorizationMethod, Category};
use super::money::Money;

/// A normalized statement row as produced by the parser, before any
/// categorization has happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub merchant: String,
    pub amount: Money,
    pub balance: Option<Money>,
    pub transaction_date: NaiveDate,
    pub effective_date: Option<NaiveDate>,
}

/// A resolved category together with its confidence and provenance.
/// Carrying all three in one value means a transaction is either fully
/// categorized or not at all; there is no partially-set state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    pub category: Category,
    pub confidence: f32,
    pub method: CategorizationMethod,
}

impl Categorization {
    pub fn new(category: Category, confidence: f32, method: CategorizationMethod) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            method,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub merchant: String,
    pub amount: Money,
    pub balance: Option<Money>,
    pub transaction_date: NaiveDate,
    pub effective_date: Option<NaiveDate>,
    pub categorization: Option<Categorization>,
}

impl From<RawTransaction> for Transaction {
    fn from(raw: RawTransaction) -> Self {
        Transaction {
            merchant: raw.merchant,
            amount: raw.amount,
            balance: raw.balance,
            transaction_date: raw.transaction_date,
            effective_date: raw.effective_date,
            categorization: None,
        }
    }
}

impl Transaction {
    /// Apply a categorization, consuming the uncategorized value.
    pub fn categorize(self, categorization: Categorization) -> Transaction {
        Transaction {
            categorization: Some(categorization),
            ..self
        }
    }

    pub fn category(&self) -> Option<Category> {
        self.categorization.map(|c| c.category)
    }

    pub fn confidence(&self) -> Option<f32> {
        self.categorization.map(|c| c.confidence)
    }

    pub fn method(&self) -> Option<CategorizationMethod> {
        self.categorization.map(|c| c.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(merchant: &str, cents: i64) -> RawTransaction {
        RawTransaction {
            merchant: merchant.to_string(),
            amount: Money::from_cents(cents),
            balance: None,
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            effective_date: None,
        }
    }

    #[test]
    fn from_raw_is_uncategorized() {
        let tx: Transaction = raw("STARBUCKS", -550).into();
        assert!(tx.categorization.is_none());
        assert_eq!(tx.category(), None);
        assert_eq!(tx.method(), None);
    }

    #[test]
    fn categorize_sets_all_three_fields_together() {
        let tx: Transaction = raw("STARBUCKS", -550).into();
        let tx = tx.categorize(Categorization::new(
            Category::Food,
            0.9,
            CategorizationMethod::Stored,
        ));
        assert_eq!(tx.category(), Some(Category::Food));
        assert_eq!(tx.confidence(), Some(0.9));
        assert_eq!(tx.method(), Some(CategorizationMethod::Stored));
    }

    #[test]
    fn categorization_clamps_confidence() {
        let c = Categorization::new(Category::Other, 1.7, CategorizationMethod::AiBatch);
        assert_eq!(c.confidence, 1.0);
        let c = Categorization::new(Category::Other, -0.2, CategorizationMethod::AiBatchError);
        assert_eq!(c.confidence, 0.0);
    }
}
