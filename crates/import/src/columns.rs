use std::collections::HashMap;

use crate::errors::ImportError;

/// Canonical semantic fields a statement column can translate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Amount,
    Description,
    TransactionDate,
    EffectiveDate,
    Balance,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Amount => "AMOUNT",
            Column::Description => "DESCRIPTION",
            Column::TransactionDate => "TRANSACTION DATE",
            Column::EffectiveDate => "EFFECTIVE DATE",
            Column::Balance => "BALANCE",
        }
    }
}

/// Standardized header synonyms across the bank export locales we ingest
/// (English, Spanish, Catalan, French, German, Greek). Headers not in this
/// table are dropped silently.
const SYNONYMS: &[(&str, Column)] = &[
    ("EFFECTIVE DATE", Column::EffectiveDate),
    ("DATA COMPTABLE", Column::EffectiveDate),
    ("FECHA CONTABLE", Column::EffectiveDate),
    ("DATE COMPTABLE", Column::EffectiveDate),
    ("BUCHUNGSDATUM", Column::EffectiveDate),
    ("ΗΜΕΡΟΜΗΝΙΑ ΛΟΓΙΣΤΙΚΗΣ", Column::EffectiveDate),
    ("TRANSACTION DATE", Column::TransactionDate),
    ("FECHA VALOR", Column::TransactionDate),
    ("DATA VALOR", Column::TransactionDate),
    ("DATE VALEUR", Column::TransactionDate),
    ("WERTSTELLUNG", Column::TransactionDate),
    ("ΗΜΕΡΟΜΗΝΙΑ ΑΞΙΑΣ", Column::TransactionDate),
    ("DATA OPERACIÓ", Column::TransactionDate),
    ("DATA TRANSACCIÓ", Column::TransactionDate),
    ("FECHA OPERACIÓN", Column::TransactionDate),
    ("FECHA TRANSACCIÓN", Column::TransactionDate),
    ("DATE OPÉRATION", Column::TransactionDate),
    ("DATE DE TRANSACTION", Column::TransactionDate),
    ("TRANSAKTIONSDATUM", Column::TransactionDate),
    ("ΗΜΕΡΟΜΗΝΙΑ ΣΥΝΑΛΛΑΓΗΣ", Column::TransactionDate),
    ("ΗΜΕΡΟΜΗΝΙΑ ΠΡΑΞΗΣ", Column::TransactionDate),
    ("DESCRIPCION", Column::Description),
    ("DESCRIPCIÓ", Column::Description),
    ("DESCRIPCIO", Column::Description),
    ("CONCEPTE", Column::Description),
    ("CONCEPTO", Column::Description),
    ("LIBELLÉ", Column::Description),
    ("DESCRIPTION", Column::Description),
    ("BESCHREIBUNG", Column::Description),
    ("VERWENDUNGSZWECK", Column::Description),
    ("BUCHUNGSTEXT", Column::Description),
    ("ΠΕΡΙΓΡΑΦΗ", Column::Description),
    ("ΑΙΤΙΟΛΟΓΙΑ", Column::Description),
    ("AMOUNT", Column::Amount),
    ("IMPORT", Column::Amount),
    ("IMPORTE", Column::Amount),
    ("MONTANT", Column::Amount),
    ("BETRAG", Column::Amount),
    ("ΠΟΣΟ", Column::Amount),
    ("QUANTITAT", Column::Amount),
    ("CANTIDAD", Column::Amount),
    ("SOMME", Column::Amount),
    ("SUMME", Column::Amount),
    ("ΠΟΣΟΝ", Column::Amount),
    ("BALANCE", Column::Balance),
    ("SALDO", Column::Balance),
    ("SOLDE", Column::Balance),
    ("KONTOSTAND", Column::Balance),
    ("ΥΠΟΛΟΙΠΟ", Column::Balance),
    ("SALDO DISPONIBLE", Column::Balance),
    ("SOLDE DISPONIBLE", Column::Balance),
    ("VERFÜGBARER BETRAG", Column::Balance),
    ("ΔΙΑΘΕΣΙΜΟ ΥΠΟΛΟΙΠΟ", Column::Balance),
];

/// Uppercase and collapse `-`/`_` to spaces so `transaction_date`,
/// `Transaction-Date` and `TRANSACTION DATE` all read the same.
pub fn standardize_header(header: &str) -> String {
    header.to_uppercase().replace(['-', '_'], " ")
}

/// Translate raw header tokens into canonical fields, keyed by the
/// standardized header name they were found under. Later duplicates win,
/// matching first-position lookups done against the header index.
pub fn translate_headers(headers: &[String]) -> HashMap<Column, String> {
    let mut translated = HashMap::new();

    for header in headers {
        let standard = standardize_header(header);
        if let Some((_, column)) = SYNONYMS.iter().find(|(name, _)| *name == standard) {
            translated.insert(*column, standard);
        }
    }

    translated
}

/// How a statement's columns map onto the canonical fields. The field
/// values are standardized header names, resolved to positions against
/// each file's header row.
#[derive(Debug, Clone)]
pub struct CsvMapping {
    pub delimiter: char,
    pub merchant: String,
    pub amount: String,
    pub transaction_date: String,
    pub balance: Option<String>,
    pub effective_date: Option<String>,
}

impl CsvMapping {
    /// Build a mapping from translated headers. Amount and description are
    /// required; a missing transaction date falls back to the effective
    /// date, and only when neither exists does construction fail.
    pub fn build(
        translated: &HashMap<Column, String>,
        delimiter: char,
    ) -> Result<CsvMapping, ImportError> {
        let amount = translated
            .get(&Column::Amount)
            .ok_or(ImportError::MissingColumn(Column::Amount.as_str()))?;
        let merchant = translated
            .get(&Column::Description)
            .ok_or(ImportError::MissingColumn(Column::Description.as_str()))?;

        let effective_date = translated.get(&Column::EffectiveDate);
        let transaction_date = translated
            .get(&Column::TransactionDate)
            .or(effective_date)
            .ok_or(ImportError::MissingColumn(Column::TransactionDate.as_str()))?;

        Ok(CsvMapping {
            delimiter,
            merchant: merchant.clone(),
            amount: amount.clone(),
            transaction_date: transaction_date.clone(),
            balance: translated.get(&Column::Balance).cloned(),
            effective_date: effective_date.cloned(),
        })
    }
}

/// Cache of mappings keyed by header signature. Statements re-exported from
/// the same bank carry identical header rows, so a signature hit skips both
/// translation and the upstream AI header-extraction call.
#[derive(Debug, Default)]
pub struct MappingCache {
    mappings: HashMap<String, CsvMapping>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical signature of a raw header row: lowercased, pipe-joined.
    pub fn signature(headers: &[String]) -> String {
        headers.join("|").to_lowercase()
    }

    pub fn get(&self, headers: &[String]) -> Option<&CsvMapping> {
        self.mappings.get(&Self::signature(headers))
    }

    pub fn insert(&mut self, headers: &[String], mapping: CsvMapping) {
        self.mappings.insert(Self::signature(headers), mapping);
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
