use centim_ai::InferenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// The AI determined the uploaded content is not a CSV table.
    #[error("AI determined the content is not a CSV file")]
    NotCsv,
    #[error("CSV file must have at least 2 lines")]
    TooFewLines,
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("Failed to parse AI response to valid CSV headers: {0}")]
    BadAiResponse(String),
    #[error("AI responded with unknown error: {0}")]
    UnknownAiError(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Row is missing a value for {0}")]
    MissingField(&'static str),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
