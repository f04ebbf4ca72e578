use centim_ai::{ChatMessage, InferenceClient};
use serde::Deserialize;

use crate::errors::ImportError;

/// Candidate delimiters, in tie-breaking order.
const DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// How many leading non-blank lines are shown to the model when hunting for
/// the header row buried in statement preamble.
const PREVIEW_LINES: usize = 5;

/// Pick the candidate with the highest occurrence count in the line.
/// Earlier candidates win ties.
pub fn detect_delimiter(first_line: &str) -> char {
    let mut best = DELIMITERS[0];
    let mut best_count = first_line.matches(best).count();

    for candidate in DELIMITERS.into_iter().skip(1) {
        let count = first_line.matches(candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }

    best
}

/// The two shapes the model is allowed to answer with. Anything else is a
/// malformed response. `Error` is listed first so an object carrying an
/// `error` key never parses as a headers payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeaderExtraction {
    Error { error: String },
    Headers { headers: String },
}

fn extraction_prompt(preview: &str) -> String {
    format!(
        r#"You are an expert in identifying the table headers from csv files.

Respond with a JSON object with these fields:
{{
    "headers": "the original detected line of CSV headers"
}}

If the input does not contain CSV table headers respond with {{ "error": "not_csv" }}.
Extract the table headers from this csv file:

{preview}"#
    )
}

/// Ask the model for the literal header line hiding in the first few lines
/// of the file. The response content is untrusted text and is validated
/// strictly before use. This is the only place in the pipeline where
/// unstructured model output acts as a control signal.
pub async fn extract_header_line<L: InferenceClient>(
    inference: &L,
    lines: &[String],
) -> Result<String, ImportError> {
    let preview = lines
        .iter()
        .take(PREVIEW_LINES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");

    let messages = [
        ChatMessage::system("You are an experienced CSV expert that identifies CSV headers."),
        ChatMessage::user(extraction_prompt(&preview)),
    ];

    let response = inference.request_inference(&messages).await?;
    let content = response
        .first_content()
        .ok_or_else(|| ImportError::BadAiResponse("empty completion".to_string()))?
        .trim();

    let extraction: HeaderExtraction = serde_json::from_str(content)
        .map_err(|e| ImportError::BadAiResponse(e.to_string()))?;

    match extraction {
        HeaderExtraction::Headers { headers } => Ok(headers),
        HeaderExtraction::Error { error } if error == "not_csv" => Err(ImportError::NotCsv),
        HeaderExtraction::Error { error } => Err(ImportError::UnknownAiError(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use centim_ai::MockInference;

    fn lines(raw: &str) -> Vec<String> {
        raw.lines().map(str::to_string).collect()
    }

    #[test]
    fn detects_comma() {
        assert_eq!(detect_delimiter("a,b,c"), ',');
    }

    #[test]
    fn detects_semicolon() {
        assert_eq!(detect_delimiter("a;b;c"), ';');
    }

    #[test]
    fn detects_tab_and_pipe() {
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
    }

    #[test]
    fn comma_wins_ties() {
        // One of each, so the first candidate takes it.
        assert_eq!(detect_delimiter("a,b;c"), ',');
        assert_eq!(detect_delimiter(""), ',');
    }

    #[test]
    fn majority_wins_over_earlier_candidate() {
        assert_eq!(detect_delimiter("a,b;c;d;e"), ';');
    }

    #[tokio::test]
    async fn extracts_header_line_from_valid_response() {
        let mock = MockInference::replying([r#"{"headers": "Date,Description,Amount"}"#]);
        let header = extract_header_line(&mock, &lines("junk\nDate,Description,Amount\n1,2,3"))
            .await
            .unwrap();
        assert_eq!(header, "Date,Description,Amount");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn not_csv_error_token_is_surfaced() {
        let mock = MockInference::replying([r#"{"error": "not_csv"}"#]);
        let result = extract_header_line(&mock, &lines("just some prose")).await;
        assert!(matches!(result, Err(ImportError::NotCsv)));
    }

    #[tokio::test]
    async fn unknown_error_code_is_rejected() {
        let mock = MockInference::replying([r#"{"error": "overloaded"}"#]);
        let result = extract_header_line(&mock, &lines("x\ny")).await;
        assert!(matches!(result, Err(ImportError::UnknownAiError(code)) if code == "overloaded"));
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let mock = MockInference::replying(["sure! the headers are Date,Amount"]);
        let result = extract_header_line(&mock, &lines("x\ny")).await;
        assert!(matches!(result, Err(ImportError::BadAiResponse(_))));
    }

    #[tokio::test]
    async fn only_first_five_lines_are_sent() {
        let mock = MockInference::replying([r#"{"headers": "a,b"}"#]);
        let raw = "l1\nl2\nl3\nl4\nl5\nl6\nl7";
        extract_header_line(&mock, &lines(raw)).await.unwrap();
        let sent = &mock.received()[0][1].content;
        assert!(sent.contains("l5"));
        assert!(!sent.contains("l6"));
    }
}
