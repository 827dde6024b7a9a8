//! Normalization of raw pipeline results.

use super::types::QueryResponse;
use serde_json::{Map, Value};
use std::time::Duration;

/// Counters describing what [`sanitize_result`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    /// Answers kept.
    pub answers: usize,
    /// Answers dropped for having blank text.
    pub dropped_answers: usize,
    /// Documents kept.
    pub documents: usize,
}

/// Normalize a raw result mapping in place.
///
/// `documents` and `answers` become arrays (missing or `null` turn into `[]`), answers whose text
/// is blank are removed, and `query` is filled in when the pipeline left it out.
pub fn sanitize_result(result: &mut Map<String, Value>, query: &str) -> SanitizeReport {
    ensure_array(result, "documents");
    ensure_array(result, "answers");

    let mut report = SanitizeReport::default();
    if let Some(Value::Array(answers)) = result.get_mut("answers") {
        let before = answers.len();
        answers.retain(has_answer_text);
        report.answers = answers.len();
        report.dropped_answers = before - answers.len();
    }
    if let Some(Value::Array(documents)) = result.get("documents") {
        report.documents = documents.len();
    }

    if !matches!(result.get("query"), Some(Value::String(_))) {
        result.insert("query".into(), Value::String(query.to_string()));
    }

    report
}

/// Sanitize `result` and decode it into a [`QueryResponse`], logging the call duration.
pub fn into_response(
    mut result: Map<String, Value>,
    query: &str,
    elapsed: Duration,
) -> Result<QueryResponse, serde_json::Error> {
    let report = sanitize_result(&mut result, query);
    tracing::info!(
        query,
        answers = report.answers,
        dropped_answers = report.dropped_answers,
        documents = report.documents,
        elapsed_ms = elapsed.as_millis() as u64,
        "Processed query in {:.2} seconds",
        elapsed.as_secs_f64()
    );
    serde_json::from_value(Value::Object(result))
}

fn ensure_array(result: &mut Map<String, Value>, key: &str) {
    match result.get(key) {
        Some(Value::Array(_)) => {}
        Some(Value::Null) | None => {
            result.insert(key.to_string(), Value::Array(Vec::new()));
        }
        Some(other) => {
            tracing::warn!(key, value = %other, "Pipeline result field is not a list; replacing");
            result.insert(key.to_string(), Value::Array(Vec::new()));
        }
    }
}

fn has_answer_text(answer: &Value) -> bool {
    answer
        .get("answer")
        .and_then(Value::as_str)
        .is_some_and(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn missing_lists_become_empty() {
        let mut result = mapping(json!({ "query": "q" }));
        let report = sanitize_result(&mut result, "q");

        assert_eq!(result["documents"], json!([]));
        assert_eq!(result["answers"], json!([]));
        assert_eq!(report, SanitizeReport::default());
    }

    #[test]
    fn null_lists_become_empty() {
        let mut result = mapping(json!({ "answers": null, "documents": null }));
        sanitize_result(&mut result, "q");

        assert_eq!(result["documents"], json!([]));
        assert_eq!(result["answers"], json!([]));
        assert_eq!(result["query"], "q");
    }

    #[test]
    fn blank_answers_are_dropped() {
        let mut result = mapping(json!({
            "query": "What is the name of the company?",
            "answers": [
                { "answer": "", "score": 0.0, "offsets_in_document": [{ "start": 0, "end": 0 }] },
                { "answer": "Acme Corp", "score": 0.91 },
                { "answer": " \n\t " },
                { "score": 0.2 }
            ],
            "documents": [{ "id": "d1", "content": "Acme Corp annual report" }]
        }));

        let report = sanitize_result(&mut result, "ignored");

        assert_eq!(report.answers, 1);
        assert_eq!(report.dropped_answers, 3);
        assert_eq!(report.documents, 1);
        assert_eq!(result["answers"], json!([{ "answer": "Acme Corp", "score": 0.91 }]));
        assert_eq!(result["query"], "What is the name of the company?");
    }

    #[test]
    fn all_answers_filtered_leaves_empty_list() {
        let result = mapping(json!({ "answers": [{ "answer": "  " }], "documents": [] }));
        let response = into_response(result, "q", Duration::from_millis(5)).expect("response");

        assert!(response.answers.is_empty());
        assert!(response.documents.is_empty());
        assert_eq!(response.query, "q");
    }

    #[test]
    fn decodes_typed_response_with_debug_payload() {
        let result = mapping(json!({
            "query": "q",
            "answers": [{
                "answer": "Acme Corp",
                "type": "extractive",
                "score": 0.9,
                "context": "... Acme Corp ...",
                "offsets_in_document": [{ "start": 10, "end": 19 }],
                "offsets_in_context": [{ "start": 4, "end": 13 }],
                "document_ids": ["d1"],
                "meta": { "name": "report.pdf" }
            }],
            "documents": [{ "id": "d1", "content": "text", "content_type": "text", "meta": {}, "score": 0.5 }],
            "_debug": { "Reader": { "exec_time_ms": 12 } }
        }));

        let response = into_response(result, "q", Duration::ZERO).expect("response");
        let answer = &response.answers[0];
        assert_eq!(answer.answer, "Acme Corp");
        assert_eq!(answer.answer_type.as_deref(), Some("extractive"));
        assert_eq!(answer.offsets_in_document.as_ref().map(Vec::len), Some(1));
        assert_eq!(answer.meta["name"], "report.pdf");
        assert_eq!(response.documents[0].id, "d1");
        assert!(response.debug.is_some());
    }
}
