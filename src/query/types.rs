//! Request and response shapes for the query endpoints, plus the query error type.

use crate::{limiter::LimiterError, pipeline::PipelineError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors emitted while answering a query or a batch of queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No concurrency slot could be obtained.
    #[error(transparent)]
    Limiter(#[from] LimiterError),
    /// The query pipeline failed; the error is propagated untouched.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The pipeline result could not be read as a query response.
    #[error("Failed to decode pipeline result: {0}")]
    Decode(#[from] serde_json::Error),
    /// No preset query is available for the requested operation.
    #[error("No preset queries configured for {0}")]
    NoPresets(&'static str),
}

/// A single question submitted to the query pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Free-text question.
    pub query: String,
    /// Per-stage parameter overrides, keyed by stage name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    /// Ask the pipeline for its debug payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    /// Restrict retrieval to documents indexed from this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_name: Option<String>,
    /// Retrieval filters used when the retriever stage carries none of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
    /// `top_k` for the retrieval stage when not set in `params`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k_retriever: Option<u32>,
    /// `top_k` for the reading stage when not set in `params`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k_reader: Option<u32>,
}

impl QueryRequest {
    /// Build the request used for a preset question: a single retrieved document, a single answer.
    pub fn preset(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k_retriever: Some(1),
            top_k_reader: Some(1),
            ..Self::default()
        }
    }
}

/// Ordered list of questions answered one after the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedQueryRequest {
    /// Questions to answer, in order.
    pub queries: Vec<QueryRequest>,
}

/// Character span inside a document or an answer context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset.
    pub start: i64,
    /// Exclusive end offset.
    pub end: i64,
}

/// Candidate answer extracted by the reader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Answer {
    /// Extracted answer text.
    #[serde(default)]
    pub answer: String,
    /// Answer kind reported by the pipeline (`extractive`, `generative`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub answer_type: Option<String>,
    /// Reader confidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Surrounding text the answer was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Answer location inside the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets_in_document: Option<Vec<Span>>,
    /// Answer location inside `context`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets_in_context: Option<Vec<Span>>,
    /// Identifiers of the documents the answer came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    /// Free-form metadata.
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Map<String, Value>,
}

/// Retrieved unit of indexed content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Document-store identifier.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Text (or serialized table) content.
    #[serde(default)]
    pub content: Value,
    /// Content kind (`text`, `table`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Free-form metadata, including the scoping key set at upload time.
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Map<String, Value>,
    /// Retrieval score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Sanitized pipeline output returned to callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The question that was answered.
    pub query: String,
    /// Non-empty answers, in pipeline order.
    #[serde(default)]
    pub answers: Vec<Answer>,
    /// Retrieved documents, in pipeline order.
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Pipeline debug payload, when requested.
    #[serde(default, rename = "_debug", skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

/// Pipelines emit `null` for empty metadata; treat it like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
