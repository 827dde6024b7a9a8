//! Turns a [`QueryRequest`] into per-stage pipeline parameters.

use super::types::QueryRequest;
use crate::pipeline::PipelineParams;
use serde_json::{Map, Value};

/// Stage names and keys used while adapting requests.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Stage receiving filters and `top_k_retriever`.
    pub retriever_node: String,
    /// Stage receiving `top_k_reader`.
    pub reader_node: String,
    /// Filter key matched against the per-document scoping value.
    pub scoping_filter_key: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            retriever_node: "Retriever".into(),
            reader_node: "Reader".into(),
            scoping_filter_key: "pdf_name".into(),
        }
    }
}

/// Build the parameter mapping for `request`.
///
/// Caller `params` are the starting point. Request-level `filters` and top-k values only fill
/// gaps the caller left open. The scoping filter is merged into the retriever filters and wins
/// over a caller filter on the same key.
pub fn build_params(request: &QueryRequest, settings: &AdapterSettings) -> PipelineParams {
    let mut params = request.params.clone().unwrap_or_default();

    if let Some(filters) = request.filters.as_ref() {
        let stage = stage_entry(&mut params, &settings.retriever_node);
        if !stage.contains_key("filters") {
            stage.insert("filters".into(), Value::Object(filters.clone()));
        }
    }

    if let Some(scope) = request.pdf_name.as_deref() {
        let stage = stage_entry(&mut params, &settings.retriever_node);
        let filters = stage
            .entry("filters")
            .or_insert_with(|| Value::Object(Map::new()));
        if !filters.is_object() {
            *filters = Value::Object(Map::new());
        }
        if let Value::Object(filters) = filters {
            filters.insert(
                settings.scoping_filter_key.clone(),
                Value::String(scope.to_string()),
            );
        }
    }

    if let Some(top_k) = request.top_k_retriever {
        stage_entry(&mut params, &settings.retriever_node)
            .entry("top_k")
            .or_insert(Value::from(top_k));
    }

    if let Some(top_k) = request.top_k_reader {
        stage_entry(&mut params, &settings.reader_node)
            .entry("top_k")
            .or_insert(Value::from(top_k));
    }

    params
}

/// Get the option object for `stage`, creating it (or replacing a non-object) when needed.
fn stage_entry<'a>(params: &'a mut PipelineParams, stage: &str) -> &'a mut Map<String, Value> {
    let entry = params
        .entry(stage.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("stage entry was just normalized to an object"),
    }
}
