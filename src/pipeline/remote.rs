//! HTTP client for a pipeline runner exposing `POST /run`.

use super::{IndexingPipeline, PipelineError, PipelineParams, QueryPipeline};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use std::path::PathBuf;

/// Pipeline reached over HTTP.
///
/// The same client serves either role: query pipelines receive `{query, params, debug}`,
/// indexing pipelines receive `{file_paths, meta, params}`. A 2xx JSON object is the result
/// mapping.
pub struct RemotePipeline {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) version: String,
    pub(crate) converter_nodes: Vec<String>,
    pub(crate) preprocessor_nodes: Vec<String>,
}

impl RemotePipeline {
    /// Build a client for the runner at `base_url`.
    pub fn new(base_url: &str, version: impl Into<String>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(concat!("docquery/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(PipelineError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized pipeline HTTP client");

        Ok(Self {
            client,
            base_url,
            version: version.into(),
            converter_nodes: Vec::new(),
            preprocessor_nodes: Vec::new(),
        })
    }

    /// Declare the indexing stage names that receive form parameters on upload.
    pub fn with_indexing_nodes(
        mut self,
        converter_nodes: Vec<String>,
        preprocessor_nodes: Vec<String>,
    ) -> Self {
        self.converter_nodes = converter_nodes;
        self.preprocessor_nodes = preprocessor_nodes;
        self
    }

    async fn post_run(&self, body: Value) -> Result<reqwest::Response, PipelineError> {
        let url = format_endpoint(&self.base_url, "run");
        let response = self
            .client
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = PipelineError::UnexpectedStatus { status, body };
            tracing::error!(url = %self.base_url, error = %error, "Pipeline run failed");
            Err(error)
        }
    }
}

#[async_trait]
impl QueryPipeline for RemotePipeline {
    async fn run(
        &self,
        query: &str,
        params: PipelineParams,
        debug: Option<bool>,
    ) -> Result<Map<String, Value>, PipelineError> {
        let body = json!({
            "query": query,
            "params": params,
            "debug": debug,
        });
        let response = self.post_run(body).await?;
        match response.json::<Value>().await? {
            Value::Object(result) => Ok(result),
            other => Err(PipelineError::MalformedResult(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[async_trait]
impl IndexingPipeline for RemotePipeline {
    async fn run(
        &self,
        file_paths: Vec<PathBuf>,
        metas: Vec<Map<String, Value>>,
        params: PipelineParams,
    ) -> Result<(), PipelineError> {
        let file_count = file_paths.len();
        let file_paths: Vec<String> = file_paths
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let body = json!({
            "file_paths": file_paths,
            "meta": metas,
            "params": params,
        });
        self.post_run(body).await?;
        tracing::debug!(files = file_count, "Indexing pipeline run completed");
        Ok(())
    }

    fn converter_nodes(&self) -> &[String] {
        &self.converter_nodes
    }

    fn preprocessor_nodes(&self) -> &[String] {
        &self.preprocessor_nodes
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
