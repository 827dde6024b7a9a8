//! Search service coordinating the limiter, request adaptation, pipeline calls, and sanitizing.

use crate::{
    limiter::ConcurrencyLimiter,
    pipeline::{IndexingPipeline, QueryPipeline},
    query::{
        adapter::{AdapterSettings, build_params},
        presets::PresetQueries,
        sanitize::into_response,
        types::{AdvancedQueryRequest, QueryError, QueryRequest, QueryResponse},
    },
    upload::{UploadError, UploadForm, UploadOutcome, index_upload},
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors emitted by `analyze-pdf`, which uploads and then queries.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Staging or indexing failed.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// The follow-up query failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Abstraction over the search service used by the HTTP surface.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Answer a single question.
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, QueryError>;

    /// Answer a batch of questions in order; `None` runs the preset batch.
    async fn advanced_query(
        &self,
        request: Option<AdvancedQueryRequest>,
    ) -> Result<Vec<QueryResponse>, QueryError>;

    /// Stage uploaded files and run the indexing pipeline over them.
    async fn upload_files(&self, form: UploadForm) -> Result<UploadOutcome, UploadError>;

    /// Upload files, then answer the preset analyze question.
    async fn analyze_files(&self, form: UploadForm) -> Result<QueryResponse, AnalyzeError>;

    /// Whether an indexing pipeline is available for uploads.
    fn indexing_configured(&self) -> bool;

    /// Version string of the pipeline framework.
    fn pipeline_version(&self) -> String;
}

/// Owns the pipeline handles and the shared limiter.
///
/// Construct once at startup and share it through an `Arc`.
pub struct SearchService {
    query_pipeline: Arc<dyn QueryPipeline>,
    indexing_pipeline: Option<Arc<dyn IndexingPipeline>>,
    limiter: ConcurrencyLimiter,
    adapter: AdapterSettings,
    presets: PresetQueries,
    upload_dir: PathBuf,
}

impl SearchService {
    /// Build a service around the given collaborators.
    pub fn new(
        query_pipeline: Arc<dyn QueryPipeline>,
        indexing_pipeline: Option<Arc<dyn IndexingPipeline>>,
        limiter: ConcurrencyLimiter,
        presets: PresetQueries,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            query_pipeline,
            indexing_pipeline,
            limiter,
            adapter: AdapterSettings::default(),
            presets,
            upload_dir: upload_dir.into(),
        }
    }

    /// Override the stage names and scoping key used when adapting requests.
    pub fn with_adapter_settings(mut self, adapter: AdapterSettings) -> Self {
        self.adapter = adapter;
        self
    }

    /// Answer one question under a limiter permit.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse, QueryError> {
        let _permit = self.limiter.acquire().await?;
        self.process_request(&request).await
    }

    /// Answer every question in order under a single permit; the first failure aborts the batch.
    pub async fn advanced_query(
        &self,
        request: Option<AdvancedQueryRequest>,
    ) -> Result<Vec<QueryResponse>, QueryError> {
        let queries = match request {
            Some(request) => request.queries,
            None => {
                tracing::debug!(
                    count = self.presets.advanced_query.len(),
                    "Running preset advanced queries"
                );
                self.presets.advanced_requests()
            }
        };

        let _permit = self.limiter.acquire().await?;
        let mut responses = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            let response = self.process_request(query).await.inspect_err(|error| {
                tracing::error!(index, query = %query.query, error = %error, "Batch query failed");
            })?;
            responses.push(response);
        }
        tracing::info!(queries = responses.len(), "Advanced query completed");
        Ok(responses)
    }

    /// Stage and index uploaded files.
    pub async fn upload_files(&self, form: UploadForm) -> Result<UploadOutcome, UploadError> {
        let indexing = self
            .indexing_pipeline
            .as_ref()
            .ok_or(UploadError::NotConfigured)?;
        index_upload(form, &self.upload_dir, indexing.as_ref()).await
    }

    /// Stage and index uploaded files, then answer the preset analyze question.
    pub async fn analyze_files(&self, form: UploadForm) -> Result<QueryResponse, AnalyzeError> {
        let outcome = self.upload_files(form).await?;
        let request = self
            .presets
            .analyze_request()
            .ok_or(QueryError::NoPresets("analyze-pdf"))?;
        tracing::debug!(files = outcome.file_paths.len(), query = %request.query, "Analyzing upload");

        let _permit = self.limiter.acquire().await.map_err(QueryError::from)?;
        Ok(self.process_request(&request).await?)
    }

    async fn process_request(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let start = Instant::now();
        let params = build_params(request, &self.adapter);
        tracing::debug!(query = %request.query, params = ?params, "Running query pipeline");
        let result = self
            .query_pipeline
            .run(&request.query, params, request.debug)
            .await?;
        Ok(into_response(result, &request.query, start.elapsed())?)
    }
}

#[async_trait]
impl SearchApi for SearchService {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, QueryError> {
        SearchService::query(self, request).await
    }

    async fn advanced_query(
        &self,
        request: Option<AdvancedQueryRequest>,
    ) -> Result<Vec<QueryResponse>, QueryError> {
        SearchService::advanced_query(self, request).await
    }

    async fn upload_files(&self, form: UploadForm) -> Result<UploadOutcome, UploadError> {
        SearchService::upload_files(self, form).await
    }

    async fn analyze_files(&self, form: UploadForm) -> Result<QueryResponse, AnalyzeError> {
        SearchService::analyze_files(self, form).await
    }

    fn indexing_configured(&self) -> bool {
        self.indexing_pipeline.is_some()
    }

    fn pipeline_version(&self) -> String {
        self.query_pipeline.version().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::{LimiterError, LimiterMode};
    use crate::pipeline::{PipelineError, PipelineParams};
    use crate::upload::UploadedFile;
    use serde_json::{Map, Value, json};
    use tokio::sync::Mutex;

    /// Echoes each question back as an answer, failing on questions containing "boom".
    #[derive(Default)]
    struct EchoPipeline {
        calls: Mutex<Vec<(String, PipelineParams)>>,
    }

    #[async_trait]
    impl QueryPipeline for EchoPipeline {
        async fn run(
            &self,
            query: &str,
            params: PipelineParams,
            _debug: Option<bool>,
        ) -> Result<Map<String, Value>, PipelineError> {
            self.calls.lock().await.push((query.to_string(), params));
            if query.contains("boom") {
                return Err(PipelineError::Execution("reader failed".into()));
            }
            let result = json!({
                "query": query,
                "answers": [{ "answer": "" }, { "answer": format!("re: {query}") }]
            });
            Ok(result.as_object().cloned().unwrap_or_default())
        }

        fn version(&self) -> &str {
            "1.0-test"
        }
    }

    #[derive(Default)]
    struct CountingIndexer {
        runs: Mutex<usize>,
        nodes: Vec<String>,
    }

    #[async_trait]
    impl IndexingPipeline for CountingIndexer {
        async fn run(
            &self,
            _file_paths: Vec<PathBuf>,
            _metas: Vec<Map<String, Value>>,
            _params: PipelineParams,
        ) -> Result<(), PipelineError> {
            *self.runs.lock().await += 1;
            Ok(())
        }

        fn converter_nodes(&self) -> &[String] {
            &self.nodes
        }

        fn preprocessor_nodes(&self) -> &[String] {
            &self.nodes
        }
    }

    fn presets() -> PresetQueries {
        PresetQueries::from_json(
            r#"{ "advanced_query": ["Who?", "What?"], "analyze_pdf": ["Which company?"] }"#,
        )
        .expect("presets")
    }

    fn service(
        pipeline: Arc<EchoPipeline>,
        indexer: Option<Arc<CountingIndexer>>,
        limiter: ConcurrencyLimiter,
        dir: &std::path::Path,
    ) -> SearchService {
        SearchService::new(
            pipeline,
            indexer.map(|indexer| indexer as Arc<dyn IndexingPipeline>),
            limiter,
            presets(),
            dir,
        )
    }

    #[tokio::test]
    async fn query_filters_blank_answers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = Arc::new(EchoPipeline::default());
        let service = service(pipeline, None, ConcurrencyLimiter::unbounded(), dir.path());

        let response = service
            .query(QueryRequest {
                query: "Who?".into(),
                ..Default::default()
            })
            .await
            .expect("response");

        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].answer, "re: Who?");
        assert!(response.documents.is_empty());
    }

    #[tokio::test]
    async fn batch_preserves_order_and_uses_presets_without_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = Arc::new(EchoPipeline::default());
        let service = service(
            pipeline.clone(),
            None,
            ConcurrencyLimiter::unbounded(),
            dir.path(),
        );

        let explicit = service
            .advanced_query(Some(AdvancedQueryRequest {
                queries: ["c", "a", "b"]
                    .into_iter()
                    .map(|q| QueryRequest {
                        query: q.into(),
                        ..Default::default()
                    })
                    .collect(),
            }))
            .await
            .expect("batch");
        let order: Vec<&str> = explicit.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);

        let preset = service.advanced_query(None).await.expect("preset batch");
        assert_eq!(preset.len(), 2);
        assert_eq!(preset[0].query, "Who?");

        let calls = pipeline.calls.lock().await;
        let (_, params) = calls.last().expect("preset call");
        assert_eq!(params["Retriever"]["top_k"], 1);
        assert_eq!(params["Reader"]["top_k"], 1);
    }

    #[tokio::test]
    async fn batch_aborts_on_first_failure_and_releases_permit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = Arc::new(EchoPipeline::default());
        let limiter = ConcurrencyLimiter::new(1, LimiterMode::Reject);
        let service = service(pipeline.clone(), None, limiter.clone(), dir.path());

        let queries = ["ok", "boom", "never"]
            .into_iter()
            .map(|q| QueryRequest {
                query: q.into(),
                ..Default::default()
            })
            .collect();
        let error = service
            .advanced_query(Some(AdvancedQueryRequest { queries }))
            .await
            .expect_err("batch failure");

        assert!(matches!(error, QueryError::Pipeline(_)));
        assert_eq!(pipeline.calls.lock().await.len(), 2);
        assert_eq!(limiter.available(), Some(1));
    }

    #[tokio::test]
    async fn busy_limiter_rejects_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = Arc::new(EchoPipeline::default());
        let limiter = ConcurrencyLimiter::new(1, LimiterMode::Reject);
        let service = service(pipeline.clone(), None, limiter.clone(), dir.path());

        let _held = limiter.acquire().await.expect("held permit");
        let error = service
            .query(QueryRequest {
                query: "Who?".into(),
                ..Default::default()
            })
            .await
            .expect_err("busy");

        assert!(matches!(error, QueryError::Limiter(LimiterError::Busy)));
        assert!(pipeline.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn upload_without_indexing_pipeline_is_not_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let staging = dir.path().join("staging");
        let service = service(
            Arc::new(EchoPipeline::default()),
            None,
            ConcurrencyLimiter::unbounded(),
            &staging,
        );
        let form = UploadForm {
            files: vec![UploadedFile {
                filename: "a.pdf".into(),
                content: b"pdf".to_vec(),
            }],
            ..Default::default()
        };

        let error = service.upload_files(form).await.expect_err("not configured");
        assert!(matches!(error, UploadError::NotConfigured));
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn analyze_indexes_then_runs_preset_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = Arc::new(EchoPipeline::default());
        let indexer = Arc::new(CountingIndexer::default());
        let service = service(
            pipeline.clone(),
            Some(indexer.clone()),
            ConcurrencyLimiter::new(1, LimiterMode::Reject),
            dir.path(),
        );
        let form = UploadForm {
            files: vec![UploadedFile {
                filename: "bank.pdf".into(),
                content: b"pdf".to_vec(),
            }],
            ..Default::default()
        };

        let response = service.analyze_files(form).await.expect("analysis");

        assert_eq!(*indexer.runs.lock().await, 1);
        assert_eq!(response.query, "Which company?");
        assert_eq!(response.answers[0].answer, "re: Which company?");
        assert_eq!(service.pipeline_version(), "1.0-test");
    }
}
