//! External pipeline collaborators.
//!
//! The gateway never looks inside a pipeline: a query pipeline turns a question plus per-stage
//! parameters into a raw result mapping, and an indexing pipeline ingests staged files. Both are
//! shared, read-only handles for the lifetime of the process.

mod remote;

pub use remote::RemotePipeline;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Parameters keyed by pipeline stage name; each value is that stage's option object.
pub type PipelineParams = Map<String, Value>;

/// Errors surfaced by a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid pipeline URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The pipeline runner answered with a non-success status.
    #[error("Unexpected pipeline response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the runner.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The pipeline returned something other than a result mapping.
    #[error("Pipeline returned a malformed result: {0}")]
    MalformedResult(String),
    /// Any other failure raised while the pipeline executed.
    #[error("Pipeline execution failed: {0}")]
    Execution(String),
}

/// Query pipeline: retrieval followed by reading.
#[async_trait]
pub trait QueryPipeline: Send + Sync {
    /// Run the pipeline for a single question.
    async fn run(
        &self,
        query: &str,
        params: PipelineParams,
        debug: Option<bool>,
    ) -> Result<Map<String, Value>, PipelineError>;

    /// Version string of the pipeline framework serving queries.
    fn version(&self) -> &str;
}

/// Indexing pipeline: conversion, preprocessing and document-store writes.
#[async_trait]
pub trait IndexingPipeline: Send + Sync {
    /// Index the staged files, one metadata object per file.
    async fn run(
        &self,
        file_paths: Vec<PathBuf>,
        metas: Vec<Map<String, Value>>,
        params: PipelineParams,
    ) -> Result<(), PipelineError>;

    /// Names of the file-converter stages.
    fn converter_nodes(&self) -> &[String];

    /// Names of the preprocessor stages.
    fn preprocessor_nodes(&self) -> &[String];
}
