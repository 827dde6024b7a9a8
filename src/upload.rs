//! File upload staging for the indexing pipeline.
//!
//! Uploaded files are written to the staging directory as `<uuid-hex>_<basename>`, each with its
//! own copy of the caller's metadata, and handed to the indexing pipeline together with the
//! converter/preprocessor form parameters.

use crate::pipeline::{IndexingPipeline, PipelineError, PipelineParams};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors emitted while accepting an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No indexing pipeline is available.
    #[error("Indexing Pipeline is not configured.")]
    NotConfigured,
    /// The `meta` field is not a JSON object (or `null`).
    #[error("The meta field must be a dict or None, not {0}")]
    InvalidMeta(String),
    /// The `additional_params` field is not a JSON object (or `null`).
    #[error("The additional_params field must be a dict or None, not {0}")]
    InvalidParams(String),
    /// A form field could not be read or parsed.
    #[error("Invalid form field '{field}': {reason}")]
    Form {
        /// Name of the offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The request carried no files.
    #[error("At least one file must be uploaded")]
    NoFiles,
    /// Writing a staged file failed.
    #[error("Failed to stage {path}: {source}")]
    Staging {
        /// Destination that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The indexing pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Form parameters forwarded to every file-converter stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileConverterParams {
    /// Drop tables made mostly of numbers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_numeric_tables: Option<bool>,
    /// Languages the converted text is expected to be in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_languages: Option<Vec<String>>,
}

/// Form parameters forwarded to every preprocessor stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreprocessorParams {
    /// Strip leading/trailing whitespace on each line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_whitespace: Option<bool>,
    /// Collapse runs of empty lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_empty_lines: Option<bool>,
    /// Remove repeated page headers and footers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_header_footer: Option<bool>,
    /// Unit used when splitting (`word`, `sentence`, `passage`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_by: Option<String>,
    /// Maximum units per split.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_length: Option<u32>,
    /// Units shared between consecutive splits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_overlap: Option<u32>,
    /// Avoid cutting sentences when splitting by word.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_respect_sentence_boundary: Option<bool>,
}

/// A file received in the `files` form field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name supplied by the client.
    pub filename: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

/// Everything read from an upload form.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    /// Uploaded files, in form order.
    pub files: Vec<UploadedFile>,
    /// JSON-serialized metadata object applied to every file.
    pub meta: Option<String>,
    /// JSON-serialized per-stage parameters for the indexing pipeline.
    pub additional_params: Option<String>,
    /// File-converter parameters.
    pub converter: FileConverterParams,
    /// Preprocessor parameters.
    pub preprocessor: PreprocessorParams,
}

/// Summary of an accepted upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Paths of the staged files, in form order.
    pub file_paths: Vec<PathBuf>,
}

impl UploadForm {
    /// Record a non-file form field. Unknown fields are ignored.
    pub fn set_field(&mut self, name: &str, value: String) -> Result<(), UploadError> {
        match name {
            "meta" => self.meta = Some(value),
            "additional_params" => self.additional_params = Some(value),
            "remove_numeric_tables" => {
                self.converter.remove_numeric_tables = Some(parse_bool(name, &value)?)
            }
            "valid_languages" => {
                let languages = self.converter.valid_languages.get_or_insert_with(Vec::new);
                languages.extend(crate::config::split_list(&value));
            }
            "clean_whitespace" => {
                self.preprocessor.clean_whitespace = Some(parse_bool(name, &value)?)
            }
            "clean_empty_lines" => {
                self.preprocessor.clean_empty_lines = Some(parse_bool(name, &value)?)
            }
            "clean_header_footer" => {
                self.preprocessor.clean_header_footer = Some(parse_bool(name, &value)?)
            }
            "split_by" => self.preprocessor.split_by = non_blank(value),
            "split_length" => self.preprocessor.split_length = Some(parse_int(name, &value)?),
            "split_overlap" => self.preprocessor.split_overlap = Some(parse_int(name, &value)?),
            "split_respect_sentence_boundary" => {
                self.preprocessor.split_respect_sentence_boundary = Some(parse_bool(name, &value)?)
            }
            other => tracing::debug!(field = other, "Ignoring unknown upload form field"),
        }
        Ok(())
    }
}

/// Parse the `meta` field: absent or falsy JSON (`null`, `[]`, `""`, ...) yields an empty object.
pub fn parse_meta(raw: Option<&str>) -> Result<Map<String, Value>, UploadError> {
    parse_json_object(raw, "meta").map_err(UploadError::InvalidMeta)
}

/// Parse the `additional_params` field: absent or falsy JSON yields an empty object.
pub fn parse_additional_params(raw: Option<&str>) -> Result<PipelineParams, UploadError> {
    parse_json_object(raw, "additional_params").map_err(UploadError::InvalidParams)
}

fn parse_json_object(raw: Option<&str>, field: &str) -> Result<Map<String, Value>, String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if is_falsy(&value) => Ok(Map::new()),
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(json_kind(&other).to_string()),
        Err(err) => {
            tracing::debug!(field, error = %err, "Form field is not valid JSON");
            Err(format!("invalid JSON ({err})"))
        }
    }
}

/// Empty containers, `false`, zero and `""` count as "no value", like `null`.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Merge `additional_params` with the converter and preprocessor parameters for each node.
pub fn build_indexing_params(
    mut params: PipelineParams,
    converter: &FileConverterParams,
    preprocessor: &PreprocessorParams,
    converter_nodes: &[String],
    preprocessor_nodes: &[String],
) -> Result<PipelineParams, serde_json::Error> {
    let converter = serde_json::to_value(converter)?;
    let preprocessor = serde_json::to_value(preprocessor)?;
    for node in converter_nodes {
        params.insert(node.clone(), converter.clone());
    }
    for node in preprocessor_nodes {
        params.insert(node.clone(), preprocessor.clone());
    }
    Ok(params)
}

/// Write `files` into `dir`, returning their paths and one metadata object per file.
pub async fn stage_files(
    dir: &Path,
    files: Vec<UploadedFile>,
    meta: &Map<String, Value>,
) -> Result<(Vec<PathBuf>, Vec<Map<String, Value>>), UploadError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| UploadError::Staging {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut file_paths = Vec::with_capacity(files.len());
    let mut metas = Vec::with_capacity(files.len());
    for file in files {
        let name = safe_file_name(&file.filename);
        let path = dir.join(format!("{}_{}", uuid::Uuid::new_v4().simple(), name));
        write_file(&path, &file.content).await?;
        tracing::debug!(path = %path.display(), bytes = file.content.len(), "Staged upload");

        let mut file_meta = meta.clone();
        file_meta.insert("name".into(), Value::String(file.filename));
        file_paths.push(path);
        metas.push(file_meta);
    }
    Ok((file_paths, metas))
}

/// Validate, stage, and index an upload.
///
/// `meta` and `additional_params` are validated before anything touches the disk.
pub async fn index_upload(
    form: UploadForm,
    dir: &Path,
    pipeline: &dyn IndexingPipeline,
) -> Result<UploadOutcome, UploadError> {
    let UploadForm {
        files,
        meta,
        additional_params,
        converter,
        preprocessor,
    } = form;

    if files.is_empty() {
        return Err(UploadError::NoFiles);
    }
    let meta = parse_meta(meta.as_deref())?;
    let additional = parse_additional_params(additional_params.as_deref())?;
    let params = build_indexing_params(
        additional,
        &converter,
        &preprocessor,
        pipeline.converter_nodes(),
        pipeline.preprocessor_nodes(),
    )
    .map_err(|err| UploadError::Form {
        field: "params".into(),
        reason: err.to_string(),
    })?;

    let file_count = files.len();
    let (file_paths, metas) = stage_files(dir, files, &meta).await?;
    pipeline.run(file_paths.clone(), metas, params).await?;
    tracing::info!(files = file_count, dir = %dir.display(), "Upload indexed");

    Ok(UploadOutcome { file_paths })
}

async fn write_file(path: &Path, content: &[u8]) -> Result<(), UploadError> {
    let staging_error = |source| UploadError::Staging {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(staging_error)?;
    file.write_all(content).await.map_err(staging_error)?;
    file.flush().await.map_err(staging_error)?;
    Ok(())
}

/// Keep only the final path component of a client-supplied filename.
fn safe_file_name(filename: &str) -> String {
    Path::new(filename.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("upload.bin")
        .to_string()
}

fn parse_bool(field: &str, value: &str) -> Result<bool, UploadError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(UploadError::Form {
            field: field.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_int(field: &str, value: &str) -> Result<u32, UploadError> {
    value.trim().parse().map_err(|_| UploadError::Form {
        field: field.to_string(),
        reason: format!("expected a non-negative integer, got '{}'", value.trim()),
    })
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
