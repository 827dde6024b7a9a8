//! Preset question lists loaded from JSON.

use super::types::QueryRequest;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUNDLED_PRESETS: &str = include_str!("../../presets/queries.json");

/// Errors raised while loading preset queries.
#[derive(Debug, Error)]
pub enum PresetError {
    /// The preset file could not be read.
    #[error("Failed to read preset file {path}: {source}")]
    Io {
        /// File we attempted to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The preset document is not valid JSON of the expected shape.
    #[error("Invalid preset document: {0}")]
    Parse(#[from] serde_json::Error),
    /// `analyze_pdf` must name at least one question.
    #[error("Preset document has no analyze_pdf query")]
    MissingAnalyzeQuery,
}

/// Preset question lists.
#[derive(Debug, Clone, Deserialize)]
pub struct PresetQueries {
    /// Questions answered by `POST /advanced_query` when no body is sent.
    #[serde(default)]
    pub advanced_query: Vec<String>,
    /// Questions answered after `POST /analyze-pdf` indexes its files; the first one is used.
    pub analyze_pdf: Vec<String>,
}

impl PresetQueries {
    /// Presets compiled into the binary.
    pub fn bundled() -> Result<Self, PresetError> {
        Self::from_json(BUNDLED_PRESETS)
    }

    /// Parse and validate a preset document.
    pub fn from_json(raw: &str) -> Result<Self, PresetError> {
        let mut presets: Self = serde_json::from_str(raw)?;
        presets.advanced_query.retain(|query| !query.trim().is_empty());
        presets.analyze_pdf.retain(|query| !query.trim().is_empty());
        if presets.analyze_pdf.is_empty() {
            return Err(PresetError::MissingAnalyzeQuery);
        }
        Ok(presets)
    }

    /// Load presets from `path`.
    pub fn from_file(path: &Path) -> Result<Self, PresetError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let presets = Self::from_json(&raw)?;
        tracing::debug!(
            path = %path.display(),
            advanced = presets.advanced_query.len(),
            analyze = presets.analyze_pdf.len(),
            "Loaded preset queries"
        );
        Ok(presets)
    }

    /// Load from `path` when given, otherwise fall back to the bundled presets.
    pub fn load(path: Option<&Path>) -> Result<Self, PresetError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::bundled(),
        }
    }

    /// Requests for the `advanced_query` batch.
    pub fn advanced_requests(&self) -> Vec<QueryRequest> {
        self.advanced_query
            .iter()
            .map(|query| QueryRequest::preset(query.as_str()))
            .collect()
    }

    /// Request run after `analyze-pdf` has indexed its files.
    pub fn analyze_request(&self) -> Option<QueryRequest> {
        self.analyze_pdf
            .first()
            .map(|query| QueryRequest::preset(query.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn bundled_presets_load() {
        let presets = PresetQueries::bundled().expect("bundled presets");
        assert!(!presets.advanced_query.is_empty());
        let analyze = presets.analyze_request().expect("analyze query");
        assert_eq!(analyze.query, "What is the name of the company?");
        assert_eq!(analyze.top_k_reader, Some(1));
        assert_eq!(analyze.top_k_retriever, Some(1));
    }

    #[test]
    fn advanced_requests_preserve_order() {
        let presets = PresetQueries::from_json(
            r#"{ "advanced_query": ["first", " ", "second"], "analyze_pdf": ["x"] }"#,
        )
        .expect("presets");
        let queries: Vec<String> = presets
            .advanced_requests()
            .into_iter()
            .map(|request| request.query)
            .collect();
        assert_eq!(queries, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn empty_analyze_list_is_rejected() {
        let error = PresetQueries::from_json(r#"{ "advanced_query": ["a"], "analyze_pdf": [""] }"#)
            .expect_err("missing analyze query");
        assert!(matches!(error, PresetError::MissingAnalyzeQuery));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "advanced_query": ["Who are the shareholders?"], "analyze_pdf": ["Who signed?"] }}"#
        )
        .expect("write presets");

        let presets = PresetQueries::load(Some(file.path())).expect("presets");
        assert_eq!(presets.advanced_query, vec!["Who are the shareholders?".to_string()]);
        assert_eq!(presets.analyze_pdf, vec!["Who signed?".to_string()]);

        let missing = PresetQueries::load(Some(Path::new("/nonexistent/presets.json")));
        assert!(matches!(missing, Err(PresetError::Io { .. })));
    }
}
