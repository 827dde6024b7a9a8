use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::limiter::LimiterMode;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docquery gateway.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the pipeline runner serving the query pipeline.
    pub pipeline_url: String,
    /// Base URL of the indexing pipeline runner; uploads are disabled when absent.
    pub indexing_pipeline_url: Option<String>,
    /// Version string reported by `GET /hs_version`.
    pub pipeline_version: String,
    /// Default log directive applied when `RUST_LOG` is unset.
    pub log_level: String,
    /// Directory where uploaded files are staged before indexing.
    pub file_upload_path: PathBuf,
    /// Maximum number of concurrent pipeline holders (`0` disables the limit).
    pub concurrency_limit: usize,
    /// Behaviour of the limiter once every slot is taken.
    pub concurrency_mode: LimiterMode,
    /// Name of the retrieval stage receiving filters and `top_k_retriever`.
    pub retriever_node: String,
    /// Name of the reading stage receiving `top_k_reader`.
    pub reader_node: String,
    /// Metadata key used to scope a query to a single uploaded document.
    pub scoping_filter_key: String,
    /// Indexing stages receiving the file-converter form parameters.
    pub converter_nodes: Vec<String>,
    /// Indexing stages receiving the preprocessor form parameters.
    pub preprocessor_nodes: Vec<String>,
    /// Optional JSON file replacing the bundled preset queries.
    pub preset_queries_file: Option<PathBuf>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline_url: load_env("PIPELINE_URL")?,
            indexing_pipeline_url: load_env_optional("INDEXING_PIPELINE_URL"),
            pipeline_version: load_env_optional("PIPELINE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            log_level: load_env_optional("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            file_upload_path: load_env_optional("FILE_UPLOAD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("file-upload")),
            concurrency_limit: load_env_optional("CONCURRENCY_LIMIT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("CONCURRENCY_LIMIT".into()))
                })
                .transpose()?
                .unwrap_or(4),
            concurrency_mode: load_env_optional("CONCURRENCY_MODE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("CONCURRENCY_MODE".into()))
                })
                .transpose()?
                .unwrap_or_default(),
            retriever_node: load_env_optional("RETRIEVER_NODE")
                .unwrap_or_else(|| "Retriever".into()),
            reader_node: load_env_optional("READER_NODE").unwrap_or_else(|| "Reader".into()),
            scoping_filter_key: load_env_optional("SCOPING_FILTER_KEY")
                .unwrap_or_else(|| "pdf_name".into()),
            converter_nodes: load_env_optional("CONVERTER_NODES")
                .map(|value| split_list(&value))
                .unwrap_or_else(|| {
                    vec!["TextFileConverter".into(), "PDFFileConverter".into()]
                }),
            preprocessor_nodes: load_env_optional("PREPROCESSOR_NODES")
                .map(|value| split_list(&value))
                .unwrap_or_else(|| vec!["Preprocessor".into()]),
            preset_queries_file: load_env_optional("PRESET_QUERIES_FILE").map(PathBuf::from),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Split a comma-separated list, dropping blank entries.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load `.env` (when present) and build the configuration from the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    Config::from_env()
}

#[cfg(test)]
mod tests {
    use super::split_list;

    #[test]
    fn split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" TextFileConverter, ,PDFFileConverter ,"),
            vec!["TextFileConverter".to_string(), "PDFFileConverter".to_string()]
        );
        assert!(split_list(" , ").is_empty());
    }
}
