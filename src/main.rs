use anyhow::Context;
use clap::Parser;
use docquery::{
    api, config,
    limiter::ConcurrencyLimiter,
    logging,
    pipeline::{IndexingPipeline, RemotePipeline},
    query::{AdapterSettings, PresetQueries, SearchService},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// HTTP gateway for an extractive question-answering pipeline.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Port to listen on (overrides `SERVER_PORT`).
    #[arg(long)]
    port: Option<u16>,
    /// Preset query file (overrides `PRESET_QUERIES_FILE`).
    #[arg(long)]
    presets: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = config::load_config().context("Failed to load config from environment")?;
    if cli.port.is_some() {
        config.server_port = cli.port;
    }
    if cli.presets.is_some() {
        config.preset_queries_file = cli.presets;
    }
    logging::init_tracing(&config.log_level);
    tracing::debug!(
        pipeline_url = %config.pipeline_url,
        indexing_pipeline_url = ?config.indexing_pipeline_url,
        upload_dir = %config.file_upload_path.display(),
        concurrency_limit = config.concurrency_limit,
        concurrency_mode = ?config.concurrency_mode,
        server_port = ?config.server_port,
        "Loaded configuration"
    );

    let service = build_service(&config)?;
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn build_service(config: &config::Config) -> anyhow::Result<SearchService> {
    let query_pipeline = RemotePipeline::new(&config.pipeline_url, &config.pipeline_version)
        .context("Failed to initialize query pipeline client")?;

    let indexing_pipeline = match config.indexing_pipeline_url.as_deref() {
        Some(url) => {
            let pipeline = RemotePipeline::new(url, &config.pipeline_version)
                .context("Failed to initialize indexing pipeline client")?
                .with_indexing_nodes(
                    config.converter_nodes.clone(),
                    config.preprocessor_nodes.clone(),
                );
            Some(Arc::new(pipeline) as Arc<dyn IndexingPipeline>)
        }
        None => {
            tracing::warn!("INDEXING_PIPELINE_URL not set; file uploads are disabled");
            None
        }
    };

    let presets = PresetQueries::load(config.preset_queries_file.as_deref())
        .context("Failed to load preset queries")?;
    let limiter = ConcurrencyLimiter::new(config.concurrency_limit, config.concurrency_mode);

    Ok(SearchService::new(
        Arc::new(query_pipeline),
        indexing_pipeline,
        limiter,
        presets,
        config.file_upload_path.clone(),
    )
    .with_adapter_settings(AdapterSettings {
        retriever_node: config.retriever_node.clone(),
        reader_node: config.reader_node.clone(),
        scoping_filter_key: config.scoping_filter_key.clone(),
    }))
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
