use clap::{Parser, Subcommand};
use codegraph_ingest::fanout::auth::StaticTokenAuthGate;
use codegraph_ingest::fanout::SessionManager;
use codegraph_ingest::model::ChangeEvent;
use codegraph_ingest::sink::embedding::{EmbeddingClient, InMemoryEmbeddingClient};
use codegraph_ingest::sink::{InMemorySink, KnowledgeGraphSink};
use codegraph_ingest::types::EventKind;
use codegraph_ingest::{logging, Pipeline, Settings};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "codegraph-ingest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental code-graph ingestion pipeline with realtime subscription fan-out")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default ingest.toml alongside the binary
    Init {
        /// Overwrite an existing ingest.toml
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective merged configuration
    Config {
        /// Path to a TOML config file (defaults to ./ingest.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the pipeline against a local directory, emitting one change
    /// event per file, and serve the subscription fan-out over WebSocket
    Run {
        /// Directory of demo source files to ingest
        path: PathBuf,

        /// Path to a TOML config file (defaults to ./ingest.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bearer token accepted by the fan-out transport's demo auth gate
        #[arg(long, default_value = "demo-token")]
        token: String,

        /// Port to serve the fan-out WebSocket and /healthz endpoint on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Namespace/module recorded on synthesized change events
        #[arg(long, default_value = "demo")]
        namespace: String,
    },
}

fn default_settings_toml() -> String {
    let settings = Settings::default();
    toml::to_string_pretty(&settings).unwrap_or_else(|_| "# failed to render defaults\n".to_string())
}

fn walk_source_files(root: &std::path::Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()).is_some_and(|e| matches!(e, "ts" | "tsx" | "js" | "jsx")) {
                files.push(path);
            }
        }
    }
    files
}

async fn healthz(axum::extract::State(pipeline): axum::extract::State<Arc<Pipeline>>) -> axum::Json<serde_json::Value> {
    let queue_depth = pipeline.queue_handle().map(|q| q.metrics().total_depth);
    let worker_count = pipeline.worker_pool_handle().map(|w| w.worker_count());
    axum::Json(serde_json::json!({
        "state": format!("{:?}", pipeline.state()),
        "queueDepth": queue_depth,
        "workerCount": worker_count,
    }))
}

async fn run(path: PathBuf, config: Option<PathBuf>, token: String, port: u16, namespace: String) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;
    logging::init_with_config(&settings.logging);

    let sink: Arc<dyn KnowledgeGraphSink> = Arc::new(InMemorySink::new());
    let embedding_client: Arc<dyn EmbeddingClient> = Arc::new(InMemoryEmbeddingClient::new());
    let auth = Arc::new(StaticTokenAuthGate::single(token.clone(), "demo-subscriber", vec![settings.fanout.required_scope.clone()]));
    let fanout = SessionManager::new(settings.fanout.clone(), auth);

    let pipeline = Arc::new(Pipeline::new(settings, sink, Some(embedding_client), path.clone()).with_fanout(fanout.clone()));
    pipeline.start()?;
    tracing::info!("pipeline running, ingesting from {}", path.display());

    let files = walk_source_files(&path);
    tracing::info!("found {} source file(s) under {}", files.len(), path.display());
    let events: Vec<ChangeEvent> = files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            let rel = file.strip_prefix(&path).unwrap_or(file).to_string_lossy().replace('\\', "/");
            let size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
            ChangeEvent {
                id: format!("demo-{i}"),
                namespace: namespace.clone(),
                module: "main".to_string(),
                file_path: rel,
                event_type: EventKind::Created,
                timestamp: chrono::Utc::now(),
                size,
                diff_hash: format!("seed-{i}"),
                metadata: Default::default(),
            }
        })
        .collect();

    for result in pipeline.ingest_change_events(events) {
        if let Err(e) = result {
            tracing::warn!("failed to ingest demo event: {e}");
        }
    }

    let sweep_pipeline = pipeline.clone();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            sweep_pipeline.tick_background_sweeps();
        }
    });

    let health_router = axum::Router::new().route("/healthz", axum::routing::get(healthz)).with_state(pipeline.clone());
    let app = codegraph_ingest::fanout::router(fanout).merge(health_router);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("serving fan-out and healthz on :{port}");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("server error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    sweeper.abort();
    pipeline.stop().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            let path = PathBuf::from("ingest.toml");
            if path.exists() && !force {
                anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
            }
            std::fs::write(&path, default_settings_toml())?;
            println!("wrote {}", path.display());
            Ok(())
        }
        Commands::Config { config } => {
            let settings = Settings::load(config)?;
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Run { path, config, token, port, namespace } => run(path, config, token, port, namespace).await,
    }
}
