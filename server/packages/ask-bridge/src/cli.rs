use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ask_bridge_error::BridgeError;
use axum::http::HeaderValue;
use clap::Parser;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::agent::{AgentLimits, DEFAULT_MAX_ITERATIONS};
use crate::app::build_router;
use crate::bridge::BridgeConfig;
use crate::build_state;
use crate::ollama::{OllamaClient, OllamaConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::ServerConfig;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Parser)]
#[command(name = "ask-bridge")]
#[command(about = "Conversational assistant with streaming answers and sandboxed file tools", version)]
pub struct Cli {
    #[arg(long, short = 'H', default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Sandbox directory the file tools are confined to.
    #[arg(long, env = "FILES_DIR", default_value = "./files")]
    files_dir: PathBuf,

    #[arg(long, env = "OLLAMA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    ollama_base_url: String,

    #[arg(long, env = "MODEL_NAME", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value_t = 0.1)]
    temperature: f32,

    #[arg(long, default_value_t = 512)]
    max_tokens: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    #[arg(long, default_value_t = 30)]
    max_execution_secs: u64,

    /// Overall limit for one streamed answer. Unlimited when unset.
    #[arg(long)]
    stream_timeout_secs: Option<u64>,

    #[arg(long, env = "PYTHON_BIN", default_value = "python3")]
    python_bin: PathBuf,

    /// Allowed CORS origin; repeat for several. Any origin when omitted.
    #[arg(long = "cors-allow-origin", short = 'O')]
    cors_allow_origin: Vec<String>,
}

impl Cli {
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            files_dir: self.files_dir,
            python_bin: self.python_bin,
            ollama: OllamaConfig {
                base_url: self.ollama_base_url,
                model: self.model,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                ..OllamaConfig::default()
            },
            limits: AgentLimits {
                max_iterations: self.max_iterations,
                max_execution_time: Duration::from_secs(self.max_execution_secs),
            },
            bridge: BridgeConfig {
                deadline: self.stream_timeout_secs.map(Duration::from_secs),
                ..BridgeConfig::default()
            },
            cors_allow_origins: self.cors_allow_origin,
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid cors origin: {0}")]
    InvalidCorsOrigin(String),
    #[error("failed to init logging: {0}")]
    Logging(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("server error: {0}")]
    Server(String),
}

pub fn run_ask_bridge() -> Result<(), CliError> {
    let cli = Cli::parse();
    if let Err(err) = init_logging() {
        eprintln!("{err}");
        return Err(err);
    }
    run_server(cli.into_config())
}

pub fn init_logging() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|err| CliError::Logging(err.to_string()))
}

/// Runs the HTTP server until Ctrl-C.
///
/// The model client is blocking, so it is built before the runtime starts
/// and released only after the runtime has shut down.
pub fn run_server(config: ServerConfig) -> Result<(), CliError> {
    let cors = build_cors_layer(&config.cors_allow_origins)?;
    let client = Arc::new(OllamaClient::new(config.ollama.clone())?);
    let state = build_state(&config, client.clone())?;
    let router = build_router(state).layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    let result = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(
            addr = %addr,
            model = %config.ollama.model,
            ollama = %config.ollama.base_url,
            "server listening"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown requested");
            })
            .await
            .map_err(|err| CliError::Server(err.to_string()))
    });

    drop(runtime);
    drop(client);
    result
}

fn build_cors_layer(origins: &[String]) -> Result<CorsLayer, CliError> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(cors.allow_origin(Any));
    }

    let mut allowed: Vec<HeaderValue> = Vec::with_capacity(origins.len());
    for origin in origins {
        let value = origin
            .parse()
            .map_err(|_| CliError::InvalidCorsOrigin(origin.clone()))?;
        allowed.push(value);
    }
    Ok(cors.allow_origin(allowed))
}
