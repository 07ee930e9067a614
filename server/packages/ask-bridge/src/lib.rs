use std::path::PathBuf;
use std::sync::Arc;

use ask_bridge_error::BridgeError;
use ask_bridge_tools::{SandboxStore, ToolRegistry};

use agent::{AgentLimits, ReactAgent};
use app::AppState;
use bridge::BridgeConfig;
use chain::ChatChain;
use ollama::{OllamaClient, OllamaConfig};

pub mod agent;
pub mod app;
pub mod bridge;
pub mod chain;
pub mod cli;
pub mod ollama;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub files_dir: PathBuf,
    pub python_bin: PathBuf,
    pub ollama: OllamaConfig,
    pub limits: AgentLimits,
    pub bridge: BridgeConfig,
    pub cors_allow_origins: Vec<String>,
}

/// Wires the sandbox, the tool registry, the agent and the streaming chain
/// around one shared model client.
pub fn build_state(
    config: &ServerConfig,
    client: Arc<OllamaClient>,
) -> Result<Arc<AppState>, BridgeError> {
    let store = SandboxStore::open(config.files_dir.clone())?;
    tracing::info!(root = %store.root().display(), "sandbox ready");

    let tools = ToolRegistry::standard(store, client.clone(), config.python_bin.clone());
    let agent = ReactAgent::new(client.clone(), tools, config.limits);
    Ok(Arc::new(AppState {
        agent: Arc::new(agent),
        stream_source: Arc::new(ChatChain::new(client)),
        bridge: config.bridge.clone(),
    }))
}
