use std::sync::Arc;

use ask_bridge_error::BridgeError;

use crate::bridge::{ChunkIter, ChunkSource};
use crate::ollama::OllamaClient;

pub const SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
For any file operations (list/read/write), you MUST call the FileExploitation tool. \
Return the tool output verbatim unless asked otherwise. \
Answers must be concise (<=3 sentences). If you don't know, say you don't know.";

/// Plain chat chain behind the streaming endpoint: the system prompt plus the
/// user's question, streamed straight from the model. No tools.
#[derive(Debug, Clone)]
pub struct ChatChain {
    client: Arc<OllamaClient>,
    system: String,
}

impl ChatChain {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self {
            client,
            system: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ChunkSource for ChatChain {
    fn stream(&self, input: &str) -> Result<ChunkIter, BridgeError> {
        self.client.stream(Some(&self.system), input)
    }
}
