use std::sync::Arc;

use ask_bridge_error::BridgeError;

use crate::oracle::CompletionOracle;
use crate::registry::{Tool, ToolKind};
use crate::sandbox::SandboxStore;
use crate::splitter::TextSplitter;

/// Content shorter than this (in chars) is summarized in one call.
pub const DIRECT_SUMMARY_LIMIT: usize = 3000;
pub const CHUNK_SIZE: usize = 1500;
pub const CHUNK_OVERLAP: usize = 150;

/// The `SummarizeFile` tool: direct summary for short files, map-reduce over
/// overlapping chunks for long ones.
pub struct SummarizeFile {
    store: SandboxStore,
    oracle: Arc<dyn CompletionOracle>,
    splitter: TextSplitter,
}

impl SummarizeFile {
    pub fn new(store: SandboxStore, oracle: Arc<dyn CompletionOracle>) -> Self {
        Self {
            store,
            oracle,
            splitter: TextSplitter::new(CHUNK_SIZE, CHUNK_OVERLAP),
        }
    }

    pub fn summarize(&self, raw_name: &str) -> Result<String, BridgeError> {
        let path = self.store.resolve(raw_name)?;
        let content = self.store.read(&path)?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(format!("File is empty: {}", path.name()));
        }

        if content.chars().count() < DIRECT_SUMMARY_LIMIT {
            return self
                .oracle
                .complete(&direct_prompt(content))
                .map(|summary| summary.trim().to_string())
                .map_err(|err| BridgeError::upstream(format!("Direct summary error: {err}")));
        }

        self.map_reduce(content)
            .map_err(|err| BridgeError::upstream(format!("Summary error: {err}")))
    }

    fn map_reduce(&self, content: &str) -> Result<String, BridgeError> {
        let chunks = self.splitter.split_text(content);
        tracing::debug!(chunks = chunks.len(), chars = content.len(), "map-reduce summary");

        let mut partials = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let partial = self.oracle.complete(&map_prompt(chunk))?;
            partials.push(partial.trim().to_string());
        }

        let combined = self.oracle.complete(&combine_prompt(&partials.join("\n\n")))?;
        Ok(combined.trim().to_string())
    }
}

impl Tool for SummarizeFile {
    fn kind(&self) -> ToolKind {
        ToolKind::SummarizeFile
    }

    fn run(&self, input: &str) -> Result<String, BridgeError> {
        self.summarize(input)
    }
}

fn direct_prompt(text: &str) -> String {
    format!(
        "Please summarize this text in 3-5 bullet points, then a one-sentence TL;DR.\n\n\
         Text:\n{text}\n\nSummary:\n-"
    )
}

fn map_prompt(text: &str) -> String {
    format!(
        "Summarize the passage in 3-5 bullets (concise, no copy-paste).\n\n\
         Passage:\n{text}\n\nSummary:\n-"
    )
}

fn combine_prompt(text: &str) -> String {
    format!(
        "Combine into 5-7 clear bullets (no repetition), then a one-sentence TL;DR.\n\n\
         Bullets:\n{text}\n\nFinal Summary:\n-"
    )
}
