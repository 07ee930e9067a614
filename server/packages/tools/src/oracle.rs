use ask_bridge_error::BridgeError;

/// Blocking text-completion backend shared by the summarize and Q&A tools
/// and the reasoning agent.
pub trait CompletionOracle: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, BridgeError>;

    /// Completion that stops before any of the `stop` sequences.
    ///
    /// Backends without native stop support truncate the output instead.
    fn complete_with_stop(&self, prompt: &str, stop: &[&str]) -> Result<String, BridgeError> {
        let mut text = self.complete(prompt)?;
        if let Some(index) = stop.iter().filter_map(|marker| text.find(marker)).min() {
            text.truncate(index);
        }
        Ok(text)
    }
}
