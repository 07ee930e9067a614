use std::sync::Arc;

use ask_bridge_error::BridgeError;

use crate::oracle::CompletionOracle;
use crate::registry::{Tool, ToolKind};
use crate::sandbox::{strip_quotes, SandboxStore};

pub const INVALID_FORMAT: &str = "Invalid format. Use: 'filename.txt | question'";

/// Splits `<filename> | <question>` on the first `|`.
pub fn parse_question(input: &str) -> Result<(String, String), BridgeError> {
    let Some((left, right)) = input.split_once('|') else {
        return Err(BridgeError::format(INVALID_FORMAT));
    };
    let filename = strip_quotes(left.trim());
    let question = right.trim();
    if filename.is_empty() || question.is_empty() {
        return Err(BridgeError::format(INVALID_FORMAT));
    }
    Ok((filename.to_string(), question.to_string()))
}

/// The `QuestionOnFile` tool: answers a question using only one file's text.
pub struct QuestionOnFile {
    store: SandboxStore,
    oracle: Arc<dyn CompletionOracle>,
}

impl QuestionOnFile {
    pub fn new(store: SandboxStore, oracle: Arc<dyn CompletionOracle>) -> Self {
        Self { store, oracle }
    }

    pub fn answer(&self, input: &str) -> Result<String, BridgeError> {
        let (filename, question) = parse_question(input)?;
        let path = self.store.resolve(&filename)?;
        let content = self.store.read(&path)?;
        if content.trim().is_empty() {
            return Ok(format!("File is empty: {}", path.name()));
        }

        let prompt = format!(
            "Here is the content of a file:\n{content}\n\n\
             Based only on this text, answer clearly the question: {question}"
        );
        self.oracle
            .complete(&prompt)
            .map_err(|err| BridgeError::upstream(format!("Question error: {err}")))
    }
}

impl Tool for QuestionOnFile {
    fn kind(&self) -> ToolKind {
        ToolKind::QuestionOnFile
    }

    fn run(&self, input: &str) -> Result<String, BridgeError> {
        self.answer(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_pipe() {
        let (file, question) = parse_question(" 'notes.txt' | what is a | b? ").expect("parse");
        assert_eq!(file, "notes.txt");
        assert_eq!(question, "what is a | b?");
    }

    #[test]
    fn missing_pipe_or_question_is_a_format_error() {
        for input in ["notes.txt", "notes.txt |   ", "", "| why?"] {
            let err = parse_question(input).expect_err(input);
            assert_eq!(err.to_string(), INVALID_FORMAT);
        }
    }
}
