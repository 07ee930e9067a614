//! One-line file commands: `list`, `read <file>`, `write <file> <content...>`.

use std::fmt;

use ask_bridge_error::BridgeError;

use crate::registry::{Tool, ToolKind};
use crate::sandbox::{strip_quotes, SandboxStore};

pub const NO_INPUT: &str = "No input provided.";
pub const MISSING_FILENAME: &str = "Missing filename.";
pub const INVALID_ACTION: &str =
    "Invalid action. Use 'list', 'read <file>', or 'write <file> <content>'.";
pub const EMPTY_LISTING: &str = "(empty)";

/// Why a raw command could not be mapped to a file action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownReason {
    NoInput,
    MissingFilename,
    InvalidAction,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hint = match self {
            Self::NoInput => NO_INPUT,
            Self::MissingFilename => MISSING_FILENAME,
            Self::InvalidAction => INVALID_ACTION,
        };
        f.write_str(hint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    List,
    Read,
    Write,
    Unknown(UnknownReason),
}

/// A parsed file command. Produced by [`parse`], consumed by one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub action: FileAction,
    pub target: Option<String>,
    pub payload: Option<String>,
}

impl ToolInvocation {
    fn unknown(reason: UnknownReason) -> Self {
        Self {
            action: FileAction::Unknown(reason),
            target: None,
            payload: None,
        }
    }
}

/// Parses a free-text file command. Total: every input yields an invocation.
pub fn parse(raw: &str) -> ToolInvocation {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ToolInvocation::unknown(UnknownReason::NoInput);
    }

    let cleaned = strip_quotes(trimmed);
    let (action, rest) = split_field(cleaned);
    let (target, payload) = split_field(rest);
    let action = action.to_lowercase();
    let target = strip_quotes(target);

    match action.as_str() {
        "list" => ToolInvocation {
            action: FileAction::List,
            target: None,
            payload: None,
        },
        "read" if target.is_empty() => ToolInvocation::unknown(UnknownReason::MissingFilename),
        "read" => ToolInvocation {
            action: FileAction::Read,
            target: Some(target.to_string()),
            payload: None,
        },
        "write" if target.is_empty() => ToolInvocation::unknown(UnknownReason::MissingFilename),
        "write" => ToolInvocation {
            action: FileAction::Write,
            target: Some(target.to_string()),
            payload: Some(payload.to_string()),
        },
        "" => ToolInvocation::unknown(UnknownReason::NoInput),
        _ => ToolInvocation::unknown(UnknownReason::InvalidAction),
    }
}

/// Splits off the first whitespace-delimited field; the remainder keeps its
/// inner spacing but loses the separating whitespace run.
fn split_field(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(index) => (&input[..index], input[index..].trim_start()),
        None => (input, ""),
    }
}

/// Runs a parsed invocation against the store.
pub fn dispatch(store: &SandboxStore, invocation: &ToolInvocation) -> Result<String, BridgeError> {
    match invocation.action {
        FileAction::List => {
            let entries = store.list()?;
            if entries.is_empty() {
                Ok(EMPTY_LISTING.to_string())
            } else {
                Ok(entries.join("\n"))
            }
        }
        FileAction::Read => {
            let path = store.resolve(invocation.target.as_deref().unwrap_or_default())?;
            store.read(&path)
        }
        FileAction::Write => {
            let path = store.resolve(invocation.target.as_deref().unwrap_or_default())?;
            store.write(&path, invocation.payload.as_deref().unwrap_or_default())?;
            Ok(format!("Written to {}", path.name()))
        }
        FileAction::Unknown(reason) => Ok(reason.to_string()),
    }
}

/// The `FileExploitation` tool: parse, then dispatch against the sandbox.
#[derive(Debug, Clone)]
pub struct FileTool {
    store: SandboxStore,
}

impl FileTool {
    pub fn new(store: SandboxStore) -> Self {
        Self { store }
    }
}

impl Tool for FileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FileExploitation
    }

    fn run(&self, input: &str) -> Result<String, BridgeError> {
        let invocation = parse(input);
        tracing::debug!(action = ?invocation.action, target = ?invocation.target, "file tool");
        dispatch(&self.store, &invocation)
    }
}
