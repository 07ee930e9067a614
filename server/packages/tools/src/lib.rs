//! Sandboxed tools exposed to the reasoning loop.
//!
//! Every tool takes one line of text and returns text; failures are turned
//! into readable messages by the [`ToolRegistry`] before they reach the caller.

pub mod command;
pub mod oracle;
pub mod python;
pub mod question;
pub mod registry;
pub mod sandbox;
pub mod shell;
pub mod splitter;
pub mod summarize;

pub use command::{parse, FileAction, FileTool, ToolInvocation, UnknownReason};
pub use oracle::CompletionOracle;
pub use python::PythonTool;
pub use question::QuestionOnFile;
pub use registry::{Tool, ToolKind, ToolRegistry};
pub use sandbox::{strip_quotes, SandboxPath, SandboxStore};
pub use shell::{RestrictedShell, ShellRequest};
pub use splitter::TextSplitter;
pub use summarize::SummarizeFile;
