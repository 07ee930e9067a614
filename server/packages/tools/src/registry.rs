use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use ask_bridge_error::BridgeError;

use crate::command::FileTool;
use crate::oracle::CompletionOracle;
use crate::python::PythonTool;
use crate::question::QuestionOnFile;
use crate::sandbox::SandboxStore;
use crate::shell::RestrictedShell;
use crate::summarize::SummarizeFile;

/// The closed set of capabilities the reasoning loop can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    Python,
    Shell,
    FileExploitation,
    SummarizeFile,
    QuestionOnFile,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        Self::Python,
        Self::Shell,
        Self::FileExploitation,
        Self::SummarizeFile,
        Self::QuestionOnFile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::Shell => "Shell",
            Self::FileExploitation => "FileExploitation",
            Self::SummarizeFile => "SummarizeFile",
            Self::QuestionOnFile => "QuestionOnFile",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Python => "Execute Python code.",
            Self::Shell => "Execute secure shell commands (ls/pwd/whoami).",
            Self::FileExploitation => {
                "List/read/write in ./files. 'list' | 'read <file>' | 'write <file> <content>'"
            }
            Self::SummarizeFile => "Summarize a file (pass filename only).",
            Self::QuestionOnFile => "Ask about a file. Format: 'filename.txt | my question'",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A capability with a text-in, text-out contract.
///
/// `run` may fail; the registry turns the error into text so callers never
/// see anything but a string.
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn run(&self, input: &str) -> Result<String, BridgeError>;
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Builds a registry from `tools`, in order.
    ///
    /// # Panics
    ///
    /// Panics when two tools share a [`ToolKind`]; that is a wiring bug.
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        for (index, tool) in tools.iter().enumerate() {
            let kind = tool.kind();
            assert!(
                tools[..index].iter().all(|other| other.kind() != kind),
                "tool {kind} registered twice"
            );
        }
        Self { tools }
    }

    /// The fixed tool set served to the reasoning loop.
    pub fn standard(
        store: SandboxStore,
        oracle: Arc<dyn CompletionOracle>,
        python_bin: impl Into<PathBuf>,
    ) -> Self {
        let root = store.root().to_path_buf();
        Self::new(vec![
            Box::new(PythonTool::new(python_bin, root.clone())),
            Box::new(RestrictedShell::new(root)),
            Box::new(FileTool::new(store.clone())),
            Box::new(SummarizeFile::new(store.clone(), oracle.clone())),
            Box::new(QuestionOnFile::new(store, oracle)),
        ])
    }

    pub fn kinds(&self) -> impl Iterator<Item = ToolKind> + '_ {
        self.tools.iter().map(|tool| tool.kind())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.kinds().map(|kind| kind.name()).collect()
    }

    /// Invokes the tool called `name`. Unknown names get a hint listing the
    /// registered tools.
    pub fn invoke(&self, name: &str, input: &str) -> String {
        let name = name.trim();
        match ToolKind::from_name(name).filter(|kind| self.kinds().any(|k| k == *kind)) {
            Some(kind) => self.call(kind, input),
            None => format!(
                "{name} is not a valid tool, try one of [{}].",
                self.names().join(", ")
            ),
        }
    }

    pub fn call(&self, kind: ToolKind, input: &str) -> String {
        let Some(tool) = self.tools.iter().find(|tool| tool.kind() == kind) else {
            return format!("{kind} is not available");
        };

        tracing::info!(tool = %kind, input_len = input.len(), "tool invoked");
        match catch_unwind(AssertUnwindSafe(|| tool.run(input))) {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::info!(tool = %kind, error_type = ?err.error_type(), error = %err, "tool failed");
                err.to_string()
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %kind, panic = %message, "tool panicked");
                format!("{kind} error: {message}")
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "tool panicked".to_string()
}
