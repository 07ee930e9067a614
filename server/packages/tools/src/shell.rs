use std::path::PathBuf;
use std::process::Command;

use ask_bridge_error::BridgeError;

use crate::registry::{Tool, ToolKind};

pub const COMMAND_NOT_ALLOWED: &str = "Command not allowed";
pub const DEFAULT_ALLOWED_COMMANDS: [&str; 3] = ["ls", "pwd", "whoami"];

/// A single command line as received from the reasoning loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    command_line: String,
}

impl ShellRequest {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
        }
    }

    pub fn verb(&self) -> Option<&str> {
        self.command_line.split_whitespace().next()
    }

    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.command_line.split_whitespace().skip(1)
    }
}

/// Runs allow-listed, side-effect-free commands.
///
/// The command line is split on whitespace and executed directly as an
/// argument vector; no shell ever sees it, so `;`, `&&`, pipes and
/// substitutions are plain arguments to the allowed program.
#[derive(Debug, Clone)]
pub struct RestrictedShell {
    allowed: Vec<String>,
    cwd: PathBuf,
    max_output: usize,
}

impl RestrictedShell {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_COMMANDS.iter().map(|c| c.to_string()).collect(),
            cwd: cwd.into(),
            max_output: 16 * 1024,
        }
    }

    pub fn is_allowed(&self, request: &ShellRequest) -> bool {
        request
            .verb()
            .is_some_and(|verb| self.allowed.iter().any(|entry| entry == verb))
    }

    /// Executes `command_line` if its verb is allow-listed. Always returns text.
    pub fn execute(&self, command_line: &str) -> String {
        let request = ShellRequest::new(command_line);
        if !self.is_allowed(&request) {
            tracing::warn!(verb = ?request.verb(), "shell command rejected");
            return COMMAND_NOT_ALLOWED.to_string();
        }
        match self.spawn(&request) {
            Ok(output) => output,
            Err(err) => format!("Shell error: {err}"),
        }
    }

    fn spawn(&self, request: &ShellRequest) -> Result<String, BridgeError> {
        let verb = request.verb().unwrap_or_default();
        let output = Command::new(verb)
            .args(request.args())
            .current_dir(&self.cwd)
            .output()
            .map_err(|err| BridgeError::io(format!("failed to execute '{verb}'"), err))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if text.ends_with('\n') {
            text.pop();
        }
        tracing::debug!(verb, status = ?output.status.code(), bytes = text.len(), "shell command finished");
        Ok(truncate_output(text, self.max_output))
    }
}

impl Tool for RestrictedShell {
    fn kind(&self) -> ToolKind {
        ToolKind::Shell
    }

    fn run(&self, input: &str) -> Result<String, BridgeError> {
        Ok(self.execute(input))
    }
}

pub(crate) fn truncate_output(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n...output truncated...");
    text
}
