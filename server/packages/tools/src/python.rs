use std::path::PathBuf;
use std::process::Command;

use ask_bridge_error::BridgeError;

use crate::registry::{Tool, ToolKind};
use crate::shell::truncate_output;

/// The `Python` tool: runs a snippet with `<interpreter> -c` inside the
/// sandbox directory and returns whatever it printed.
#[derive(Debug, Clone)]
pub struct PythonTool {
    interpreter: PathBuf,
    cwd: PathBuf,
    max_output: usize,
}

impl PythonTool {
    pub fn new(interpreter: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            cwd: cwd.into(),
            max_output: 16 * 1024,
        }
    }

    pub fn execute(&self, input: &str) -> Result<String, BridgeError> {
        let code = sanitize_code(input);
        if code.is_empty() {
            return Ok("No code provided.".to_string());
        }

        let output = Command::new(&self.interpreter)
            .arg("-c")
            .arg(code)
            .current_dir(&self.cwd)
            .output()
            .map_err(|err| {
                BridgeError::upstream(format!(
                    "Python error: failed to start {}: {err}",
                    self.interpreter.display()
                ))
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(truncate_output(text, self.max_output))
    }
}

impl Tool for PythonTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Python
    }

    fn run(&self, input: &str) -> Result<String, BridgeError> {
        self.execute(input)
    }
}

/// Drops markdown fencing the model tends to wrap code in: leading and
/// trailing backticks and whitespace, and a `python` language tag.
pub fn sanitize_code(input: &str) -> &str {
    let code = input.trim_start_matches(|c: char| c.is_whitespace() || c == '`');
    let code = match (code.get(..6), code.get(6..)) {
        (Some(tag), Some(rest))
            if tag.eq_ignore_ascii_case("python")
                && rest.chars().next().map_or(true, char::is_whitespace) =>
        {
            rest
        }
        _ => code,
    };
    code.trim_start()
        .trim_end_matches(|c: char| c.is_whitespace() || c == '`')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(sanitize_code("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(sanitize_code("  `print(2)`  "), "print(2)");
        assert_eq!(sanitize_code("Python print(3)"), "print(3)");
        assert_eq!(sanitize_code("``` ```"), "");
        assert_eq!(sanitize_code("```python"), "");
    }

    #[test]
    fn keeps_identifiers_that_start_with_python() {
        let code = "python_version = 3\nprint(python_version)";
        assert_eq!(sanitize_code(code), code);
        assert_eq!(
            sanitize_code("```python\npythonic = True\n```"),
            "pythonic = True"
        );
        assert_eq!(sanitize_code("```pythonpath = []```"), "pythonpath = []");
    }
}
