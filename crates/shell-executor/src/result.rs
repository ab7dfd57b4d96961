//! Accumulated output of a request

use serde::Serialize;

/// Output, error text and exit code of a command
///
/// Text accumulates while the command runs; reading it early yields what has
/// arrived so far. Once the exit code is set the record is frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellResult {
    command: String,
    exit_code: Option<i32>,
    output: String,
    error: String,
}

impl ShellResult {
    pub(crate) fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_code: None,
            output: String::new(),
            error: String::new(),
        }
    }

    /// The command text that was run
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Exit code, once the process has completed
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether the command completed with exit code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Every complete stdout line, each followed by `\n`
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Everything written to stderr
    pub fn error(&self) -> &str {
        &self.error
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.exit_code.is_some()
    }

    pub(crate) fn append_line(&mut self, line: &str) {
        if self.is_frozen() {
            return;
        }
        self.output.push_str(line);
        self.output.push('\n');
    }

    pub(crate) fn append_error(&mut self, chunk: &str) {
        if self.is_frozen() {
            return;
        }
        self.error.push_str(chunk);
    }

    pub(crate) fn freeze(&mut self, exit_code: i32) {
        if !self.is_frozen() {
            self.exit_code = Some(exit_code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_result_ignores_appends() {
        let mut result = ShellResult::new("echo hi");
        result.append_line("hi");
        result.append_error("warn\n");
        assert_eq!(result.exit_code(), None);

        result.freeze(0);
        result.append_line("late");
        result.append_error("late");
        result.freeze(3);

        assert_eq!(result.output(), "hi\n");
        assert_eq!(result.error(), "warn\n");
        assert_eq!(result.exit_code(), Some(0));
        assert!(result.success());
        assert_eq!(result.command(), "echo hi");
    }
}
