//! Per-request settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Text encoding the child writes to its stdout and stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEncoding {
    /// UTF-8
    #[default]
    Utf8,
    /// Little-endian UTF-16, as written by `cmd.exe /u`
    Utf16le,
}

/// Options for a single command run
///
/// Every option toggles independently. The defaults run in the current
/// directory, echo every line to the diagnostic log and fail the request when
/// the process exits with a nonzero code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    /// Working directory of the process; `None` means the current directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Environment overrides merged over the inherited environment.
    /// A `PATH` entry is prepended to the inherited search path.
    pub env: HashMap<String, String>,

    /// Suppress the diagnostic echo of each line
    pub quiet: bool,

    /// Turn a nonzero exit code into an error on completion
    pub throw_on_nonzero: bool,

    /// Report progress to the host's progress sink
    pub with_progress: bool,

    /// Let the progress sink cancel the request
    pub progress_cancelable: bool,

    /// Clear the host's progress bar on completion
    pub auto_clear_progress: bool,

    /// Encoding of the child's output streams
    pub encoding: StreamEncoding,

    /// Ask the encoding sniffer whether UTF-16 output is really UTF-8
    pub detect_encoding: bool,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: HashMap::new(),
            quiet: false,
            throw_on_nonzero: true,
            with_progress: false,
            progress_cancelable: false,
            auto_clear_progress: true,
            encoding: StreamEncoding::Utf8,
            detect_encoding: false,
        }
    }
}

impl ShellSettings {
    /// Set the working directory
    pub fn with_working_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment override
    pub fn with_env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env.insert(key.into(), val.into());
        self
    }

    /// Set whether lines are echoed to the diagnostic log
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Set whether a nonzero exit code is an error
    pub fn with_throw_on_nonzero(mut self, throw: bool) -> Self {
        self.throw_on_nonzero = throw;
        self
    }

    /// Enable progress reporting, optionally cancelable from the progress sink
    pub fn with_progress(mut self, cancelable: bool) -> Self {
        self.with_progress = true;
        self.progress_cancelable = cancelable;
        self
    }

    /// Set whether the progress bar is cleared on completion
    pub fn with_auto_clear_progress(mut self, clear: bool) -> Self {
        self.auto_clear_progress = clear;
        self
    }

    /// Set the output encoding
    pub fn with_encoding(mut self, encoding: StreamEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Enable the encoding sniffer for UTF-16 output
    pub fn with_detect_encoding(mut self, detect: bool) -> Self {
        self.detect_encoding = detect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ShellSettings::default();
        assert!(settings.throw_on_nonzero);
        assert!(!settings.quiet);
        assert!(!settings.with_progress);
        assert!(settings.auto_clear_progress);
        assert_eq!(settings.encoding, StreamEncoding::Utf8);
        assert!(settings.working_dir.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings: ShellSettings = serde_yaml::from_str(
            r#"
quiet: true
env:
  FOO: bar
encoding: utf16le
"#,
        )
        .unwrap();

        assert!(settings.quiet);
        assert!(settings.throw_on_nonzero);
        assert_eq!(settings.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(settings.encoding, StreamEncoding::Utf16le);
    }

    #[test]
    fn test_builder_methods() {
        let settings = ShellSettings::default()
            .with_working_dir("/tmp")
            .with_env("A", "1")
            .with_quiet(true)
            .with_throw_on_nonzero(false)
            .with_progress(true);

        assert_eq!(settings.working_dir.as_deref(), Some(Path::new("/tmp")));
        assert_eq!(settings.env.len(), 1);
        assert!(settings.quiet);
        assert!(!settings.throw_on_nonzero);
        assert!(settings.with_progress);
        assert!(settings.progress_cancelable);
    }
}
