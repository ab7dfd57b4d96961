//! Temporary script files for multi-line commands

use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

use crate::error::{Error, Result};

#[cfg(windows)]
const SCRIPT_SUFFIX: &str = ".bat";
#[cfg(not(windows))]
const SCRIPT_SUFFIX: &str = ".sh";

/// A command written to an executable file on disk
///
/// The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct ScriptFile {
    path: TempPath,
}

impl ScriptFile {
    /// Write `command` to a new script in `dir` (or the system temp dir)
    pub fn materialize(command: &str, dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("shell-").suffix(SCRIPT_SUFFIX);

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| Error::script_failed(format!("Failed to create script file: {}", e)))?;

        file.write_all(script_body(command).as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::script_failed(format!("Failed to write script: {}", e)))?;

        // Close the handle so the interpreter can open the file on every platform.
        let path = file.into_temp_path();
        make_executable(&path)?;

        tracing::trace!(path = %path.display(), "materialized script");
        Ok(Self { path })
    }

    /// Location of the script
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The file contents for `command`, with the interpreter preamble
pub fn script_body(command: &str) -> String {
    #[cfg(windows)]
    {
        let mut body = String::from("@echo off\r\nchcp 65001>nul\r\n");
        for line in command.lines() {
            body.push_str(line);
            body.push_str("\r\n");
        }
        body
    }

    #[cfg(not(windows))]
    {
        let mut body = String::from("#!/bin/sh\n");
        body.push_str(command);
        if !command.ends_with('\n') {
            body.push('\n');
        }
        body
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| Error::script_failed(format!("Failed to mark script executable: {}", e)))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    // The .bat extension is enough.
    Ok(())
}
