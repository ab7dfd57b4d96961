//! Stdin handling for processes
//!
//! This module provides the `StdinHandle` type for writing to a process's stdin.

use std::io::Write;
use std::process::ChildStdin;

use crate::error::{Error, Result};

/// Handle for writing to a process's stdin
#[derive(Debug)]
pub struct StdinHandle {
    /// The actual stdin writer
    stdin: Option<ChildStdin>,
}

impl StdinHandle {
    /// Create a new stdin handle
    pub fn new(stdin: Option<ChildStdin>) -> Self {
        Self { stdin }
    }

    /// Write a line to stdin, adding the newline if it is missing
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::StdinClosed)?;
        let mut data = line.to_string();
        if !data.ends_with('\n') {
            data.push('\n');
        }
        stdin.write_all(data.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }

    /// Write raw bytes to stdin
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::StdinClosed)?;
        stdin.write_all(data)?;
        stdin.flush()?;
        Ok(())
    }

    /// Whether stdin can still be written
    pub fn is_open(&self) -> bool {
        self.stdin.is_some()
    }

    /// Close stdin by dropping the writer
    pub fn close(&mut self) {
        self.stdin.take();
    }
}
