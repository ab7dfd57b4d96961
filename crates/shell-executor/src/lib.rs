//! Asynchronous shell execution for single-threaded hosts
//!
//! Commands run as child processes whose output is read on background
//! threads. The reader threads only ever push events onto a queue; the host
//! drains that queue from its own loop with [`Shell::drain`], which is where
//! lines are rebuilt, callbacks fire and requests complete.
//!
//! ```no_run
//! use shell_executor::{Shell, ShellConfig, ShellSettings};
//!
//! let shell = Shell::new(ShellConfig::default());
//! let request = shell.run_command("echo hello", ShellSettings::default())?;
//! request.on_log(|kind, line| println!("{:?}: {}", kind, line));
//!
//! // Either drain from the host loop until `request.is_completed()`,
//! // block with `wait`, or `.await` the request.
//! let result = request.wait()?;
//! assert_eq!(result.exit_code(), Some(0));
//! # Ok::<(), shell_executor::Error>(())
//! ```

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod host;
pub mod launcher;
pub mod line_buffer;
pub mod process;
pub mod queue;
pub mod reader;
pub mod request;
pub mod result;
pub mod script;
pub mod settings;
pub mod shell;
pub mod stdin;

pub use command::Command;
pub use config::{ConfigError, ShellConfig};
pub use decode::{EncodingSniffer, Utf8Sniffer};
pub use error::{Error, Result};
pub use event::{LogEvent, LogKind, RequestId};
pub use host::{AnsiColorMarkup, ColorTranslator, PlainText, ProgressSink, Prompt};
pub use launcher::command_exists;
pub use line_buffer::LineBuffer;
pub use process::WORKER_FAILURE_EXIT_CODE;
pub use request::{OUTPUT_TARGET, Request};
pub use result::ShellResult;
pub use settings::{ShellSettings, StreamEncoding};
pub use shell::{Shell, ShellBuilder};
