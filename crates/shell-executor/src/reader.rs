//! Background thread that pumps a child's output into the hand-off queue

use std::io::{ErrorKind, Read};
use std::process::{ChildStderr, ChildStdout};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::decode::{EncodingSniffer, StreamDecoder};
use crate::event::LogEvent;
use crate::process::{ProcessControl, WORKER_FAILURE_EXIT_CODE, exit_code};
use crate::queue::EventSender;
use crate::script::ScriptFile;
use crate::settings::StreamEncoding;

/// Reads one process to completion
///
/// stdout becomes `InfoChunk` events and stderr becomes `ErrorChunk` events.
/// stderr is drained on a scoped helper thread so neither pipe can fill up
/// while the other is being read. After both close and the process is reaped,
/// exactly one `EndOfStream` is sent, even when reading fails.
pub struct ReaderWorker {
    sender: EventSender,
    control: Arc<ProcessControl>,
    stdout: ChildStdout,
    stderr: ChildStderr,
    encoding: StreamEncoding,
    sniffer: Option<Arc<dyn EncodingSniffer>>,
    buffer_size: usize,
    cancel_grace: Duration,
    script: Option<ScriptFile>,
}

impl ReaderWorker {
    /// Create a worker for a spawned process
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: EventSender,
        control: Arc<ProcessControl>,
        stdout: ChildStdout,
        stderr: ChildStderr,
        encoding: StreamEncoding,
        sniffer: Option<Arc<dyn EncodingSniffer>>,
        buffer_size: usize,
        cancel_grace: Duration,
    ) -> Self {
        Self {
            sender,
            control,
            stdout,
            stderr,
            encoding,
            sniffer,
            buffer_size,
            cancel_grace,
            script: None,
        }
    }

    /// Keep a materialized script alive until the process has exited
    pub fn with_script(mut self, script: Option<ScriptFile>) -> Self {
        self.script = script;
        self
    }

    /// Start the worker on its own thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("shell-reader-{}", self.sender.request()))
            .spawn(move || self.run())
    }

    fn run(self) {
        let ReaderWorker {
            sender,
            control,
            stdout,
            stderr,
            encoding,
            sniffer,
            buffer_size,
            cancel_grace,
            script,
        } = self;
        let request = sender.request();

        let streams = thread::scope(|scope| {
            let err_sender = sender.clone();
            let err_sniffer = sniffer.clone();
            let stderr_reader = scope.spawn(move || {
                pump(
                    stderr,
                    StreamDecoder::new(encoding, err_sniffer),
                    buffer_size,
                    &err_sender,
                    LogEvent::ErrorChunk,
                )
            });

            let stdout_result = pump(
                stdout,
                StreamDecoder::new(encoding, sniffer),
                buffer_size,
                &sender,
                LogEvent::InfoChunk,
            );
            let stderr_result = stderr_reader
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stderr reader panicked")));

            stdout_result.and(stderr_result)
        });

        let code = match streams.and_then(|()| control.wait()) {
            Ok(status) => {
                let code = exit_code(&status);
                debug!(request = %request, pid = control.pid(), code, "process exited");
                code
            }
            Err(e) => {
                error!(request = %request, pid = control.pid(), error = %e, "shell execute fail");
                sender.send(LogEvent::ErrorChunk(format!("shell execute fail: {}\n", e)));
                release(&control, cancel_grace);
                WORKER_FAILURE_EXIT_CODE
            }
        };

        // The script is gone by the time anyone can observe completion.
        drop(script);
        sender.send(LogEvent::EndOfStream(code));
    }
}

/// Stop a process whose output can no longer be read
fn release(control: &ProcessControl, grace: Duration) {
    if control.has_exited() {
        return;
    }
    if let Err(e) = control.kill() {
        warn!(pid = control.pid(), error = %e, "failed to kill process after read failure");
    }
    if !control.wait_for_exit(grace) {
        warn!(pid = control.pid(), "process did not exit after kill");
    }
}

/// Read `reader` to end of stream, sending each decoded chunk
fn pump(
    mut reader: impl Read,
    mut decoder: StreamDecoder,
    buffer_size: usize,
    sender: &EventSender,
    wrap: fn(String) -> LogEvent,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let text = decoder.decode(&buf[..n]);
        if !text.is_empty() {
            sender.send(wrap(text));
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        sender.send(wrap(rest));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RequestId;
    use crate::queue::HandoffQueue;
    use futures::task::AtomicWaker;

    struct Chunked<'a> {
        data: &'a [u8],
        size: usize,
    }

    impl Read for Chunked<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.size.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("pipe broke"))
        }
    }

    #[test]
    fn test_pump_never_splits_characters() {
        let queue = HandoffQueue::new();
        let sender = queue.sender(RequestId::next(), Arc::new(AtomicWaker::new()));
        let text = "añb€c𝄞\n";

        pump(
            Chunked { data: text.as_bytes(), size: 1 },
            StreamDecoder::new(StreamEncoding::Utf8, None),
            4,
            &sender,
            LogEvent::InfoChunk,
        )
        .unwrap();

        let mut joined = String::new();
        for event in queue.take_batch() {
            match event.event {
                LogEvent::InfoChunk(chunk) => {
                    assert!(!chunk.contains('\u{FFFD}'));
                    joined.push_str(&chunk);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(joined, text);
    }

    #[test]
    fn test_pump_reports_read_errors() {
        let queue = HandoffQueue::new();
        let sender = queue.sender(RequestId::next(), Arc::new(AtomicWaker::new()));
        let result = pump(
            Failing,
            StreamDecoder::new(StreamEncoding::Utf8, None),
            16,
            &sender,
            LogEvent::ErrorChunk,
        );
        assert!(result.is_err());
        assert!(queue.is_empty());
    }
}
