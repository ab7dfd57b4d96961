//! The handle returned for every launched command

use futures::task::AtomicWaker;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::event::{LogEvent, LogKind, RequestId};
use crate::host::Prompt;
use crate::line_buffer::LineBuffer;
use crate::process::ProcessControl;
use crate::queue::EventSender;
use crate::result::ShellResult;
use crate::settings::ShellSettings;
use crate::shell::ShellInner;
use crate::stdin::StdinHandle;

/// Target for the diagnostic echo of command output
pub const OUTPUT_TARGET: &str = "shell_output";

type LogHandler = Box<dyn FnMut(LogKind, &str)>;
type CompleteHandler = Box<dyn FnOnce(i32)>;

struct RequestState {
    lines: LineBuffer,
    result: ShellResult,
    completed: bool,
    stdin: StdinHandle,
    pending_output: String,
    progress_message: String,
    progress: f32,
}

/// Request state owned by the engine
///
/// Only the drain step mutates it. Reader threads talk to it through the
/// hand-off queue and never touch it directly.
pub(crate) struct RequestCore {
    id: RequestId,
    command: String,
    settings: ShellSettings,
    state: RefCell<RequestState>,
    log_handlers: RefCell<Vec<LogHandler>>,
    complete_handlers: RefCell<Vec<CompleteHandler>>,
    awaiters: RefCell<Vec<Waker>>,
    control: Arc<ProcessControl>,
    sender: EventSender,
    waker: Arc<AtomicWaker>,
}

impl RequestCore {
    pub(crate) fn new(
        id: RequestId,
        command: String,
        settings: ShellSettings,
        stdin: StdinHandle,
        control: Arc<ProcessControl>,
        sender: EventSender,
        waker: Arc<AtomicWaker>,
    ) -> Self {
        Self {
            id,
            state: RefCell::new(RequestState {
                lines: LineBuffer::new(),
                result: ShellResult::new(command.clone()),
                completed: false,
                stdin,
                pending_output: String::new(),
                progress_message: String::new(),
                progress: 0.0,
            }),
            command,
            settings,
            log_handlers: RefCell::new(Vec::new()),
            complete_handlers: RefCell::new(Vec::new()),
            awaiters: RefCell::new(Vec::new()),
            control,
            sender,
            waker,
        }
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.state.borrow().completed
    }

    /// Show the initial progress entry
    pub(crate) fn start_progress(&self, shell: &ShellInner) {
        if !self.settings.with_progress {
            return;
        }
        if let Some(sink) = shell.progress() {
            sink.report(
                self.id,
                &self.command,
                &self.command,
                0.0,
                self.settings.progress_cancelable,
            );
        }
    }

    /// Apply one drained event
    ///
    /// Returns the nonzero-exit error when this event completed the request and
    /// the settings ask for it.
    pub(crate) fn apply(&self, event: LogEvent, shell: &ShellInner) -> Result<()> {
        if self.is_completed() {
            trace!(request = %self.id, "event after completion dropped");
            return Ok(());
        }

        match event {
            LogEvent::InfoChunk(text) | LogEvent::InputEcho(text) => {
                let (lines, pending, message) = {
                    let mut state = self.state.borrow_mut();
                    let lines = state.lines.push(&text);
                    let pending = state.lines.pending().to_string();
                    // With no partial line buffered, the last finished line is the message.
                    let message = match lines.last() {
                        Some(line) if pending.is_empty() => line.clone(),
                        _ => pending.clone(),
                    };
                    (lines, pending, message)
                };
                for line in &lines {
                    self.emit(LogKind::Info, line, shell);
                }
                self.set_pending_output(pending, message, shell);
                Ok(())
            }
            LogEvent::ErrorChunk(text) => {
                self.emit(LogKind::Error, &text, shell);
                Ok(())
            }
            LogEvent::EndOfStream(code) => {
                let rest = self.state.borrow_mut().lines.flush();
                if let Some(line) = rest {
                    self.emit(LogKind::Info, &line, shell);
                }
                self.complete(code, shell)
            }
        }
    }

    fn emit(&self, kind: LogKind, text: &str, shell: &ShellInner) {
        {
            let mut state = self.state.borrow_mut();
            match kind {
                LogKind::Info => state.result.append_line(text),
                LogKind::Error => state.result.append_error(text),
            }
        }

        // Handlers may register more handlers while running.
        let mut handlers = std::mem::take(&mut *self.log_handlers.borrow_mut());
        for handler in handlers.iter_mut() {
            handler(kind, text);
        }
        {
            let mut slot = self.log_handlers.borrow_mut();
            handlers.append(&mut *slot);
            *slot = handlers;
        }

        if self.settings.quiet {
            return;
        }
        let display = shell.colors().translate(text);
        match kind {
            LogKind::Info => {
                for line in display.split('\n') {
                    info!(target: OUTPUT_TARGET, request = %self.id, "{}", line);
                }
            }
            LogKind::Error => {
                for line in display.trim_end_matches('\n').split('\n') {
                    error!(target: OUTPUT_TARGET, request = %self.id, "{}", line);
                }
            }
        }
    }

    fn set_pending_output(&self, pending: String, message: String, shell: &ShellInner) {
        let progress = {
            let mut state = self.state.borrow_mut();
            state.pending_output = pending;
            if state.progress_message == message {
                return;
            }
            state.progress += (1.0 - state.progress) * 0.1;
            state.progress_message = message.clone();
            state.progress
        };

        if !self.settings.with_progress {
            return;
        }
        let Some(sink) = shell.progress() else {
            return;
        };
        let cancelable = self.settings.progress_cancelable;
        let cancel_requested = sink.report(self.id, &self.command, &message, progress, cancelable);
        if cancel_requested && cancelable {
            debug!(request = %self.id, "cancel requested from progress");
            self.cancel(shell);
        }
    }

    fn complete(&self, code: i32, shell: &ShellInner) -> Result<()> {
        let result = {
            let mut state = self.state.borrow_mut();
            if state.completed {
                return Ok(());
            }
            state.completed = true;
            state.result.freeze(code);
            state.stdin.close();
            state.result.clone()
        };

        if self.settings.with_progress {
            if let Some(sink) = shell.progress() {
                sink.remove(self.id);
                if self.settings.auto_clear_progress {
                    sink.clear();
                }
            }
        }

        if !self.settings.quiet && code != 0 {
            error!(
                target: OUTPUT_TARGET,
                request = %self.id,
                "{} exit with code {}",
                self.command,
                code
            );
        }

        let handlers = std::mem::take(&mut *self.complete_handlers.borrow_mut());
        for handler in handlers {
            handler(code);
        }
        // No more records can arrive; release anything the handlers captured.
        self.log_handlers.borrow_mut().clear();
        let awaiters = std::mem::take(&mut *self.awaiters.borrow_mut());
        for waker in awaiters {
            waker.wake();
        }
        self.waker.wake();

        debug!(request = %self.id, code, "request completed");
        match self.failure(&result) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn failure(&self, result: &ShellResult) -> Option<Error> {
        match result.exit_code() {
            Some(code) if code != 0 && self.settings.throw_on_nonzero => Some(Error::NonZeroExit {
                command: self.command.clone(),
                code,
                stderr: result.error().to_string(),
            }),
            _ => None,
        }
    }

    /// Remember a task awaiting this request; every one is woken on completion
    fn add_awaiter(&self, waker: &Waker) {
        let mut awaiters = self.awaiters.borrow_mut();
        if !awaiters.iter().any(|w| w.will_wake(waker)) {
            awaiters.push(waker.clone());
        }
    }

    /// The final outcome, once completed
    fn outcome(&self) -> Option<Result<ShellResult>> {
        let state = self.state.borrow();
        if !state.completed {
            return None;
        }
        Some(match self.failure(&state.result) {
            Some(err) => Err(err),
            None => Ok(state.result.clone()),
        })
    }

    fn cancel(&self, shell: &ShellInner) -> bool {
        if self.is_completed() {
            return true;
        }

        let control = &self.control;
        if control.has_exited() || matches!(control.try_wait(), Ok(Some(_))) {
            // The reader thread delivers the end of stream.
            return true;
        }

        let grace = shell.config().cancel_grace();
        match control.terminate() {
            Ok(()) => {
                if control.wait_for_exit(grace) {
                    debug!(request = %self.id, "process terminated");
                    return true;
                }
            }
            Err(e) => warn!(request = %self.id, error = %e, "graceful close failed"),
        }

        match control.kill() {
            Ok(()) => {
                let exited = control.wait_for_exit(grace);
                if !exited {
                    warn!(request = %self.id, "process still running after kill");
                }
                exited
            }
            Err(e) => {
                warn!(request = %self.id, error = %e, "kill failed");
                control.has_exited()
            }
        }
    }
}

/// A launched command
///
/// The handle is returned as soon as the process starts. Its state advances
/// only when the owning [`crate::Shell`] drains its queue, which happens on the
/// host's tick, inside [`Request::wait`], or while the request is awaited.
///
/// Awaiting a request resolves to the frozen [`ShellResult`], or to
/// [`Error::NonZeroExit`] when the process failed and `throw_on_nonzero` is set.
#[derive(Clone)]
pub struct Request {
    core: Rc<RequestCore>,
    shell: Rc<ShellInner>,
}

impl Request {
    pub(crate) fn new(core: Rc<RequestCore>, shell: Rc<ShellInner>) -> Self {
        Self { core, shell }
    }

    /// Identity of this request
    pub fn id(&self) -> RequestId {
        self.core.id
    }

    /// The command text as given to the engine
    pub fn command(&self) -> &str {
        &self.core.command
    }

    /// Settings the request was launched with
    pub fn settings(&self) -> &ShellSettings {
        &self.core.settings
    }

    /// Process id of the child
    pub fn pid(&self) -> u32 {
        self.core.control.pid()
    }

    /// Whether the end of stream has been drained
    pub fn is_completed(&self) -> bool {
        self.core.is_completed()
    }

    /// The unterminated stdout line received so far
    pub fn pending_output(&self) -> String {
        self.core.state.borrow().pending_output.clone()
    }

    /// Snapshot of the result; text is partial until completion
    pub fn result(&self) -> ShellResult {
        self.core.state.borrow().result.clone()
    }

    /// Call `handler` for every log record: complete stdout lines and stderr chunks
    pub fn on_log<F>(&self, handler: F)
    where
        F: FnMut(LogKind, &str) + 'static,
    {
        self.core.log_handlers.borrow_mut().push(Box::new(handler));
    }

    /// Call `handler` with the exit code once the request completes
    ///
    /// If the request already completed, `handler` runs immediately.
    pub fn on_complete<F>(&self, handler: F)
    where
        F: FnOnce(i32) + 'static,
    {
        let code = {
            let state = self.core.state.borrow();
            if state.completed { state.result.exit_code() } else { None }
        };
        match code {
            Some(code) => handler(code),
            None => self.core.complete_handlers.borrow_mut().push(Box::new(handler)),
        }
    }

    /// Write a line to the child's stdin and echo it into the output
    pub fn input(&self, text: &str) -> Result<()> {
        if self.is_completed() {
            return Err(Error::StdinClosed);
        }
        self.core.state.borrow_mut().stdin.write_line(text)?;

        let mut echo = text.to_string();
        if !echo.ends_with('\n') {
            echo.push('\n');
        }
        self.core.sender.send(LogEvent::InputEcho(echo));
        Ok(())
    }

    /// Ask the user for input through `prompt`, showing the pending output
    pub fn prompt_input(&self, prompt: &dyn Prompt) {
        let request = self.clone();
        let text = self.pending_output();
        prompt.show(
            &text,
            Box::new(move |answer| {
                if let Err(e) = request.input(&answer) {
                    warn!(request = %request.id(), error = %e, "failed to forward prompt input");
                }
            }),
        );
    }

    /// Stop the process: a graceful close first, then a forced kill
    ///
    /// Returns whether the process is confirmed gone. The request still
    /// completes through its end of stream on a later drain. Calling this after
    /// completion does nothing and returns true.
    pub fn cancel(&self) -> bool {
        self.core.cancel(&self.shell)
    }

    /// Drain until completion, sleeping between drains
    pub fn wait(&self) -> Result<ShellResult> {
        let interval = self.shell.config().poll_interval();
        loop {
            if let Some(outcome) = self.core.outcome() {
                return outcome;
            }
            self.shell.drain();
            if let Some(outcome) = self.core.outcome() {
                return outcome;
            }
            std::thread::sleep(interval);
        }
    }

    /// The outcome if completed, without draining
    pub fn try_result(&self) -> Option<Result<ShellResult>> {
        self.core.outcome()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.core.id)
            .field("command", &self.core.command)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl Future for Request {
    type Output = Result<ShellResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.core.outcome() {
            return Poll::Ready(outcome);
        }

        // Register before draining so an event pushed in between still wakes us.
        // Reader threads wake only the latest task; completion wakes them all.
        self.core.waker.register(cx.waker());
        self.core.add_awaiter(cx.waker());
        self.shell.drain();

        match self.core.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}
