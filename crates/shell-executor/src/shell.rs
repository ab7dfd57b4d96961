//! The engine: launches commands and drains their events on the host thread

use futures::task::AtomicWaker;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::command::Command;
use crate::config::ShellConfig;
use crate::decode::{EncodingSniffer, Utf8Sniffer};
use crate::error::{Error, Result};
use crate::event::RequestId;
use crate::host::{ColorTranslator, PlainText, ProgressSink};
use crate::launcher;
use crate::process::ProcessControl;
use crate::queue::HandoffQueue;
use crate::reader::ReaderWorker;
use crate::request::{Request, RequestCore};
use crate::script::ScriptFile;
use crate::settings::ShellSettings;
use crate::stdin::StdinHandle;

/// Engine state shared by the [`Shell`] and every [`Request`] it returned
pub(crate) struct ShellInner {
    config: ShellConfig,
    queue: HandoffQueue,
    requests: RefCell<HashMap<RequestId, Rc<RequestCore>>>,
    progress: Option<Rc<dyn ProgressSink>>,
    colors: Box<dyn ColorTranslator>,
    sniffer: Arc<dyn EncodingSniffer>,
}

impl ShellInner {
    pub(crate) fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub(crate) fn progress(&self) -> Option<&dyn ProgressSink> {
        self.progress.as_deref()
    }

    pub(crate) fn colors(&self) -> &dyn ColorTranslator {
        self.colors.as_ref()
    }

    /// Apply the events queued when the drain starts; returns how many were applied
    ///
    /// Events are taken one at a time, so a callback that drains again
    /// continues from where this drain is instead of overtaking it.
    pub(crate) fn drain(&self) -> usize {
        let available = self.queue.len();
        let mut count = 0;

        while count < available {
            let Some(queued) = self.queue.pop() else {
                break;
            };
            count += 1;

            let core = self.requests.borrow().get(&queued.request).cloned();
            let Some(core) = core else {
                trace!(request = %queued.request, "event for finished request dropped");
                continue;
            };

            if let Err(e) = core.apply(queued.event, self) {
                error!(request = %core.id(), error = %e, "shell request failed");
            }
            if core.is_completed() {
                self.requests.borrow_mut().remove(&core.id());
            }
        }

        count
    }
}

/// Runs commands on background threads for a single-threaded host
///
/// The host calls [`Shell::drain`] once per tick. Each drain applies the output
/// and completion events reader threads have queued since the last one, fires
/// the matching request callbacks, and returns without blocking.
///
/// `Shell` and `Request` are deliberately `!Send`: all request state lives on
/// the host thread.
#[derive(Clone)]
pub struct Shell {
    inner: Rc<ShellInner>,
}

impl Shell {
    /// Create an engine with default hooks
    pub fn new(config: ShellConfig) -> Self {
        Self::builder(config).build()
    }

    /// Create a builder to plug in host hooks
    pub fn builder(config: ShellConfig) -> ShellBuilder {
        ShellBuilder {
            config,
            progress: None,
            colors: Box::new(PlainText),
            sniffer: Arc::new(Utf8Sniffer),
        }
    }

    /// The engine configuration
    pub fn config(&self) -> &ShellConfig {
        &self.inner.config
    }

    /// Run a (possibly multi-line) shell command
    ///
    /// The command is written to a temporary script, which is removed once
    /// the process exits.
    pub fn run_command(&self, command: &str, settings: ShellSettings) -> Result<Request> {
        let script = ScriptFile::materialize(command, self.inner.config.temp_dir.as_deref())?;
        let cmd = Command::for_script(&script, self.inner.config.shell.as_deref());
        self.launch(command.to_string(), cmd, Some(script), settings)
    }

    /// Run an executable directly; arguments are passed without shell quoting
    pub fn run_program<P, I, S>(&self, program: P, args: I, settings: ShellSettings) -> Result<Request>
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let cmd = Command::builder(program).args(args).build();
        self.launch(cmd.display(), cmd, None, settings)
    }

    /// Apply queued events to their requests; call once per host tick
    pub fn drain(&self) -> usize {
        self.inner.drain()
    }

    /// Number of requests that have not completed yet
    pub fn running(&self) -> usize {
        self.inner.requests.borrow().len()
    }

    /// Number of events waiting for the next drain
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    fn launch(
        &self,
        command_text: String,
        mut cmd: Command,
        script: Option<ScriptFile>,
        settings: ShellSettings,
    ) -> Result<Request> {
        let inner = &self.inner;
        launcher::configure(
            &mut cmd,
            &inner.config.default_env,
            &settings.env,
            settings.working_dir.as_deref(),
        )?;

        let mut child = launcher::spawn(&cmd)?;
        let stdin = child.stdin.take();
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::spawn_failed("Child output was not captured"));
            }
        };

        let control = Arc::new(ProcessControl::new(child));
        let id = RequestId::next();
        let waker = Arc::new(AtomicWaker::new());
        let sender = inner.queue.sender(id, waker.clone());

        let sniffer = settings.detect_encoding.then(|| inner.sniffer.clone());
        let worker = ReaderWorker::new(
            sender.clone(),
            control.clone(),
            stdout,
            stderr,
            settings.encoding,
            sniffer,
            inner.config.read_buffer_size,
            inner.config.cancel_grace(),
        )
        .with_script(script);

        if let Err(e) = worker.spawn() {
            if let Err(kill_err) = control.kill() {
                warn!(pid = control.pid(), error = %kill_err, "failed to kill orphaned process");
            }
            control.wait_for_exit(inner.config.cancel_grace());
            return Err(Error::spawn_failed(format!("Failed to start reader thread: {}", e)));
        }

        debug!(request = %id, pid = control.pid(), command = %command_text, "launched");

        let core = Rc::new(RequestCore::new(
            id,
            command_text,
            settings,
            StdinHandle::new(stdin),
            control,
            sender,
            waker,
        ));
        inner.requests.borrow_mut().insert(id, core.clone());
        core.start_progress(inner);

        Ok(Request::new(core, self.inner.clone()))
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("config", &self.inner.config)
            .field("running", &self.running())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Builder for a [`Shell`] with host hooks
pub struct ShellBuilder {
    config: ShellConfig,
    progress: Option<Rc<dyn ProgressSink>>,
    colors: Box<dyn ColorTranslator>,
    sniffer: Arc<dyn EncodingSniffer>,
}

impl ShellBuilder {
    /// Report progress of requests launched `with_progress`
    pub fn progress_sink(mut self, sink: Rc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Translate lines before they are echoed to the diagnostic log
    pub fn color_translator<T: ColorTranslator + 'static>(mut self, colors: T) -> Self {
        self.colors = Box::new(colors);
        self
    }

    /// Replace the sniffer used by requests with `detect_encoding`
    pub fn encoding_sniffer<E: EncodingSniffer + 'static>(mut self, sniffer: E) -> Self {
        self.sniffer = Arc::new(sniffer);
        self
    }

    /// Build the engine
    pub fn build(self) -> Shell {
        Shell {
            inner: Rc::new(ShellInner {
                config: self.config,
                queue: HandoffQueue::new(),
                requests: RefCell::new(HashMap::new()),
                progress: self.progress,
                colors: self.colors,
                sniffer: self.sniffer,
            }),
        }
    }
}
