//! Process control shared between the host thread and the reader thread

use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Exit code reported when the reader thread fails before the process exits
pub const WORKER_FAILURE_EXIT_CODE: i32 = -1;

const EXIT_POLL: Duration = Duration::from_millis(10);

/// Convert an exit status into a single code
///
/// A process killed by a signal reports `128 + signal`, as shells do.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    WORKER_FAILURE_EXIT_CODE
}

/// A handle to control a running process
///
/// The reader thread reaps the process; the host thread may signal it at any
/// time. Both sides only hold the lock for a single non-blocking call.
#[derive(Debug)]
pub struct ProcessControl {
    pid: u32,
    child: Mutex<Child>,
    exited: AtomicBool,
}

impl ProcessControl {
    /// Take ownership of a spawned child
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Mutex::new(child),
            exited: AtomicBool::new(false),
        }
    }

    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process has been reaped
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    fn child(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reap the process if it has exited
    pub fn try_wait(&self) -> std::io::Result<Option<ExitStatus>> {
        let status = self.child().try_wait()?;
        if status.is_some() {
            self.exited.store(true, Ordering::Release);
        }
        Ok(status)
    }

    /// Block until the process exits
    pub fn wait(&self) -> std::io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }
            std::thread::sleep(EXIT_POLL);
        }
    }

    /// Wait up to `timeout` for the process to exit
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(pid = self.pid, error = %e, "failed to poll process");
                    return self.has_exited();
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(EXIT_POLL);
        }
    }

    /// Send SIGTERM (or equivalent) for graceful shutdown
    pub fn terminate(&self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    /// Send SIGKILL (or equivalent) to forcefully stop the process
    pub fn kill(&self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            self.child()
                .kill()
                .map_err(|e| crate::error::Error::signal_failed(-1, e.to_string()))
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::sys::signal;
        use nix::unistd::Pid;

        if self.has_exited() {
            return Ok(());
        }

        // The child leads its own group, so its pid is the group id.
        let pgid = Pid::from_raw(self.pid as i32);
        tracing::debug!(pid = self.pid, signal = %signal, "signalling process group");
        signal::killpg(pgid, signal)
            .map_err(|e| crate::error::Error::signal_failed(signal as i32, e.to_string()))
    }
}
