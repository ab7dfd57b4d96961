//! Common test utilities

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use shell_executor::{LogKind, Request, Shell, ShellConfig, ShellSettings};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Settings that keep test output out of the diagnostic log
pub fn quiet() -> ShellSettings {
    ShellSettings::default().with_quiet(true)
}

/// A shell with a short poll interval
pub fn shell() -> Shell {
    Shell::new(ShellConfig {
        poll_interval_ms: 5,
        cancel_grace_ms: 200,
        ..ShellConfig::default()
    })
}

/// Collect every log record a request emits
pub fn record(request: &Request) -> Rc<RefCell<Vec<(LogKind, String)>>> {
    let records = Rc::new(RefCell::new(Vec::new()));
    let sink = records.clone();
    request.on_log(move |kind, text| sink.borrow_mut().push((kind, text.to_string())));
    records
}

/// Drive the host loop until `done` holds or the deadline passes
pub fn tick_until(shell: &Shell, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        shell.drain();
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
