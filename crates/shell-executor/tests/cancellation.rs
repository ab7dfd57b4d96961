//! Tests for stopping running commands
#![cfg(unix)]

mod common;

use common::{quiet, record, shell, tick_until};
use shell_executor::{Error, LogKind};
use std::time::{Duration, Instant};

#[test]
fn test_cancel_long_running_command() {
    let shell = shell();
    let request = shell
        .run_command("sleep 30", quiet().with_throw_on_nonzero(false))
        .unwrap();

    let started = Instant::now();
    assert!(request.cancel());
    let result = request.wait().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.exit_code(), Some(128 + 15));
    assert!(request.is_completed());
}

#[test]
fn test_cancel_reaches_grandchildren() {
    let shell = shell();
    let request = shell
        .run_command("sleep 30 & sleep 30; wait", quiet().with_throw_on_nonzero(false))
        .unwrap();

    assert!(request.cancel());
    // The background sleep holds stdout too; completion proves it is gone.
    let done = tick_until(&shell, Duration::from_secs(10), || request.is_completed());
    assert!(done);
}

#[test]
fn test_cancel_after_completion_is_a_no_op() {
    let shell = shell();
    let request = shell.run_command("echo done", quiet()).unwrap();
    let before = request.wait().unwrap();

    assert!(request.cancel());
    assert!(request.cancel());
    assert_eq!(request.wait().unwrap(), before);
}

#[test]
fn test_cancelled_request_fails_when_throwing() {
    let shell = shell();
    let request = shell.run_command("sleep 30", quiet()).unwrap();
    request.cancel();

    let err = request.wait().unwrap_err();
    assert!(matches!(err, Error::NonZeroExit { code: 143, .. }));
}

#[test]
fn test_output_before_cancel_is_kept() {
    let shell = shell();
    let request = shell
        .run_command("echo started; sleep 30", quiet().with_throw_on_nonzero(false))
        .unwrap();
    let records = record(&request);

    let started = tick_until(&shell, Duration::from_secs(10), || {
        records.borrow().iter().any(|(_, line)| line == "started")
    });
    assert!(started);

    request.cancel();
    let result = request.wait().unwrap();
    assert_eq!(result.output(), "started\n");
    assert_eq!(
        records.borrow().iter().filter(|(kind, _)| *kind == LogKind::Info).count(),
        1
    );
}

#[test]
fn test_process_ignoring_sigterm_is_killed() {
    let shell = shell();
    let request = shell
        .run_command(
            "trap '' TERM; echo ready; while true; do sleep 1; done",
            quiet().with_throw_on_nonzero(false),
        )
        .unwrap();
    let records = record(&request);
    assert!(tick_until(&shell, Duration::from_secs(10), || {
        !records.borrow().is_empty()
    }));

    assert!(request.cancel());
    let result = request.wait().unwrap();
    assert_eq!(result.exit_code(), Some(128 + 9));
}
