//! A host loop driving several commands at once
//!
//! Run with: cargo run --example host_loop [config.yaml]

use anyhow::Result;
use shell_executor::{AnsiColorMarkup, LogKind, Shell, ShellConfig, ShellSettings};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{Level, info};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let config = match std::env::args().nth(1) {
        Some(path) => ShellConfig::from_file(path)?,
        None => ShellConfig::default(),
    };
    let tick = config.poll_interval();

    let shell = Shell::builder(config)
        .color_translator(AnsiColorMarkup::new())
        .build();

    let listing = shell.run_command("ls -la", ShellSettings::default())?;
    let countdown = shell.run_command(
        "for i in 3 2 1; do echo \"\\033[32m$i\\033[0m\"; sleep 0.2; done",
        ShellSettings::default(),
    )?;
    let failing = shell.run_command(
        "echo 'about to fail' >&2; exit 2",
        ShellSettings::default().with_throw_on_nonzero(false),
    )?;

    let lines = Rc::new(Cell::new(0usize));
    for request in [&listing, &countdown, &failing] {
        let counter = lines.clone();
        request.on_log(move |kind, _| {
            if kind == LogKind::Info {
                counter.set(counter.get() + 1);
            }
        });
        let id = request.id();
        request.on_complete(move |code| info!(request = %id, code, "finished"));
    }

    let mut ticks = 0u64;
    while shell.running() > 0 {
        shell.drain();
        ticks += 1;
        std::thread::sleep(tick.max(Duration::from_millis(1)));
    }

    info!(ticks, lines = lines.get(), "all commands finished");
    info!(code = ?failing.result().exit_code(), stderr = %failing.result().error().trim_end(), "failing command");
    Ok(())
}
