#![forbid(unsafe_code)]

mod cli;
mod output;

use anyhow::{Context, Result};
use log::error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use procinfo::audit::TrailFile;
use procinfo::logging;
use procinfo::models::ProcessEvent;
use procinfo::monitor::Monitor;

fn main() -> Result<()> {
    let options = cli::parse_args()?;
    logging::init_logger(logging::level_for(options.verbosity, options.quiet_mode))?;
    let config = options.monitor_config()?;

    // Set up interrupt handling
    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone())
        .context("Failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, interrupted.clone())
        .context("Failed to register SIGTERM handler")?;

    let builder = Monitor::builder(config);
    let builder = match &options.replay {
        Some(path) => builder.source(TrailFile::open(path).context("Failed to open trail file")?),
        None => builder,
    };
    let monitor = Arc::new(
        builder
            .build()
            .context("Failed to start process monitor (the audit pipe requires root)")?,
    );

    if !options.quiet_mode && !options.json_output {
        match &options.replay {
            Some(path) => eprintln!("Replaying audit trail {}", path.display()),
            None => eprintln!("Monitoring process starts and exits. Press Ctrl+C to stop."),
        }
    }

    let queries = monitor.clone();
    let json_output = options.json_output;
    let ancestry = options.ancestry;
    let path_filter = options.path_filter;
    let subscription = monitor.subscribe(move |event: ProcessEvent| {
        if !path_filter.matches(&event.record().path) {
            return;
        }
        let ancestors = match &event {
            ProcessEvent::Started(record) if ancestry => Some(queries.ancestors_of(record.pid)),
            _ => None,
        };
        let printed = output::create_event_line(&event, ancestors.as_deref()).and_then(|line| {
            if json_output {
                output::format_event_json(&line)
            } else {
                Ok(output::format_event_human(&line))
            }
        });
        match printed {
            Ok(text) => println!("{}", text),
            Err(err) => error!("Failed to format event for pid {}: {}", event.record().pid, err),
        }
    })?;
    monitor.run().context("Failed to start ingestion")?;

    while monitor.is_running() && !interrupted.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    let result = monitor.stop();
    subscription.join();

    let diagnostics = monitor.diagnostics();
    if options.json_output {
        println!("{}", output::format_diagnostics_json(&diagnostics)?);
    } else if !options.quiet_mode {
        eprintln!("{}", output::format_diagnostics_human(&diagnostics));
    }

    result.context("Process monitoring failed")
}
