//! Logging setup
//!
//! Routes the `log` facade to macOS Unified Logging under the
//! `com.objective-see.procinfo` subsystem. Other platforms log to stderr.

use anyhow::{anyhow, Result};
use log::LevelFilter;
use serde_json::json;

use crate::models::ProcessEvent;

/// Install the process-wide logger. Call once, before starting a monitor.
pub fn init_logger(level: LevelFilter) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        let logger = oslog::OsLogger::new(crate::constants::APP_SUBSYSTEM);
        log::set_boxed_logger(Box::new(logger)).map_err(|e| anyhow!("Failed to set logger: {}", e))?;
    }

    #[cfg(not(target_os = "macos"))]
    {
        env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .try_init()
            .map_err(|e| anyhow!("Failed to set logger: {}", e))?;
    }

    log::set_max_level(level);
    Ok(())
}

/// Verbosity from repeated `-v` flags
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Structured debug record of one lifecycle transition
pub fn log_event(event: &ProcessEvent) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let record = event.record();
    let (kind, exit_code) = match event {
        ProcessEvent::Started(_) => (crate::constants::EVENT_PROCESS_STARTED, None),
        ProcessEvent::Exited(r) => (crate::constants::EVENT_PROCESS_EXITED, r.exit_code),
    };
    let message = json!({
        "event": kind,
        "pid": record.pid,
        "ppid": record.ppid,
        "path": record.path.display().to_string(),
        "exit_code": exit_code,
        "start_time": record.start_time.to_rfc3339(),
    });
    log::debug!("{}", message);
}
