//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Configuration file and device overrides
//! - Trail replay instead of the live audit pipe
//! - Path filtering of printed events
//! - Output format selection (human/JSON)
//! - Verbosity and quiet modes

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};

use procinfo::config::MonitorConfig;

use crate::output::PathFilter;

/// Parsed command line
#[derive(Debug)]
pub struct CliOptions {
    pub config_path: Option<PathBuf>,
    pub device: Option<PathBuf>,
    pub replay: Option<PathBuf>,
    pub json_output: bool,
    pub quiet_mode: bool,
    pub seed: bool,
    pub ancestry: bool,
    pub path_filter: PathFilter,
    pub verbosity: u8,
}

pub fn command() -> Command {
    Command::new("procinfo")
        .version(env!("PROCINFO_VERSION"))
        .long_version(concat!(env!("PROCINFO_VERSION"), " (", env!("GIT_HASH"), ")"))
        .about("Monitor process starts and exits on macOS")
        .long_about(
            "Reads process lifecycle events from the kernel audit pipe, keeps a live process tree \
             and classifies each executable's code signature. Requires root for the live device.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: procinfo.toml in the user config directory)"),
        )
        .arg(
            Arg::new("device")
                .long("device")
                .value_name("PATH")
                .help("Audit pipe device to read")
                .conflicts_with("replay"),
        )
        .arg(
            Arg::new("replay")
                .short('r')
                .long("replay")
                .value_name("FILE")
                .help("Replay a recorded audit trail instead of the live device"),
        )
        .arg(
            Arg::new("path-filter")
                .short('p')
                .long("path-filter")
                .value_name("GLOB")
                .help("Only print processes whose path matches (prefix or glob pattern)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("ancestry")
                .short('a')
                .long("ancestry")
                .help("Include the ancestor chain of started processes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Seed the process table with already-running processes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Output events as JSON lines")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress the banner and the diagnostics summary")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (repeatable)")
                .action(ArgAction::Count),
        )
}

/// Parse command line arguments and return options
pub fn parse_args() -> Result<CliOptions> {
    options_from(&command().get_matches())
}

fn options_from(matches: &ArgMatches) -> Result<CliOptions> {
    let replay = matches.get_one::<String>("replay").map(PathBuf::from);
    if let Some(path) = &replay {
        if !path.is_file() {
            return Err(anyhow!("Trail file does not exist: {}", path.display()));
        }
    }

    let filters: Vec<String> = matches
        .get_many::<String>("path-filter")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    Ok(CliOptions {
        config_path: matches.get_one::<String>("config").map(PathBuf::from),
        device: matches.get_one::<String>("device").map(PathBuf::from),
        replay,
        json_output: matches.get_flag("json"),
        quiet_mode: matches.get_flag("quiet"),
        seed: matches.get_flag("seed"),
        ancestry: matches.get_flag("ancestry"),
        path_filter: PathFilter::new(&filters)?,
        verbosity: matches.get_count("verbose"),
    })
}

impl CliOptions {
    /// File configuration with command-line overrides applied
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config_path {
            Some(path) => load_config(path)?,
            None => MonitorConfig::load_default().context("Failed to load default configuration")?,
        };
        if let Some(device) = &self.device {
            config.audit.device = device.clone();
        }
        if self.seed {
            config.audit.seed_running_processes = true;
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<MonitorConfig> {
    MonitorConfig::load_from_file(path).with_context(|| format!("Invalid configuration file {}", path.display()))
}
