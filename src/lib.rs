//! procinfo - macOS Process Monitoring Library
//!
//! Ingests process lifecycle events from the kernel's BSM audit pipe, keeps
//! a concurrent table of live and recently exited processes with their
//! ancestry, classifies every executable's code signature in the background
//! and fans lifecycle notifications out to subscribers.
//!
//! [`monitor::Monitor`] is the entry point.

#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod dispatch;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod signing;
pub mod table;

pub use config::MonitorConfig;
pub use diagnostics::DiagnosticsSnapshot;
pub use dispatch::{Backpressure, Subscription};
pub use models::{MonitorError, ProcessEvent, ProcessKey, ProcessRecord, SigningDescriptor, SigningState};
pub use monitor::{Monitor, MonitorBuilder};
