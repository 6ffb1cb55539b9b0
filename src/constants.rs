//! Global constants for procinfo
//!
//! Centralized location for device paths, audit classes, BSM token
//! identifiers and pipeline defaults.

/// Application subsystem identifier for macOS Unified Logging System
pub const APP_SUBSYSTEM: &str = "com.objective-see.procinfo";

/// Kernel audit pipe device
pub const AUDIT_PIPE: &str = "/dev/auditpipe";

/// Audit class for process lifecycle events (`pc`)
pub const AUDIT_CLASS_PROCESS: u32 = 0x0000_0080;

/// Audit class for exec events (`ex`)
pub const AUDIT_CLASS_EXEC: u32 = 0x4000_0000;

/// Default preselection mask: process lifecycle and exec classes only
pub const DEFAULT_CLASS_MASK: u32 = AUDIT_CLASS_PROCESS | AUDIT_CLASS_EXEC;

//
// BSM token identifiers (see OpenBSM audit_record.h)
//

pub const AUT_TRAILER: u8 = 0x13;
pub const AUT_HEADER32: u8 = 0x14;
pub const AUT_HEADER32_EX: u8 = 0x15;
pub const AUT_OPAQUE: u8 = 0x21;
pub const AUT_PATH: u8 = 0x23;
pub const AUT_SUBJECT32: u8 = 0x24;
pub const AUT_PROCESS32: u8 = 0x26;
pub const AUT_RETURN32: u8 = 0x27;
pub const AUT_TEXT: u8 = 0x28;
pub const AUT_ARG32: u8 = 0x2d;
pub const AUT_ATTR: u8 = 0x31;
pub const AUT_EXEC_ARGS: u8 = 0x3c;
pub const AUT_EXEC_ENV: u8 = 0x3d;
pub const AUT_ATTR32: u8 = 0x3e;
pub const AUT_EXIT: u8 = 0x52;
pub const AUT_ARG64: u8 = 0x71;
pub const AUT_RETURN64: u8 = 0x72;
pub const AUT_ATTR64: u8 = 0x73;
pub const AUT_HEADER64: u8 = 0x74;
pub const AUT_SUBJECT64: u8 = 0x75;
pub const AUT_PROCESS64: u8 = 0x77;
pub const AUT_HEADER64_EX: u8 = 0x79;
pub const AUT_SUBJECT32_EX: u8 = 0x7a;
pub const AUT_PROCESS32_EX: u8 = 0x7b;
pub const AUT_PROCESS64_EX: u8 = 0x7c;
pub const AUT_SUBJECT64_EX: u8 = 0x7d;

/// Magic number carried by every trailer token
pub const TRAILER_MAGIC: u16 = 0xb105;

/// BSM record format version written by the macOS kernel
pub const AUDIT_HEADER_VERSION: u8 = 11;

/// Address types used by the `_ex` token variants
pub const AU_IPV4: u32 = 4;
pub const AU_IPV6: u32 = 16;

//
// Audit event identifiers (see OpenBSM audit_kevents.h)
//

pub const AUE_EXIT: u16 = 1;
pub const AUE_FORK: u16 = 2;
pub const AUE_EXEC: u16 = 7;
pub const AUE_EXECVE: u16 = 23;
pub const AUE_VFORK: u16 = 25;
pub const AUE_POSIX_SPAWN: u16 = 43190;

/// Text of the argument token naming the spawned child in posix_spawn records
pub const ARG_CHILD_PID: &str = "child PID";

/// Smallest well-formed record: a 32-bit header followed by a trailer
pub const MIN_RECORD_SIZE: usize = 18 + 7;

/// Largest record the kernel will emit
pub const MAX_RECORD_SIZE: usize = 0x10000;

/// Hard cap on ancestry walks; ppid values come from the kernel and are not trusted
pub const MAX_ANCESTRY_DEPTH: usize = 128;

//
// Pipeline defaults
//

/// Default retention of exited records, in seconds
pub const DEFAULT_GRACE_PERIOD_SECS: f64 = 30.0;

/// Default table capacity before oldest-exited eviction kicks in
pub const DEFAULT_TABLE_CAPACITY: usize = 16_384;

/// Default number of classification workers
pub const DEFAULT_CLASSIFIER_WORKERS: usize = 4;

/// Default number of queued plus running classifications
pub const DEFAULT_CLASSIFIER_QUEUE_LIMIT: usize = 1_024;

/// Default number of cached signing descriptors
pub const DEFAULT_SIGNING_CACHE_CAPACITY: usize = 4_096;

/// Default bounded queue length per subscriber
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 1_024;

/// Default reader wake-up interval, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default bound on draining classification work at shutdown, in milliseconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

/// Size of a single device read
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reason recorded when the classification queue is full
pub const CLASSIFICATION_SATURATED: &str = "classification queue saturated";

/// Config file name inside the user config directory
pub const CONFIG_FILE_NAME: &str = "procinfo.toml";

/// Event type identifiers used in JSON output
pub const EVENT_PROCESS_STARTED: &str = "process_started";
pub const EVENT_PROCESS_EXITED: &str = "process_exited";
