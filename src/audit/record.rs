//! Record assembly: one framed BSM record in, at most one lifecycle event out

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sysinfo::{Pid as SysPid, PidExt, ProcessExt, ProcessRefreshKind, System, SystemExt};

use super::token::{ExitStatus, Header, ReturnStatus, Subject, TokenError, TokenKind, Tokens};
use crate::constants::*;
use crate::models::{AuditEvent, Pid, ProcessExited, ProcessStarted};

/// Looks up the parent of a process that just exec'd.
/// Exec records do not carry a ppid, so the assembler asks the system.
pub trait ParentResolver: Send + Sync {
    fn parent_of(&self, pid: Pid) -> Option<Pid>;
}

impl<F> ParentResolver for F
where
    F: Fn(Pid) -> Option<Pid> + Send + Sync,
{
    fn parent_of(&self, pid: Pid) -> Option<Pid> {
        self(pid)
    }
}

/// Resolver used for replayed trails: live process state says nothing about
/// recorded processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoParentResolver;

impl ParentResolver for NoParentResolver {
    fn parent_of(&self, _pid: Pid) -> Option<Pid> {
        None
    }
}

/// Resolves parents from the live process list via sysinfo
pub struct SystemParentResolver {
    system: Mutex<System>,
}

impl SystemParentResolver {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemParentResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ParentResolver for SystemParentResolver {
    fn parent_of(&self, pid: Pid) -> Option<Pid> {
        let mut system = self.system.lock().ok()?;
        let sys_pid = SysPid::from_u32(pid);
        if !system.refresh_process_specifics(sys_pid, ProcessRefreshKind::new()) {
            return None;
        }
        system
            .process(sys_pid)
            .and_then(|process| process.parent())
            .map(|parent| parent.as_u32())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("record does not start with a header token")]
    MissingHeader,
    #[error("{event} record has no {token} token")]
    MissingToken {
        event: &'static str,
        token: &'static str,
    },
}

impl AssemblyError {
    /// Whether the failure came from a malformed token rather than a
    /// structurally incomplete record
    pub fn is_malformed_token(&self) -> bool {
        matches!(self, AssemblyError::Token(_))
    }
}

/// Outcome of assembling one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Event(AuditEvent),
    /// Well-formed, but not a lifecycle event we report (other event types,
    /// failed execs)
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Exec,
    Spawn,
    Exit,
}

impl Lifecycle {
    fn from_event_type(event_type: u16) -> Option<Self> {
        match event_type {
            AUE_EXEC | AUE_EXECVE => Some(Lifecycle::Exec),
            AUE_POSIX_SPAWN => Some(Lifecycle::Spawn),
            AUE_EXIT => Some(Lifecycle::Exit),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Lifecycle::Exec => "exec",
            Lifecycle::Spawn => "posix_spawn",
            Lifecycle::Exit => "exit",
        }
    }
}

#[derive(Default)]
struct Parts {
    subject: Option<Subject>,
    path: Option<String>,
    args: Option<Vec<String>>,
    child_pid: Option<Pid>,
    ret: Option<ReturnStatus>,
    exit: Option<ExitStatus>,
}

pub struct Assembler {
    parents: Arc<dyn ParentResolver>,
}

impl Assembler {
    pub fn new(parents: Arc<dyn ParentResolver>) -> Self {
        Self { parents }
    }

    /// Turn one framed record into an event
    pub fn assemble(&self, record: &[u8]) -> Result<Assembled, AssemblyError> {
        let mut tokens = Tokens::new(record);
        let header: Header = match tokens.next() {
            Some(Ok(token)) if token.kind == TokenKind::Header => token.header()?,
            Some(Err(err)) => return Err(err.into()),
            _ => return Err(AssemblyError::MissingHeader),
        };
        let lifecycle = match Lifecycle::from_event_type(header.event_type) {
            Some(lifecycle) => lifecycle,
            None => return Ok(Assembled::Filtered),
        };

        let mut parts = Parts::default();
        for token in tokens {
            let token = token?;
            match token.kind {
                TokenKind::Subject if parts.subject.is_none() => parts.subject = Some(token.subject()?),
                TokenKind::Path if parts.path.is_none() => parts.path = Some(token.path()?),
                TokenKind::ExecArgs => parts.args = Some(token.strings()?),
                TokenKind::Arg => {
                    let arg = token.arg()?;
                    if arg.text == ARG_CHILD_PID {
                        parts.child_pid = Some(arg.value as Pid);
                    }
                }
                TokenKind::ReturnStatus => parts.ret = Some(token.return_status()?),
                TokenKind::Exit => parts.exit = Some(token.exit_status()?),
                TokenKind::Trailer => break,
                _ => {}
            }
        }

        let missing = |token: &'static str| AssemblyError::MissingToken {
            event: lifecycle.name(),
            token,
        };
        let subject = parts.subject.ok_or_else(|| missing("subject"))?;

        match lifecycle {
            Lifecycle::Exec | Lifecycle::Spawn => {
                let path = parts.path.ok_or_else(|| missing("path"))?;
                let args = parts.args.ok_or_else(|| missing("exec args"))?;
                if parts.ret.map_or(false, |ret| ret.errno != 0) {
                    return Ok(Assembled::Filtered);
                }
                let (pid, ppid) = match (lifecycle, parts.child_pid) {
                    (Lifecycle::Spawn, Some(child)) => (child, subject.pid),
                    _ => (subject.pid, self.parents.parent_of(subject.pid).unwrap_or(0)),
                };
                Ok(Assembled::Event(AuditEvent::ProcessStarted(ProcessStarted {
                    pid,
                    ppid,
                    uid: subject.euid,
                    gid: subject.egid,
                    path: PathBuf::from(path),
                    args,
                    timestamp: header.timestamp,
                })))
            }
            Lifecycle::Exit => {
                let exit_code = match (parts.exit, parts.ret) {
                    (Some(exit), _) => exit.status,
                    (None, Some(ret)) => ret.value as i32,
                    (None, None) => return Err(missing("exit status")),
                };
                Ok(Assembled::Event(AuditEvent::ProcessExited(ProcessExited {
                    pid: subject.pid,
                    exit_code,
                    timestamp: header.timestamp,
                })))
            }
        }
    }
}
