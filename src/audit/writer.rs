//! Synthetic BSM record writer
//!
//! Produces byte-exact records in the kernel's layout. Used to build replay
//! trails and test streams without an audit device.

use bytes::BufMut;

use crate::constants::*;
use crate::models::{Pid, Timestamp};

/// Builder for a single audit record. Tokens are appended in call order;
/// [`RecordWriter::finish`] wraps them in a header and trailer.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    event_type: u16,
    timestamp: Timestamp,
    body: Vec<u8>,
}

impl RecordWriter {
    pub fn new(event_type: u16, timestamp: Timestamp) -> Self {
        Self {
            event_type,
            timestamp,
            body: Vec::new(),
        }
    }

    fn subject_ids(&mut self, tag: u8, euid: u32, egid: u32, pid: Pid) {
        self.body.put_u8(tag);
        self.body.put_u32(euid); // audit uid
        self.body.put_u32(euid);
        self.body.put_u32(egid);
        self.body.put_u32(euid);
        self.body.put_u32(egid);
        self.body.put_u32(pid);
        self.body.put_u32(pid); // session id
    }

    pub fn subject32(mut self, euid: u32, egid: u32, pid: Pid) -> Self {
        self.subject_ids(AUT_SUBJECT32, euid, egid, pid);
        self.body.put_u32(0);
        self.body.put_u32(0);
        self
    }

    pub fn subject64(mut self, euid: u32, egid: u32, pid: Pid) -> Self {
        self.subject_ids(AUT_SUBJECT64, euid, egid, pid);
        self.body.put_u64(0);
        self.body.put_u32(0);
        self
    }

    /// Extended 32-bit subject with an IPv6 terminal address
    pub fn subject32_ex(mut self, euid: u32, egid: u32, pid: Pid) -> Self {
        self.subject_ids(AUT_SUBJECT32_EX, euid, egid, pid);
        self.body.put_u32(0);
        self.body.put_u32(AU_IPV6);
        self.body.put_slice(&[0u8; 16]);
        self
    }

    fn counted_string(&mut self, tag: u8, value: &str) {
        self.body.put_u8(tag);
        self.body.put_u16(value.len() as u16 + 1);
        self.body.put_slice(value.as_bytes());
        self.body.put_u8(0);
    }

    pub fn path(mut self, path: &str) -> Self {
        self.counted_string(AUT_PATH, path);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.counted_string(AUT_TEXT, text);
        self
    }

    pub fn exec_args(mut self, args: &[&str]) -> Self {
        self.body.put_u8(AUT_EXEC_ARGS);
        self.body.put_u32(args.len() as u32);
        for arg in args {
            self.body.put_slice(arg.as_bytes());
            self.body.put_u8(0);
        }
        self
    }

    pub fn arg32(mut self, number: u8, value: u32, text: &str) -> Self {
        self.body.put_u8(AUT_ARG32);
        self.body.put_u8(number);
        self.body.put_u32(value);
        self.body.put_u16(text.len() as u16 + 1);
        self.body.put_slice(text.as_bytes());
        self.body.put_u8(0);
        self
    }

    pub fn return32(mut self, errno: u8, value: u32) -> Self {
        self.body.put_u8(AUT_RETURN32);
        self.body.put_u8(errno);
        self.body.put_u32(value);
        self
    }

    pub fn exit(mut self, status: i32, value: i32) -> Self {
        self.body.put_u8(AUT_EXIT);
        self.body.put_i32(status);
        self.body.put_i32(value);
        self
    }

    /// Token in the generic `tag, u16 length, payload` layout
    pub fn raw_token(mut self, tag: u8, payload: &[u8]) -> Self {
        self.body.put_u8(tag);
        self.body.put_u16(payload.len() as u16);
        self.body.put_slice(payload);
        self
    }

    fn seal(self, header_len: usize, put_time: impl FnOnce(&mut Vec<u8>, &Timestamp)) -> Vec<u8> {
        let tag = if header_len == 18 { AUT_HEADER32 } else { AUT_HEADER64 };
        let size = header_len + self.body.len() + 7;
        let mut record = Vec::with_capacity(size);
        record.put_u8(tag);
        record.put_u32(size as u32);
        record.put_u8(AUDIT_HEADER_VERSION);
        record.put_u16(self.event_type);
        record.put_u16(0);
        put_time(&mut record, &self.timestamp);
        record.put_slice(&self.body);
        record.put_u8(AUT_TRAILER);
        record.put_u16(TRAILER_MAGIC);
        record.put_u32(size as u32);
        record
    }

    /// Record with a 32-bit header
    pub fn finish(self) -> Vec<u8> {
        self.seal(18, |buf, ts| {
            buf.put_u32(ts.timestamp() as u32);
            buf.put_u32(ts.timestamp_subsec_millis());
        })
    }

    /// Record with a 64-bit header
    pub fn finish64(self) -> Vec<u8> {
        self.seal(26, |buf, ts| {
            buf.put_u64(ts.timestamp() as u64);
            buf.put_u64(ts.timestamp_subsec_millis() as u64);
        })
    }
}

/// Successful execve of `path` by `pid`
pub fn exec_record(pid: Pid, path: &str, args: &[&str], timestamp: Timestamp) -> Vec<u8> {
    RecordWriter::new(AUE_EXECVE, timestamp)
        .subject32(501, 20, pid)
        .path(path)
        .exec_args(args)
        .return32(0, 0)
        .finish()
}

/// posix_spawn of `child` by `parent`
pub fn spawn_record(parent: Pid, child: Pid, path: &str, args: &[&str], timestamp: Timestamp) -> Vec<u8> {
    RecordWriter::new(AUE_POSIX_SPAWN, timestamp)
        .arg32(0, child, ARG_CHILD_PID)
        .subject32(501, 20, parent)
        .path(path)
        .exec_args(args)
        .return32(0, 0)
        .finish()
}

/// Exit of `pid` with `code`
pub fn exit_record(pid: Pid, code: i32, timestamp: Timestamp) -> Vec<u8> {
    RecordWriter::new(AUE_EXIT, timestamp)
        .subject32(501, 20, pid)
        .exit(code, 0)
        .return32(0, 0)
        .finish()
}
