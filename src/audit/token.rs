//! BSM token decoding
//!
//! Two layers, both pure and restartable:
//! - [`Frames`] splits an accumulated byte buffer into whole records (or
//!   garbage spans to skip) and reports how many bytes it consumed. It stops
//!   as soon as a record is incomplete; the caller keeps the tail and appends
//!   the next chunk.
//! - [`Tokens`] lazily walks the tokens of one framed record.
//!
//! All multi-byte fields are big-endian. Tags outside the recognized set are
//! assumed to follow the generic `tag, u16 length, payload` layout.

use bytes::Buf;
use chrono::{TimeZone, Utc};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::constants::*;
use crate::models::{Pid, Timestamp};

/// Kind of a BSM token. Decoding is total over the tag space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Header,
    Subject,
    Process,
    Path,
    ExecArgs,
    ExecEnv,
    Attr,
    Arg,
    Text,
    ReturnStatus,
    Exit,
    Trailer,
    Unknown(u8),
}

impl TokenKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            AUT_HEADER32 | AUT_HEADER32_EX | AUT_HEADER64 | AUT_HEADER64_EX => TokenKind::Header,
            AUT_SUBJECT32 | AUT_SUBJECT64 | AUT_SUBJECT32_EX | AUT_SUBJECT64_EX => TokenKind::Subject,
            AUT_PROCESS32 | AUT_PROCESS64 | AUT_PROCESS32_EX | AUT_PROCESS64_EX => TokenKind::Process,
            AUT_PATH => TokenKind::Path,
            AUT_EXEC_ARGS => TokenKind::ExecArgs,
            AUT_EXEC_ENV => TokenKind::ExecEnv,
            AUT_ATTR | AUT_ATTR32 | AUT_ATTR64 => TokenKind::Attr,
            AUT_ARG32 | AUT_ARG64 => TokenKind::Arg,
            AUT_TEXT => TokenKind::Text,
            AUT_RETURN32 | AUT_RETURN64 => TokenKind::ReturnStatus,
            AUT_EXIT => TokenKind::Exit,
            AUT_TRAILER => TokenKind::Trailer,
            other => TokenKind::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token 0x{tag:02x} declares {declared} bytes but only {available} remain in the record")]
    Overrun {
        tag: u8,
        declared: usize,
        available: usize,
    },
    #[error("token 0x{tag:02x} has unsupported address type {ad_type}")]
    AddressType { tag: u8, ad_type: u32 },
    #[error("token 0x{tag:02x} is too short for its fields")]
    Truncated { tag: u8 },
    #[error("token 0x{tag:02x} carries an invalid timestamp")]
    Timestamp { tag: u8 },
    #[error("expected {expected} token, found 0x{tag:02x}")]
    UnexpectedKind { expected: &'static str, tag: u8 },
}

/// One token of a record. `length` counts the tag byte; `payload` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawToken<'a> {
    pub tag: u8,
    pub kind: TokenKind,
    pub length: u32,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub record_size: u32,
    pub version: u8,
    pub event_type: u16,
    pub event_modifier: u16,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
    pub port: u64,
    pub address: IpAddr,
}

/// Subject (or process) token: who performed the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub audit_uid: u32,
    pub euid: u32,
    pub egid: u32,
    pub ruid: u32,
    pub rgid: u32,
    pub pid: Pid,
    pub session_id: u32,
    pub terminal: Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnStatus {
    pub errno: u8,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub status: i32,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub number: u8,
    pub value: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub magic: u16,
    pub record_size: u32,
}

/// Checked big-endian reader over a token payload
struct FieldReader<'a> {
    buf: &'a [u8],
    tag: u8,
}

impl<'a> FieldReader<'a> {
    fn new(token: &RawToken<'a>) -> Self {
        Self {
            buf: token.payload,
            tag: token.tag,
        }
    }

    fn need(&self, n: usize) -> Result<(), TokenError> {
        if self.buf.remaining() < n {
            Err(TokenError::Truncated { tag: self.tag })
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, TokenError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, TokenError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32, TokenError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self) -> Result<u64, TokenError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], TokenError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn address(&mut self, ad_type: u32) -> Result<IpAddr, TokenError> {
        match ad_type {
            AU_IPV4 => {
                let b = self.bytes(4)?;
                Ok(IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3])))
            }
            AU_IPV6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(self.bytes(16)?);
                Ok(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            other => Err(TokenError::AddressType {
                tag: self.tag,
                ad_type: other,
            }),
        }
    }

    fn timestamp(&mut self, secs: u64, millis: u64) -> Result<Timestamp, TokenError> {
        let nanos = (millis % 1_000) as u32 * 1_000_000;
        Utc.timestamp_opt(secs as i64, nanos)
            .single()
            .ok_or(TokenError::Timestamp { tag: self.tag })
    }
}

/// Trim the NUL terminator(s) of a BSM string
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn be_u16(bytes: &[u8], at: usize) -> Option<usize> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn address_len(tag: u8, ad_type: u32) -> Result<usize, TokenError> {
    match ad_type {
        AU_IPV4 => Ok(4),
        AU_IPV6 => Ok(16),
        other => Err(TokenError::AddressType { tag, ad_type: other }),
    }
}

/// Payload length (excluding the tag) declared by the token starting at `tag`.
/// `rest` is everything after the tag up to the end of the record.
fn payload_length(tag: u8, rest: &[u8]) -> Result<usize, TokenError> {
    let overrun = |declared: usize| TokenError::Overrun {
        tag,
        declared: declared + 1,
        available: rest.len() + 1,
    };
    let len = match tag {
        AUT_TRAILER => 6,
        AUT_HEADER32 => 17,
        AUT_HEADER64 => 25,
        AUT_HEADER32_EX | AUT_HEADER64_EX => {
            let ad_type = be_u32(rest, 9).ok_or_else(|| overrun(13))?;
            let times = if tag == AUT_HEADER32_EX { 8 } else { 16 };
            13 + address_len(tag, ad_type)? + times
        }
        AUT_SUBJECT32 | AUT_PROCESS32 => 36,
        AUT_SUBJECT64 | AUT_PROCESS64 => 40,
        AUT_SUBJECT32_EX | AUT_PROCESS32_EX => {
            let ad_type = be_u32(rest, 32).ok_or_else(|| overrun(36))?;
            36 + address_len(tag, ad_type)?
        }
        AUT_SUBJECT64_EX | AUT_PROCESS64_EX => {
            let ad_type = be_u32(rest, 36).ok_or_else(|| overrun(40))?;
            40 + address_len(tag, ad_type)?
        }
        AUT_RETURN32 => 5,
        AUT_RETURN64 => 9,
        AUT_EXIT => 8,
        AUT_ATTR | AUT_ATTR32 => 28,
        AUT_ATTR64 => 32,
        AUT_ARG32 => 7 + be_u16(rest, 5).ok_or_else(|| overrun(7))?,
        AUT_ARG64 => 11 + be_u16(rest, 9).ok_or_else(|| overrun(11))?,
        AUT_EXEC_ARGS | AUT_EXEC_ENV => {
            let count = be_u32(rest, 0).ok_or_else(|| overrun(4))? as usize;
            let mut end = 4;
            for _ in 0..count {
                let nul = rest
                    .get(end..)
                    .and_then(|tail| tail.iter().position(|&b| b == 0))
                    .ok_or_else(|| overrun(rest.len() + 1))?;
                end += nul + 1;
            }
            end
        }
        // path, text, opaque and every unrecognized tag
        _ => 2 + be_u16(rest, 0).ok_or_else(|| overrun(2))?,
    };
    Ok(len)
}

/// Lazy iterator over the tokens of one record.
/// After the first error the iterator is exhausted: token boundaries past a
/// malformed token cannot be trusted.
pub struct Tokens<'a> {
    record: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Tokens<'a> {
    pub fn new(record: &'a [u8]) -> Self {
        Self {
            record,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<RawToken<'a>, TokenError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.record.len() {
            return None;
        }
        let tag = self.record[self.offset];
        let rest = &self.record[self.offset + 1..];
        let len = match payload_length(tag, rest) {
            Ok(len) if len <= rest.len() => len,
            Ok(len) => {
                self.failed = true;
                return Some(Err(TokenError::Overrun {
                    tag,
                    declared: len + 1,
                    available: rest.len() + 1,
                }));
            }
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };
        self.offset += 1 + len;
        Some(Ok(RawToken {
            tag,
            kind: TokenKind::from_tag(tag),
            length: (1 + len) as u32,
            payload: &rest[..len],
        }))
    }
}

impl<'a> RawToken<'a> {
    fn expect(&self, kind: TokenKind, expected: &'static str) -> Result<FieldReader<'a>, TokenError> {
        if self.kind == kind {
            Ok(FieldReader::new(self))
        } else {
            Err(TokenError::UnexpectedKind {
                expected,
                tag: self.tag,
            })
        }
    }

    pub fn header(&self) -> Result<Header, TokenError> {
        let mut r = self.expect(TokenKind::Header, "header")?;
        let record_size = r.u32()?;
        let version = r.u8()?;
        let event_type = r.u16()?;
        let event_modifier = r.u16()?;
        if matches!(self.tag, AUT_HEADER32_EX | AUT_HEADER64_EX) {
            let ad_type = r.u32()?;
            r.address(ad_type)?;
        }
        let (secs, millis) = match self.tag {
            AUT_HEADER32 | AUT_HEADER32_EX => (r.u32()? as u64, r.u32()? as u64),
            _ => (r.u64()?, r.u64()?),
        };
        Ok(Header {
            record_size,
            version,
            event_type,
            event_modifier,
            timestamp: r.timestamp(secs, millis)?,
        })
    }

    /// Subject and process tokens share one layout
    pub fn subject(&self) -> Result<Subject, TokenError> {
        if !matches!(self.kind, TokenKind::Subject | TokenKind::Process) {
            return Err(TokenError::UnexpectedKind {
                expected: "subject",
                tag: self.tag,
            });
        }
        let mut r = FieldReader::new(self);
        let audit_uid = r.u32()?;
        let euid = r.u32()?;
        let egid = r.u32()?;
        let ruid = r.u32()?;
        let rgid = r.u32()?;
        let pid = r.u32()?;
        let session_id = r.u32()?;
        let terminal = match self.tag {
            AUT_SUBJECT32 | AUT_PROCESS32 => Terminal {
                port: r.u32()? as u64,
                address: r.address(AU_IPV4)?,
            },
            AUT_SUBJECT64 | AUT_PROCESS64 => Terminal {
                port: r.u64()?,
                address: r.address(AU_IPV4)?,
            },
            AUT_SUBJECT32_EX | AUT_PROCESS32_EX => {
                let port = r.u32()? as u64;
                let ad_type = r.u32()?;
                Terminal {
                    port,
                    address: r.address(ad_type)?,
                }
            }
            _ => {
                let port = r.u64()?;
                let ad_type = r.u32()?;
                Terminal {
                    port,
                    address: r.address(ad_type)?,
                }
            }
        };
        Ok(Subject {
            audit_uid,
            euid,
            egid,
            ruid,
            rgid,
            pid,
            session_id,
            terminal,
        })
    }

    pub fn path(&self) -> Result<String, TokenError> {
        let mut r = self.expect(TokenKind::Path, "path")?;
        let len = r.u16()? as usize;
        Ok(c_string(r.bytes(len)?))
    }

    pub fn text(&self) -> Result<String, TokenError> {
        let mut r = self.expect(TokenKind::Text, "text")?;
        let len = r.u16()? as usize;
        Ok(c_string(r.bytes(len)?))
    }

    /// Arguments (or environment) strings, in order
    pub fn strings(&self) -> Result<Vec<String>, TokenError> {
        if !matches!(self.kind, TokenKind::ExecArgs | TokenKind::ExecEnv) {
            return Err(TokenError::UnexpectedKind {
                expected: "exec args",
                tag: self.tag,
            });
        }
        let mut r = FieldReader::new(self);
        let count = r.u32()? as usize;
        let body = r.bytes(r.buf.len())?;
        let strings: Vec<String> = body
            .split(|&b| b == 0)
            .take(count)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        if strings.len() < count {
            return Err(TokenError::Truncated { tag: self.tag });
        }
        Ok(strings)
    }

    pub fn arg(&self) -> Result<Arg, TokenError> {
        let mut r = self.expect(TokenKind::Arg, "argument")?;
        let number = r.u8()?;
        let value = if self.tag == AUT_ARG32 {
            r.u32()? as u64
        } else {
            r.u64()?
        };
        let len = r.u16()? as usize;
        Ok(Arg {
            number,
            value,
            text: c_string(r.bytes(len)?),
        })
    }

    pub fn return_status(&self) -> Result<ReturnStatus, TokenError> {
        let mut r = self.expect(TokenKind::ReturnStatus, "return")?;
        let errno = r.u8()?;
        let value = if self.tag == AUT_RETURN32 {
            r.u32()? as i32 as i64
        } else {
            r.u64()? as i64
        };
        Ok(ReturnStatus { errno, value })
    }

    pub fn exit_status(&self) -> Result<ExitStatus, TokenError> {
        let mut r = self.expect(TokenKind::Exit, "exit")?;
        Ok(ExitStatus {
            status: r.u32()? as i32,
            value: r.u32()? as i32,
        })
    }

    pub fn trailer(&self) -> Result<Trailer, TokenError> {
        let mut r = self.expect(TokenKind::Trailer, "trailer")?;
        Ok(Trailer {
            magic: r.u16()?,
            record_size: r.u32()?,
        })
    }
}

/// One framed unit of the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A complete record: header through trailer
    Record(&'a [u8]),
    /// Bytes that cannot start a record and were skipped
    Garbage(usize),
}

enum Candidate {
    Valid(usize),
    Incomplete,
    Invalid,
}

fn is_header_tag(tag: u8) -> bool {
    matches!(tag, AUT_HEADER32 | AUT_HEADER32_EX | AUT_HEADER64 | AUT_HEADER64_EX)
}

/// Whether a plausible record starts at `buf[0]`
fn candidate_at(buf: &[u8]) -> Candidate {
    match buf.first() {
        None => return Candidate::Incomplete,
        Some(&tag) if !is_header_tag(tag) => return Candidate::Invalid,
        _ => {}
    }
    let size = match be_u32(buf, 1) {
        Some(size) => size as usize,
        None => return Candidate::Incomplete,
    };
    if !(MIN_RECORD_SIZE..=MAX_RECORD_SIZE).contains(&size) {
        return Candidate::Invalid;
    }
    // a stray tag and size alone must not hold back the records behind them
    match buf.get(5) {
        None => return Candidate::Incomplete,
        Some(&version) if version != AUDIT_HEADER_VERSION => return Candidate::Invalid,
        _ => {}
    }
    if buf.len() < size {
        return Candidate::Incomplete;
    }
    let trailer = &buf[size - 7..size];
    let magic = be_u16(trailer, 1).unwrap_or(0) as u16;
    let count = be_u32(trailer, 3).unwrap_or(0) as usize;
    if trailer[0] != AUT_TRAILER || magic != TRAILER_MAGIC || count != size {
        return Candidate::Invalid;
    }
    Candidate::Valid(size)
}

/// Iterator over the records of an accumulated buffer.
/// Iteration ends when the remaining bytes do not yet hold a whole record;
/// [`Frames::consumed`] then tells the caller how much to discard.
pub struct Frames<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> Frames<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Resume framing at `cursor`
    pub fn at(buf: &'a [u8], cursor: usize) -> Self {
        Self {
            buf,
            cursor: cursor.min(buf.len()),
        }
    }

    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.cursor..];
        match candidate_at(rest) {
            Candidate::Valid(size) => {
                self.cursor += size;
                Some(Frame::Record(&rest[..size]))
            }
            Candidate::Incomplete => None,
            Candidate::Invalid => {
                // resynchronise on the next offset that could start a record
                let skip = (1..rest.len())
                    .find(|&i| !matches!(candidate_at(&rest[i..]), Candidate::Invalid))
                    .unwrap_or(rest.len());
                self.cursor += skip;
                Some(Frame::Garbage(skip))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::writer::RecordWriter;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn exec_record() -> Vec<u8> {
        RecordWriter::new(AUE_EXECVE, ts(1_700_000_000))
            .subject32(501, 20, 4242)
            .path("/bin/ls")
            .exec_args(&["ls", "-la"])
            .return32(0, 0)
            .finish()
    }

    #[test]
    fn test_tokens_walk_whole_record() {
        let record = exec_record();
        let kinds: Vec<TokenKind> = Tokens::new(&record).map(|t| t.unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Header,
                TokenKind::Subject,
                TokenKind::Path,
                TokenKind::ExecArgs,
                TokenKind::ReturnStatus,
                TokenKind::Trailer,
            ]
        );
    }

    #[test]
    fn test_token_lengths_cover_record() {
        let record = exec_record();
        let total: u32 = Tokens::new(&record).map(|t| t.unwrap().length).sum();
        assert_eq!(total as usize, record.len());
    }

    #[test]
    fn test_header_fields() {
        let record = exec_record();
        let header = Tokens::new(&record).next().unwrap().unwrap().header().unwrap();
        assert_eq!(header.record_size as usize, record.len());
        assert_eq!(header.event_type, AUE_EXECVE);
        assert_eq!(header.version, AUDIT_HEADER_VERSION);
        assert_eq!(header.timestamp, ts(1_700_000_000));
    }

    #[test]
    fn test_header64_and_subject64() {
        let record = RecordWriter::new(AUE_EXIT, ts(5))
            .subject64(0, 0, 77)
            .exit(3, 0)
            .return32(0, 0)
            .finish64();
        let tokens: Vec<RawToken> = Tokens::new(&record).map(|t| t.unwrap()).collect();
        assert_eq!(tokens[0].tag, AUT_HEADER64);
        assert_eq!(tokens[0].header().unwrap().timestamp, ts(5));
        assert_eq!(tokens[1].subject().unwrap().pid, 77);
        assert_eq!(tokens[2].exit_status().unwrap().status, 3);
    }

    #[test]
    fn test_typed_fields() {
        let record = exec_record();
        let tokens: Vec<RawToken> = Tokens::new(&record).map(|t| t.unwrap()).collect();

        let subject = tokens[1].subject().unwrap();
        assert_eq!(subject.pid, 4242);
        assert_eq!(subject.euid, 501);
        assert_eq!(subject.egid, 20);
        assert_eq!(tokens[2].path().unwrap(), "/bin/ls");
        assert_eq!(tokens[3].strings().unwrap(), vec!["ls", "-la"]);
        assert_eq!(tokens[4].return_status().unwrap(), ReturnStatus { errno: 0, value: 0 });
        let trailer = tokens[5].trailer().unwrap();
        assert_eq!(trailer.magic, TRAILER_MAGIC);
        assert_eq!(trailer.record_size as usize, record.len());
    }

    #[test]
    fn test_wrong_accessor_is_an_error() {
        let record = exec_record();
        let header = Tokens::new(&record).next().unwrap().unwrap();
        assert!(matches!(
            header.path(),
            Err(TokenError::UnexpectedKind { expected: "path", .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_skipped_by_declared_length() {
        let record = RecordWriter::new(AUE_EXECVE, ts(1))
            .subject32(0, 0, 1)
            .raw_token(0xee, b"xyz")
            .path("/bin/true")
            .exec_args(&["true"])
            .finish();
        let tokens: Vec<RawToken> = Tokens::new(&record).map(|t| t.unwrap()).collect();
        assert_eq!(tokens[2].kind, TokenKind::Unknown(0xee));
        assert_eq!(tokens[2].length, 1 + 2 + 3);
        assert_eq!(tokens[3].path().unwrap(), "/bin/true");
    }

    #[test]
    fn test_overrunning_token_stops_iteration() {
        let mut record = RecordWriter::new(AUE_EXECVE, ts(1))
            .subject32(0, 0, 1)
            .path("/bin/true")
            .finish();
        // path token sits right after header (18) and subject (37); inflate its length
        let path_len_at = 18 + 37 + 1;
        record[path_len_at..path_len_at + 2].copy_from_slice(&0x4000u16.to_be_bytes());

        let items: Vec<_> = Tokens::new(&record).collect();
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], Err(TokenError::Overrun { tag: AUT_PATH, .. })));
    }

    #[test]
    fn test_frames_need_more_bytes() {
        let record = exec_record();
        for cut in 0..record.len() {
            let mut frames = Frames::new(&record[..cut]);
            assert_eq!(frames.next(), None, "cut at {cut}");
            assert_eq!(frames.consumed(), 0);
        }
    }

    #[test]
    fn test_frames_yield_consecutive_records() {
        let mut stream = exec_record();
        stream.extend(exec_record());
        let mut frames = Frames::new(&stream);
        assert!(matches!(frames.next(), Some(Frame::Record(r)) if r.len() == stream.len() / 2));
        assert!(matches!(frames.next(), Some(Frame::Record(_))));
        assert_eq!(frames.next(), None);
        assert_eq!(frames.consumed(), stream.len());
    }

    #[test]
    fn test_frames_resynchronise_after_garbage() {
        let mut stream = vec![0xde, 0xad, 0xbe, 0xef, 0x00];
        stream.extend(exec_record());
        let frames: Vec<Frame> = Frames::new(&stream).collect();
        assert_eq!(frames[0], Frame::Garbage(5));
        assert!(matches!(frames[1], Frame::Record(_)));
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_frames_reject_header_with_wrong_version() {
        let mut record = exec_record();
        record[5] = AUDIT_HEADER_VERSION + 1;
        let mut frames = Frames::new(&record);
        assert!(matches!(frames.next(), Some(Frame::Garbage(_))));
    }

    #[test]
    fn test_frames_reject_implausible_size() {
        let mut record = exec_record();
        record[1..5].copy_from_slice(&u32::MAX.to_be_bytes());
        let mut frames = Frames::new(&record);
        assert!(matches!(frames.next(), Some(Frame::Garbage(_))));
    }

    #[test]
    fn test_frames_reject_missing_trailer() {
        let mut record = exec_record();
        let end = record.len();
        record[end - 6] ^= 0xff; // corrupt the trailer magic
        let frames: Vec<Frame> = Frames::new(&record).collect();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| matches!(f, Frame::Garbage(_))));
    }

    #[test]
    fn test_frames_resume_at_cursor() {
        let mut stream = exec_record();
        let first = stream.len();
        stream.extend(exec_record());
        let mut frames = Frames::at(&stream, first);
        assert!(matches!(frames.next(), Some(Frame::Record(_))));
        assert_eq!(frames.consumed(), stream.len());
    }
}
