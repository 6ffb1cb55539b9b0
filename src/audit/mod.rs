//! Audit stream ingestion
//!
//! Reads BSM records from the kernel audit pipe (or a recorded trail),
//! decodes their tokens and assembles process lifecycle events:
//! - `pipe`: the `/dev/auditpipe` device
//! - `source`: the byte-source seam and non-device sources
//! - `token`: record framing and token decoding
//! - `record`: event assembly from one record
//! - `stream`: incremental decoding across reads
//! - `writer`: synthetic record construction

#[allow(unsafe_code)]
pub mod pipe;
pub mod record;
pub mod source;
pub mod stream;
pub mod token;
pub mod writer;

pub use pipe::AuditPipe;
pub use record::{Assembled, Assembler, AssemblyError, NoParentResolver, ParentResolver, SystemParentResolver};
pub use source::{ChannelSource, ChunkSender, RecordSource, TrailFile};
pub use stream::StreamDecoder;
pub use token::{Frame, Frames, RawToken, TokenError, TokenKind, Tokens};
pub use writer::RecordWriter;
