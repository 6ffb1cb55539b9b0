//! Incremental decoding of a chunked record stream

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use log::{debug, warn};

use super::record::{Assembled, Assembler};
use super::token::{Frame, Frames};
use crate::constants::READ_CHUNK_SIZE;
use crate::diagnostics::Diagnostics;
use crate::models::AuditEvent;

/// Carries partial records across reads. Chunk boundaries never affect the
/// decoded events: feeding a stream in one piece or byte by byte yields the
/// same sequence.
pub struct StreamDecoder {
    pending: BytesMut,
    assembler: Assembler,
    diagnostics: Arc<Diagnostics>,
}

impl StreamDecoder {
    pub fn new(assembler: Assembler, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            assembler,
            diagnostics,
        }
    }

    /// Append a chunk and return every event completed by it, in stream order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<AuditEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut frames = Frames::new(&self.pending);
        for frame in &mut frames {
            match frame {
                Frame::Record(record) => {
                    self.diagnostics.add_records_decoded(1);
                    match self.assembler.assemble(record) {
                        Ok(Assembled::Event(event)) => events.push(event),
                        Ok(Assembled::Filtered) => self.diagnostics.add_filtered_records(1),
                        Err(err) => {
                            if err.is_malformed_token() {
                                self.diagnostics.add_malformed_tokens(1);
                            } else {
                                self.diagnostics.add_invalid_records(1);
                            }
                            debug!("Dropping audit record ({} bytes): {}", record.len(), err);
                        }
                    }
                }
                Frame::Garbage(skipped) => {
                    self.diagnostics.add_skipped_bytes(skipped as u64);
                    warn!("Skipped {} bytes while resynchronising on the audit stream", skipped);
                }
            }
        }
        let consumed = frames.consumed();
        self.pending.advance(consumed);

        self.diagnostics.add_events_emitted(events.len() as u64);
        events
    }

    /// Bytes held back waiting for the rest of a record
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// End of stream: drop whatever incomplete record is left
    pub fn finish(&mut self) -> usize {
        let leftover = self.pending.len();
        if leftover > 0 {
            debug!("Discarding {} trailing bytes of an incomplete record", leftover);
            self.diagnostics.add_skipped_bytes(leftover as u64);
            self.pending.clear();
        }
        leftover
    }
}
