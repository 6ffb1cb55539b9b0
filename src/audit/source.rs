//! Byte sources feeding the decoder

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::constants::READ_CHUNK_SIZE;
use crate::models::MonitorError;

/// A stream of raw audit bytes.
///
/// `Ok(None)` means nothing arrived within `timeout`; the caller should check
/// whether it has been asked to stop and poll again. `Ok(Some(&[]))` means
/// the stream has ended.
pub trait RecordSource: Send {
    fn next_chunk(&mut self, timeout: Duration) -> Result<Option<&[u8]>, MonitorError>;
}

/// Replays a recorded audit trail, such as a file under `/var/audit` or one
/// built with [`crate::audit::writer`]
pub struct TrailFile {
    file: File,
    buf: Vec<u8>,
}

impl TrailFile {
    pub fn open(path: &Path) -> Result<Self, MonitorError> {
        let file = File::open(path).map_err(|source| MonitorError::DeviceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            file,
            buf: vec![0u8; READ_CHUNK_SIZE],
        })
    }
}

impl RecordSource for TrailFile {
    fn next_chunk(&mut self, _timeout: Duration) -> Result<Option<&[u8]>, MonitorError> {
        loop {
            match self.file.read(&mut self.buf) {
                Ok(n) => return Ok(Some(&self.buf[..n])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(MonitorError::DeviceRead(err)),
            }
        }
    }
}

/// Handle for pushing chunks into a [`ChannelSource`]. Dropping every sender
/// ends the stream.
#[derive(Clone)]
pub struct ChunkSender(Sender<Vec<u8>>);

impl ChunkSender {
    /// Returns false once the source has been dropped
    pub fn send(&self, chunk: Vec<u8>) -> bool {
        self.0.send(chunk).is_ok()
    }
}

/// In-memory source fed from another thread
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
}

impl ChannelSource {
    pub fn new() -> (ChunkSender, Self) {
        let (tx, rx) = mpsc::channel();
        (
            ChunkSender(tx),
            Self {
                rx,
                current: Vec::new(),
            },
        )
    }

    /// A finished stream holding exactly `chunks`
    pub fn from_chunks(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let (tx, source) = Self::new();
        for chunk in chunks {
            tx.send(chunk);
        }
        source
    }
}

impl RecordSource for ChannelSource {
    fn next_chunk(&mut self, timeout: Duration) -> Result<Option<&[u8]>, MonitorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => {
                self.current = chunk;
                Ok(Some(&self.current))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(Some(&[])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WAIT: Duration = Duration::from_millis(10);

    #[test]
    fn test_channel_source_yields_chunks_then_ends() {
        let mut source = ChannelSource::from_chunks(vec![vec![1, 2], vec![3]]);
        assert_eq!(source.next_chunk(WAIT).unwrap(), Some(&[1u8, 2][..]));
        assert_eq!(source.next_chunk(WAIT).unwrap(), Some(&[3u8][..]));
        assert_eq!(source.next_chunk(WAIT).unwrap(), Some(&[][..]));
    }

    #[test]
    fn test_channel_source_idles_while_sender_alive() {
        let (tx, mut source) = ChannelSource::new();
        assert_eq!(source.next_chunk(WAIT).unwrap(), None);
        assert!(tx.send(vec![9]));
        assert_eq!(source.next_chunk(WAIT).unwrap(), Some(&[9u8][..]));
    }

    #[test]
    fn test_trail_file_reads_to_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 100]).unwrap();
        file.flush().unwrap();

        let mut source = TrailFile::open(file.path()).unwrap();
        let mut total = 0;
        loop {
            let chunk = source.next_chunk(WAIT).unwrap().unwrap();
            if chunk.is_empty() {
                break;
            }
            total += chunk.len();
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn test_trail_file_missing() {
        let result = TrailFile::open(Path::new("/nonexistent/trail.bsm"));
        assert!(matches!(result, Err(MonitorError::DeviceOpen { .. })));
    }
}
