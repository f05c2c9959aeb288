//! Length-prefixed framing for the control connection
//!
//! # Protocol
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON object              │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - **Maximum message size**: 1MB (1,048,576 bytes)
//! - **Malformed length / oversized message**: connection closed
//! - **EOF between frames**: orderly disconnect
//! - **EOF inside a frame**: [`Error::TruncatedFrame`], connection closed
//! - **Read timeout**: reported as [`ReadEvent::Idle`]; partial frames are kept
//!   and completed by later reads, so a timeout never loses bytes

use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload accepted in either direction
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Read chunk size
const READ_CHUNK: usize = 4096;

/// Prefix `payload` with its big-endian length
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encode and write one frame in a single `write_all`
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Incremental frame decoder; accepts bytes in arbitrary chunks
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_len: usize,
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            max_len,
        }
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total size of the frame being assembled, once the prefix is known
    pub fn expected(&self) -> Option<usize> {
        self.announced_len().map(|len| LENGTH_PREFIX_LEN + len)
    }

    fn announced_len(&self) -> Option<usize> {
        let prefix: [u8; LENGTH_PREFIX_LEN] =
            self.buffer.get(..LENGTH_PREFIX_LEN)?.try_into().ok()?;
        Some(u32::from_be_bytes(prefix) as usize)
    }

    /// Pop the next complete payload, if any
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(len) = self.announced_len() else {
            return Ok(None);
        };
        if len > self.max_len {
            return Err(Error::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }
        let total = LENGTH_PREFIX_LEN + len;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let payload = self.buffer[LENGTH_PREFIX_LEN..total].to_vec();
        self.buffer.drain(..total);
        Ok(Some(payload))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

/// Result of one [`FrameReader::read_frame`] call
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    /// A complete payload
    Frame(Vec<u8>),
    /// Read timed out before a frame completed; state is kept
    Idle,
    /// Peer closed the connection on a frame boundary
    Closed,
}

/// Reads frames from a byte stream, tolerating partial reads and timeouts
pub struct FrameReader<R> {
    inner: R,
    decoder: FrameDecoder,
    chunk: Box<[u8]>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::default(),
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Read until a frame completes, the read times out, or the peer closes
    pub fn read_frame(&mut self) -> Result<ReadEvent> {
        loop {
            if let Some(payload) = self.decoder.next_frame()? {
                return Ok(ReadEvent::Frame(payload));
            }

            match self.inner.read(&mut self.chunk) {
                Ok(0) => {
                    let received = self.decoder.buffered();
                    if received == 0 {
                        return Ok(ReadEvent::Closed);
                    }
                    return Err(Error::TruncatedFrame {
                        expected: self.decoder.expected().unwrap_or(LENGTH_PREFIX_LEN),
                        received,
                    });
                }
                Ok(n) => self.decoder.push(&self.chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(ReadEvent::Idle);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Hands out the stream in a repeating pattern of small chunks
    struct ChunkedReader {
        data: VecDeque<u8>,
        sizes: Vec<usize>,
        step: usize,
    }

    impl ChunkedReader {
        fn new(data: Vec<u8>, sizes: Vec<usize>) -> Self {
            Self {
                data: data.into(),
                sizes,
                step: 0,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let want = self.sizes[self.step % self.sizes.len()];
            self.step += 1;
            let n = want.min(buf.len()).min(self.data.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.data.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    /// Alternates between a timeout and a single byte
    struct StutteringReader {
        data: VecDeque<u8>,
        stall: bool,
    }

    impl Read for StutteringReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.stall = !self.stall;
            if self.stall {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            match self.data.pop_front() {
                Some(b) if !buf.is_empty() => {
                    buf[0] = b;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    fn payloads() -> Vec<Vec<u8>> {
        vec![
            br#"{"vertical_motor":{"direction":1,"speed":10}}"#.to_vec(),
            Vec::new(),
            vec![0xAB; 5000],
            b"x".to_vec(),
        ]
    }

    fn stream_of(payloads: &[Vec<u8>]) -> Vec<u8> {
        payloads
            .iter()
            .flat_map(|p| encode_frame(p).unwrap())
            .collect()
    }

    fn drain<R: Read>(reader: &mut FrameReader<R>) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        loop {
            match reader.read_frame().unwrap() {
                ReadEvent::Frame(p) => frames.push(p),
                ReadEvent::Idle => {}
                ReadEvent::Closed => return frames,
            }
        }
    }

    #[test]
    fn test_frames_survive_any_chunking() {
        let expected = payloads();
        let stream = stream_of(&expected);
        for sizes in [vec![1], vec![3, 1, 7], vec![4096], vec![2, 5000, 1]] {
            let mut reader = FrameReader::new(ChunkedReader::new(stream.clone(), sizes));
            assert_eq!(drain(&mut reader), expected);
        }
    }

    #[test]
    fn test_timeouts_keep_partial_frames() {
        let expected = payloads();
        let mut reader = FrameReader::new(StutteringReader {
            data: stream_of(&expected).into(),
            stall: false,
        });
        assert_eq!(drain(&mut reader), expected);
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = 1000u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"hello");
        let mut reader = FrameReader::new(Cursor::new(bytes));
        match reader.read_frame() {
            Err(Error::TruncatedFrame { expected, received }) => {
                assert_eq!(expected, 1004);
                assert_eq!(received, 9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_prefix() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8, 0]));
        assert!(matches!(
            reader.read_frame(),
            Err(Error::TruncatedFrame { received: 2, .. })
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let bytes = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_frame(),
            Err(Error::FrameTooLarge { .. })
        ));
        assert!(encode_frame(&vec![0u8; MAX_FRAME_LEN + 1]).is_err());
    }

    #[test]
    fn test_empty_stream_is_orderly_close() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert_eq!(reader.read_frame().unwrap(), ReadEvent::Closed);
    }
}
