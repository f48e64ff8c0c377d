//! Length-Prefixed Frame Encoding
//!
//! Worker commands and responses travel over stdin/stdout as JSON payloads
//! behind a 4-byte little-endian length. Commands carry counts and settings
//! only, so they get a much tighter size limit than responses, which may hold
//! full chart curves.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Largest accepted command frame (1 MB)
pub const MAX_COMMAND_FRAME: usize = 1024 * 1024;

/// Largest response frame (16 MB)
pub const MAX_RESPONSE_FRAME: usize = 16 * 1024 * 1024;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The payload was read completely but is not a valid message
    #[error("Malformed frame payload: {0}")]
    Malformed(String),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Stream ended inside a frame: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    #[error("End of stream")]
    EndOfStream,
}

impl FrameError {
    /// Whether the stream is still positioned at a frame boundary
    ///
    /// Only a malformed payload leaves the reader aligned; the next frame can
    /// still be read.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Malformed(_))
    }
}

/// Write a message with length prefix, refusing payloads above `limit`
///
/// Frame format:
/// ```text
/// +----------------+------------------+
/// | length (4 LE)  | JSON payload     |
/// +----------------+------------------+
/// ```
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T, limit: usize) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize + ?Sized,
{
    let bytes =
        serde_json::to_vec(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    let len = bytes.len();
    let max = limit.min(u32::MAX as usize);
    if len > max {
        return Err(FrameError::FrameTooLarge { size: len, max });
    }

    writer.write_all(&(len as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;

    Ok(())
}

/// Read a message with length prefix, refusing payloads above `limit`
pub fn read_frame<R, T>(reader: &mut BufReader<R>, limit: usize) -> Result<T, FrameError>
where
    R: Read,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::EndOfStream);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > limit {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: limit,
        });
    }
    if len == 0 {
        return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
    }

    let mut buf = Vec::with_capacity(len);
    let received = reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if received < len {
        return Err(FrameError::Truncated {
            expected: len,
            received,
        });
    }

    serde_json::from_slice(&buf).map_err(|e| FrameError::Malformed(e.to_string()))
}

/// Frame writer with a 64KB buffer
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
    limit: usize,
}

impl<W: Write> FrameWriter<W> {
    /// Writer for response frames
    pub fn new(writer: W) -> Self {
        Self::with_limit(writer, MAX_RESPONSE_FRAME)
    }

    /// Writer refusing frames larger than `limit` bytes
    pub fn with_limit(writer: W, limit: usize) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            limit,
        }
    }

    /// Write a message
    pub fn write<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<(), FrameError> {
        write_frame(&mut self.writer, message, self.limit)
    }

    /// Consume and return the inner writer
    pub fn into_inner(self) -> BufWriter<W> {
        self.writer
    }
}

/// Frame reader with a 64KB buffer
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
    limit: usize,
}

impl<R: Read> FrameReader<R> {
    /// Reader for response frames
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_RESPONSE_FRAME)
    }

    /// Reader for worker command frames
    pub fn commands(reader: R) -> Self {
        Self::with_limit(reader, MAX_COMMAND_FRAME)
    }

    /// Reader refusing frames larger than `limit` bytes
    pub fn with_limit(reader: R, limit: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(64 * 1024, reader),
            limit,
        }
    }

    /// Read a message
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T, FrameError> {
        read_frame(&mut self.reader, self.limit)
    }
}
