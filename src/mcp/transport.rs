//! Stdio transport for JSON-RPC 2.0
//!
//! Clients speak either newline-delimited JSON or LSP-style
//! `Content-Length` framing. The first message decides, and the same framing
//! is used for every reply until the process exits.
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"ping"}\n
//!
//! Content-Length: 40\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":1,"method":"ping"}
//! ```
//!
//! [`FrameDecoder`] is a pure byte-buffer state machine; [`StdioTransport`]
//! feeds it from any `AsyncRead` and writes replies to any `AsyncWrite`.

use crate::error::TransportError;
use serde::Serialize;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Bytes of leading noise tolerated before a framing must be recognised
pub const MAX_DETECT_BYTES: usize = 8 * 1024;

/// Largest accepted header block
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Most header lines accepted in one block
pub const MAX_HEADER_LINES: usize = 64;

/// Largest accepted frame body
pub const MAX_FRAME_BYTES: usize = 10_000_000;

const CONTENT_LENGTH: &[u8] = b"content-length:";

const READ_CHUNK: usize = 8 * 1024;

/// Message framing on the stdio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON value per line
    NewlineDelimited,
    /// `Content-Length: N` header block followed by N bytes
    ContentLength,
}

impl Framing {
    /// Frame a serialized JSON payload
    pub fn encode(self, payload: &[u8]) -> Vec<u8> {
        match self {
            Framing::NewlineDelimited => {
                let mut out = Vec::with_capacity(payload.len() + 1);
                out.extend_from_slice(payload);
                out.push(b'\n');
                out
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", payload.len());
                let mut out = Vec::with_capacity(header.len() + payload.len());
                out.extend_from_slice(header.as_bytes());
                out.extend_from_slice(payload);
                out
            }
        }
    }
}

enum Detection {
    Committed(Framing),
    NeedMore,
    Discarded,
}

/// Incremental frame extractor
#[derive(Debug, Default)]
pub struct FrameDecoder {
    framing: Option<Framing>,
    buf: Vec<u8>,
    /// Bytes thrown away while still detecting
    discarded: usize,
    /// Parsed header of a length-prefixed frame whose body is incomplete:
    /// (body offset, body length)
    pending: Option<(usize, usize)>,
    /// Prefix of `buf` already searched for the current delimiter. Reset
    /// whenever bytes are drained from the front.
    scanned: usize,
}

impl FrameDecoder {
    /// Create a decoder that detects framing from the first message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder committed to a framing up front
    pub fn with_framing(framing: Framing) -> Self {
        Self {
            framing: Some(framing),
            ..Self::default()
        }
    }

    /// Framing in use, once detected
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    /// Number of bytes buffered but not yet emitted
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append raw input
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame body, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            if self.pending.is_none() {
                self.skip_whitespace()?;
            }
            if self.buf.is_empty() {
                return Ok(None);
            }

            let framing = match self.framing {
                Some(framing) => framing,
                None => match self.detect()? {
                    Detection::Committed(framing) => {
                        debug!(?framing, "framing detected");
                        self.framing = Some(framing);
                        framing
                    }
                    Detection::NeedMore => return Ok(None),
                    Detection::Discarded => continue,
                },
            };

            return match framing {
                Framing::NewlineDelimited => self.next_line(),
                Framing::ContentLength => self.next_length_prefixed(),
            };
        }
    }

    /// Flush whatever is left at end of stream. A final line without a
    /// trailing newline still counts; a truncated length-prefixed frame does not.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let trimmed = rest.trim_ascii();
        if trimmed.is_empty() {
            return None;
        }

        let line_mode = match self.framing {
            Some(Framing::NewlineDelimited) => true,
            Some(Framing::ContentLength) => false,
            None => matches!(trimmed.first(), Some(b'{') | Some(b'[')),
        };
        if line_mode {
            Some(trimmed.to_vec())
        } else {
            debug!(bytes = trimmed.len(), "dropping truncated frame at end of stream");
            None
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), TransportError> {
        let skip = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        if skip == 0 {
            return Ok(());
        }
        self.consume(skip);
        if self.framing.is_none() {
            self.discarded += skip;
            if self.discarded > MAX_DETECT_BYTES {
                return Err(TransportError::Undetected(self.discarded));
            }
        }
        Ok(())
    }

    fn detect(&mut self) -> Result<Detection, TransportError> {
        // Newline-delimited is checked first; it wins any tie.
        if matches!(self.buf[0], b'{' | b'[') {
            return Ok(Detection::Committed(Framing::NewlineDelimited));
        }

        let probe = self.buf.len().min(CONTENT_LENGTH.len());
        if self.buf[..probe].eq_ignore_ascii_case(&CONTENT_LENGTH[..probe]) {
            return Ok(if probe == CONTENT_LENGTH.len() {
                Detection::Committed(Framing::ContentLength)
            } else {
                Detection::NeedMore
            });
        }

        // Banner or other noise: drop the line and look again.
        match self.find_newline() {
            Some(pos) => {
                self.discarded += pos + 1;
                if self.discarded > MAX_DETECT_BYTES {
                    return Err(TransportError::Undetected(self.discarded));
                }
                debug!(line = %String::from_utf8_lossy(&self.buf[..pos]).trim(), "skipping unframed input");
                self.consume(pos + 1);
                Ok(Detection::Discarded)
            }
            None if self.discarded + self.buf.len() > MAX_DETECT_BYTES => Err(
                TransportError::Undetected(self.discarded + self.buf.len()),
            ),
            None => Ok(Detection::NeedMore),
        }
    }

    fn next_line(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.find_newline() {
            Some(pos) => {
                let line = self.buf[..pos].trim_ascii().to_vec();
                self.consume(pos + 1);
                Ok(Some(line))
            }
            None if self.buf.len() > MAX_FRAME_BYTES => Err(TransportError::FrameTooLarge {
                len: self.buf.len(),
                max: MAX_FRAME_BYTES,
            }),
            None => Ok(None),
        }
    }

    fn next_length_prefixed(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let (body_start, body_len) = match self.pending {
            Some(pending) => pending,
            None => match self.parse_header()? {
                Some(parsed) => {
                    self.pending = Some(parsed);
                    parsed
                }
                None => return Ok(None),
            },
        };

        let frame_end = body_start + body_len;
        if self.buf.len() < frame_end {
            return Ok(None);
        }

        let body = self.buf[body_start..frame_end].to_vec();
        self.consume(frame_end);
        self.pending = None;
        Ok(Some(body))
    }

    /// Drop `n` bytes from the front of the buffer
    fn consume(&mut self, n: usize) {
        self.buf.drain(..n);
        self.scanned = 0;
    }

    /// Offset of the first `\n`, searching only bytes not seen before
    fn find_newline(&mut self) -> Option<usize> {
        let found = self.buf[self.scanned..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| self.scanned + pos);
        if found.is_none() {
            self.scanned = self.buf.len();
        }
        found
    }

    /// Returns (body offset, body length) once the header block is complete.
    fn parse_header(&mut self) -> Result<Option<(usize, usize)>, TransportError> {
        let found = find_header_end(&self.buf, self.scanned);
        if found.is_none() {
            // A terminator may still straddle the last three bytes
            self.scanned = self.buf.len().saturating_sub(3);
        }
        let Some((header_len, terminator)) = found else {
            if self.buf.len() > MAX_HEADER_BYTES {
                return Err(TransportError::HeaderTooLarge(MAX_HEADER_BYTES));
            }
            return Ok(None);
        };
        if header_len > MAX_HEADER_BYTES {
            return Err(TransportError::HeaderTooLarge(MAX_HEADER_BYTES));
        }

        let header = String::from_utf8_lossy(&self.buf[..header_len]);
        let lines: Vec<&str> = header
            .split('\n')
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() > MAX_HEADER_LINES {
            return Err(TransportError::TooManyHeaders(MAX_HEADER_LINES));
        }

        let mut content_length = None;
        for line in lines {
            // Lines without a colon are ignored, as are headers other than
            // Content-Length.
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                let parsed = value.trim().parse::<usize>().map_err(|_| {
                    TransportError::InvalidHeader(format!(
                        "Content-Length is not a number: {:?}",
                        value.trim()
                    ))
                })?;
                content_length = Some(parsed);
            }
        }

        let len = content_length
            .ok_or_else(|| TransportError::InvalidHeader("missing Content-Length".to_string()))?;
        if len > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge {
                len,
                max: MAX_FRAME_BYTES,
            });
        }
        Ok(Some((header_len + terminator, len)))
    }
}

/// Position of the blank line ending a header block, and its length.
/// Positions before `from` are known not to start one.
fn find_header_end(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

/// Framed JSON-RPC over a reader/writer pair
pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl StdioTransport<io::Stdin, io::Stdout> {
    /// Transport over the process's stdin/stdout
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a transport that detects framing from the first message
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            decoder: FrameDecoder::new(),
            chunk: vec![0; READ_CHUNK],
        }
    }

    /// Framing in use, once detected
    pub fn framing(&self) -> Option<Framing> {
        self.decoder.framing()
    }

    /// Read the next frame body. `Ok(None)` means end of stream.
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                debug!(bytes = frame.len(), "frame received");
                return Ok(Some(frame));
            }
            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                return Ok(self.decoder.finish());
            }
            self.decoder.extend(&self.chunk[..n]);
        }
    }

    /// Serialize, frame and flush one message. Framing defaults to
    /// `Content-Length` if nothing has been read yet.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), TransportError> {
        let payload =
            serde_json::to_vec(message).map_err(|e| TransportError::Encode(e.to_string()))?;
        let framing = self.decoder.framing().unwrap_or(Framing::ContentLength);
        self.writer.write_all(&framing.encode(&payload)).await?;
        self.writer.flush().await?;
        debug!(bytes = payload.len(), ?framing, "frame sent");
        Ok(())
    }

    /// Consume the transport, returning the reader and writer
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
