//! Framing codec for the trqauthd UNIX socket.
//!
//! Every value is terminated by a `|` byte. Integers are plain signed
//! decimal; strings are a length-prefixed run of raw bytes with their own
//! trailing delimiter. A full daemon response fits in a single datagram, so
//! the decoder works on a captured buffer rather than a stream.

use thiserror::Error;

const DELIMITER: u8 = b'|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipeError {
    #[error("pipe value is malformed")]
    BadFormat,
    #[error("pipe buffer ended mid-value")]
    UnexpectedEnd,
}

/// Accumulates pipe-encoded values into a request buffer.
#[derive(Debug, Default)]
pub struct PipeEncoder {
    buf: Vec<u8>,
}

impl PipeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_int(&mut self, n: i64) {
        self.buf.extend_from_slice(n.to_string().as_bytes());
        self.buf.push(DELIMITER);
    }

    pub fn put_string(&mut self, s: &str) {
        self.put_int(s.len() as i64);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(DELIMITER);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Decodes pipe-encoded values out of a response buffer.
#[derive(Debug)]
pub struct PipeDecoder {
    buf: Vec<u8>,
    pos: usize,
}

impl PipeDecoder {
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    pub fn get_int(&mut self) -> Result<i64, PipeError> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .iter()
            .position(|b| *b == DELIMITER)
            .ok_or(PipeError::BadFormat)?;
        let text = std::str::from_utf8(&rest[..end]).map_err(|_| PipeError::BadFormat)?;
        let n = text.parse::<i64>().map_err(|_| PipeError::BadFormat)?;
        self.pos += end + 1;
        Ok(n)
    }

    pub fn get_string(&mut self) -> Result<String, PipeError> {
        let len = self.get_int()?;
        let len = usize::try_from(len).map_err(|_| PipeError::BadFormat)?;

        let rest = &self.buf[self.pos..];
        if rest.len() < len + 1 {
            return Err(PipeError::UnexpectedEnd);
        }
        if rest[len] != DELIMITER {
            return Err(PipeError::BadFormat);
        }

        let s = String::from_utf8(rest[..len].to_vec()).map_err(|_| PipeError::BadFormat)?;
        self.pos += len + 1;
        Ok(s)
    }
}
