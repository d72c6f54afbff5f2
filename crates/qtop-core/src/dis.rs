//! Data-Is-String codec used on the scheduler TCP channel.
//!
//! An integer is a decimal digit string preceded by its sign, preceded by a
//! chain of digit-count groups: while a group is longer than one digit, the
//! length of that group is prepended as a further decimal group. A one-digit
//! magnitude therefore carries no count at all (`5` is `+5`), a five-digit
//! magnitude one count (`45296` is `5+45296`), a ten-digit magnitude two
//! (`210+…`). A string is the DIS encoding of its byte length followed by
//! the raw bytes, with no terminator.

use std::io::{self, Read};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisError {
    #[error("stream ended mid-value")]
    ShortRead,
    #[error("bad DIS format: {0}")]
    BadFormat(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub fn encode_int(n: i64) -> String {
    let sign = if n < 0 { '-' } else { '+' };
    let digits = n.unsigned_abs().to_string();

    let mut out = count_prefix(digits.len());
    out.push(sign);
    out.push_str(&digits);
    out
}

pub fn encode_string(s: &str) -> String {
    let mut out = encode_int(s.len() as i64);
    out.push_str(s);
    out
}

/// Chain of count groups for a digit string of length `ndigits`, outermost
/// count first. Empty for a single digit.
fn count_prefix(mut ndigits: usize) -> String {
    let mut groups = Vec::new();
    while ndigits > 1 {
        let group = ndigits.to_string();
        ndigits = group.len();
        groups.push(group);
    }
    groups.into_iter().rev().collect()
}

pub fn read_int<R: Read + ?Sized>(r: &mut R) -> Result<i64, DisError> {
    // Each digit group's length is given by the previous group; the chain
    // starts at one and ends at the group introduced by the sign byte.
    let mut count: usize = 1;

    loop {
        let lead = read_byte(r)?;
        match lead {
            b'+' | b'-' => {
                let digits = read_group(r, None, count)?;
                let magnitude = digits
                    .parse::<i64>()
                    .map_err(|_| DisError::BadFormat(format!("digit group {digits:?}")))?;
                return Ok(if lead == b'-' { -magnitude } else { magnitude });
            }
            b'0'..=b'9' => {
                let group = read_group(r, Some(lead), count - 1)?;
                count = group
                    .parse::<usize>()
                    .map_err(|_| DisError::BadFormat(format!("count group {group:?}")))?;
                if count == 0 {
                    return Err(DisError::BadFormat("zero-length count group".into()));
                }
            }
            other => {
                return Err(DisError::BadFormat(format!(
                    "unexpected byte {:#04x} in integer",
                    other
                )))
            }
        }
    }
}

pub fn read_string<R: Read + ?Sized>(r: &mut R) -> Result<String, DisError> {
    let len = read_int(r)?;
    let len = usize::try_from(len)
        .map_err(|_| DisError::BadFormat(format!("negative string length {len}")))?;

    let mut buf = vec![0u8; len];
    read_full(r, &mut buf)?;
    String::from_utf8(buf).map_err(|_| DisError::BadFormat("string is not valid UTF-8".into()))
}

/// Reads a digit group of `rest` further bytes, optionally seeded with an
/// already-consumed lead byte, and checks every byte is an ASCII digit.
fn read_group<R: Read + ?Sized>(
    r: &mut R,
    lead: Option<u8>,
    rest: usize,
) -> Result<String, DisError> {
    let mut bytes = Vec::with_capacity(rest + 1);
    bytes.extend(lead);
    let start = bytes.len();
    bytes.resize(start + rest, 0);
    read_full(r, &mut bytes[start..])?;

    if !bytes.iter().all(u8::is_ascii_digit) {
        return Err(DisError::BadFormat("non-digit byte in digit group".into()));
    }
    Ok(String::from_utf8(bytes).expect("ascii digits"))
}

fn read_byte<R: Read + ?Sized>(r: &mut R) -> Result<u8, DisError> {
    let mut b = [0u8; 1];
    read_full(r, &mut b)?;
    Ok(b[0])
}

fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<(), DisError> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(DisError::ShortRead),
        Err(err) => Err(DisError::Io(err)),
    }
}
