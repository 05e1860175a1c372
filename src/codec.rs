//! Line framing and exact-length reads over any byte stream
//!
//! Lines are `\r\n`-terminated on the wire. Reads go one byte at a time so
//! that raw transfer bytes following a control line are never over-consumed.

use std::io::{ErrorKind, Read, Write};

use crate::error::{Result, TransferError};
use crate::protocol::{LINE_END, MAX_LINE_LEN, SIZE_HEADER_LEN};

/// Write `text` followed by `\r\n` in a single `write_all`.
pub fn send_line<W: Write>(stream: &mut W, text: &str) -> Result<()> {
    let mut frame = Vec::with_capacity(text.len() + LINE_END.len());
    frame.extend_from_slice(text.as_bytes());
    frame.extend_from_slice(LINE_END.as_bytes());
    stream.write_all(&frame)?;
    stream.flush()?;
    Ok(())
}

/// Read up to the next `\n`.
///
/// Returns `Ok(None)` when the peer closed before sending any byte. A line
/// cut short by EOF is returned as-is. Invalid UTF-8 is replaced, never fatal.
pub fn recv_line<R: Read>(stream: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                if buf.len() >= MAX_LINE_LEN {
                    return Err(TransferError::Protocol(format!(
                        "line exceeds {} bytes",
                        MAX_LINE_LEN
                    )));
                }
                buf.push(byte[0]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Read exactly `n` bytes, failing with `ConnectionClosed` on a short stream.
pub fn recv_exact<R: Read>(stream: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(TransferError::ConnectionClosed("exact read")),
            Ok(k) => filled += k,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(buf)
}

/// Encode the UPLOAD total-size field (u64, big-endian).
pub fn encode_size_header(total: u64) -> [u8; SIZE_HEADER_LEN] {
    total.to_be_bytes()
}

pub fn read_size_header<R: Read>(stream: &mut R) -> Result<u64> {
    let raw = recv_exact(stream, SIZE_HEADER_LEN)?;
    let mut hdr = [0u8; SIZE_HEADER_LEN];
    hdr.copy_from_slice(&raw);
    Ok(u64::from_be_bytes(hdr))
}

/// Split a command line into an upper-cased verb and the trimmed remainder.
/// `None` for a blank line.
pub fn split_command(line: &str) -> Option<(String, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, rest) = match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim()),
        None => (line, ""),
    };
    Some((verb.to_uppercase(), rest))
}
