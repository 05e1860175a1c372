//! Byte loops for UPLOAD/DOWNLOAD bodies
//!
//! Both directions share the same two primitives: stream a file range into a
//! socket, or fill a file from a socket up to a declared size. Callers get a
//! callback after every chunk, which the server uses to checkpoint its
//! session and the client uses to drive its progress bar.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{Result, TransferError};
use crate::protocol::timeouts::MIN_ELAPSED_SECS;
use crate::protocol::BUFFER_SIZE;

/// Outcome of one completed transfer attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferStats {
    /// Resume point the attempt started from
    pub offset: u64,
    /// Declared total size of the payload
    pub total: u64,
    pub elapsed: Duration,
}

impl TransferStats {
    /// Bytes moved during this attempt.
    pub fn bytes(&self) -> u64 {
        self.total.saturating_sub(self.offset)
    }

    /// KB/s over this attempt, with elapsed floored to avoid division by zero.
    pub fn rate_kbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
        self.bytes() as f64 / secs / 1024.0
    }
}

/// Open the sink for a (possibly resumed) receive.
///
/// With `offset > 0` the existing partial file is kept, cut back to exactly
/// `offset` bytes, and positioned at its end. Otherwise it is truncated.
pub fn open_for_resume(path: &Path, offset: u64) -> Result<File> {
    if offset == 0 {
        return Ok(File::create(path)?);
    }
    let mut file = OpenOptions::new().write(true).create(true).open(path)?;
    // Bytes written after the last checkpoint are not trusted
    file.set_len(offset)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(file)
}

/// Fill `path` from `src` until it holds `total` bytes.
///
/// `on_chunk(received)` runs after every chunk is written, with the running
/// byte count including `offset`. A zero-length read before `total` is
/// reached fails with `ConnectionClosed`; checkpoints already taken stay.
pub fn receive_into_file<R, F>(
    src: &mut R,
    path: &Path,
    offset: u64,
    total: u64,
    mut on_chunk: F,
) -> Result<TransferStats>
where
    R: Read,
    F: FnMut(u64) -> Result<()>,
{
    let mut file = open_for_resume(path, offset)?;
    let start = Instant::now();
    let mut received = offset;
    let mut buf = vec![0u8; BUFFER_SIZE];
    while received < total {
        let to_read = (total - received).min(buf.len() as u64) as usize;
        let n = match src.read(&mut buf[..to_read]) {
            Ok(0) => return Err(TransferError::ConnectionClosed("transfer body")),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        file.write_all(&buf[..n])?;
        received += n as u64;
        on_chunk(received)?;
    }
    file.flush()?;
    Ok(TransferStats {
        offset,
        total,
        elapsed: start.elapsed(),
    })
}

/// Stream bytes `offset..total` of `path` into `dst`.
///
/// `on_chunk(sent)` runs after every chunk is handed to `dst`. The source
/// ending before `total` is an I/O error; the peer was promised `total`.
pub fn send_from_file<W, F>(
    dst: &mut W,
    path: &Path,
    offset: u64,
    total: u64,
    mut on_chunk: F,
) -> Result<TransferStats>
where
    W: Write,
    F: FnMut(u64) -> Result<()>,
{
    let mut file = File::open(path)?;
    let start = Instant::now();
    let mut sent = offset;
    if offset < total {
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; BUFFER_SIZE];
        while sent < total {
            let to_read = (total - sent).min(buf.len() as u64) as usize;
            let n = match file.read(&mut buf[..to_read]) {
                Ok(0) => {
                    return Err(TransferError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("{} shrank during transfer", path.display()),
                    )))
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            dst.write_all(&buf[..n])?;
            sent += n as u64;
            on_chunk(sent)?;
        }
    }
    dst.flush()?;
    Ok(TransferStats {
        offset,
        total,
        elapsed: start.elapsed(),
    })
}
