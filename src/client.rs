//! Client side: one protocol exchange per command, plus the interactive
//! shell that recovers from dropped connections.

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::codec::{encode_size_header, recv_line, send_line, split_command};
use crate::error::{Result, TransferError};
use crate::paths::{base_name, ensure_dir_exists};
use crate::protocol::{cmd, reply};
use crate::reconnect::{reconnect, LinePrompt, ReconnectPolicy, Reconnected};
use crate::transfer::{receive_into_file, send_from_file, TransferStats};

#[derive(Debug)]
pub struct UploadReport {
    /// Server's final `OK ...` line
    pub reply: String,
    pub stats: TransferStats,
}

#[derive(Debug)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub stats: TransferStats,
}

/// Issues commands over one live connection.
pub struct Client<S> {
    stream: S,
    download_dir: PathBuf,
    show_progress: bool,
}

impl<S: Read + Write> Client<S> {
    pub fn new(stream: S, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            stream,
            download_dir: download_dir.into(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Swap in a fresh connection after a reconnect.
    pub fn replace_stream(&mut self, stream: S) {
        self.stream = stream;
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Read the greeting the server sends on accept.
    pub fn read_welcome(&mut self) -> Result<Option<String>> {
        recv_line(&mut self.stream)
    }

    /// Send a plain one-line command (ECHO, TIME, anything unknown) and
    /// return the single reply line.
    pub fn command(&mut self, line: &str) -> Result<String> {
        send_line(&mut self.stream, line)?;
        recv_line(&mut self.stream)?.ok_or(TransferError::ConnectionClosed("command reply"))
    }

    /// Send CLOSE; the server's `BYE` if it answered.
    pub fn close(&mut self) -> Result<Option<String>> {
        send_line(&mut self.stream, cmd::CLOSE)?;
        recv_line(&mut self.stream)
    }

    /// Upload `local`, resuming from whatever offset the server reports.
    pub fn upload(&mut self, local: &Path) -> Result<UploadReport> {
        let total = match fs::metadata(local) {
            Ok(md) if md.is_file() => md.len(),
            _ => return Err(TransferError::NotFound(local.display().to_string())),
        };
        let name = base_name(&local.to_string_lossy()).ok_or_else(|| {
            TransferError::Validation(format!("invalid filename '{}'", local.display()))
        })?;

        send_line(&mut self.stream, &format!("{} {}", cmd::UPLOAD, name))?;
        let response = recv_line(&mut self.stream)?
            .ok_or(TransferError::ConnectionClosed("upload handshake"))?;
        let offset = reply::parse_keyword_u64(&response, reply::OFFSET)
            .ok_or_else(|| TransferError::Protocol(format!("unexpected reply: {}", response)))?;

        let start = Instant::now();
        self.stream.write_all(&encode_size_header(total))?;
        let bar = self.progress_bar(total, offset);
        let sent = send_from_file(&mut self.stream, local, offset, total, |n| {
            bar.set_position(n);
            Ok(())
        });
        bar.finish_and_clear();
        sent?;

        let result = recv_line(&mut self.stream)?
            .ok_or(TransferError::ConnectionClosed("upload result"))?;
        if reply::is_error(&result) {
            return Err(TransferError::Protocol(result));
        }
        Ok(UploadReport {
            reply: result,
            stats: TransferStats {
                offset,
                total,
                elapsed: start.elapsed(),
            },
        })
    }

    /// Download `name` into the download directory, appending to a partial
    /// local copy when one exists.
    pub fn download(&mut self, name: &str) -> Result<DownloadReport> {
        let name = base_name(name)
            .ok_or_else(|| TransferError::Validation("missing filename".to_string()))?;
        let local = self.download_dir.join(&name);
        let offset = fs::metadata(&local).map(|m| m.len()).unwrap_or(0);

        send_line(&mut self.stream, &format!("{} {}", cmd::DOWNLOAD, name))?;
        send_line(&mut self.stream, &reply::offset(offset))?;
        let response = recv_line(&mut self.stream)?
            .ok_or(TransferError::ConnectionClosed("download handshake"))?;
        if response == reply::FILE_NOT_FOUND {
            return Err(TransferError::NotFound(name));
        }
        if reply::is_error(&response) {
            return Err(TransferError::Protocol(response));
        }
        let total = reply::parse_keyword_u64(&response, reply::SIZE)
            .ok_or_else(|| TransferError::Protocol(format!("unexpected reply: {}", response)))?;
        if offset > total {
            // Stale copy of an older, longer file; the server streams
            // nothing for this request, so start clean on the next one
            fs::File::create(&local)?;
            return Err(TransferError::Protocol(format!(
                "local '{}' was larger than the server copy ({} > {} bytes); discarded, reissue DOWNLOAD",
                name, offset, total
            )));
        }

        ensure_dir_exists(&self.download_dir)?;
        let bar = self.progress_bar(total, offset);
        let received = receive_into_file(&mut self.stream, &local, offset, total, |n| {
            bar.set_position(n);
            Ok(())
        });
        bar.finish_and_clear();
        Ok(DownloadReport {
            path: local,
            stats: received?,
        })
    }

    fn progress_bar(&self, total: u64, offset: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.green} {bytes}/{total_bytes} {binary_bytes_per_sec}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_position(offset.min(total));
        bar
    }
}

/// How an interactive session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ShellExit {
    /// CLOSE/EXIT/QUIT or end of input
    Closed,
    /// Operator declined to keep reconnecting
    Aborted,
}

/// Interactive command loop with reconnect-on-failure.
pub struct Shell<S, R, W, C> {
    client: Client<S>,
    input: R,
    out: W,
    policy: ReconnectPolicy,
    connect: C,
}

impl<S, R, W, C> Shell<S, R, W, C>
where
    S: Read + Write,
    R: BufRead,
    W: Write,
    C: FnMut() -> io::Result<S>,
{
    pub fn new(client: Client<S>, input: R, out: W, policy: ReconnectPolicy, connect: C) -> Self {
        Self {
            client,
            input,
            out,
            policy,
            connect,
        }
    }

    pub fn client_mut(&mut self) -> &mut Client<S> {
        &mut self.client
    }

    pub fn run(&mut self) -> Result<ShellExit> {
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;
            let mut raw = String::new();
            if self.input.read_line(&mut raw)? == 0 {
                return Ok(ShellExit::Closed);
            }
            let line = raw.trim();
            let Some((verb, args)) = split_command(line) else {
                continue;
            };

            let outcome = match verb.as_str() {
                cmd::UPLOAD => self.upload(args),
                cmd::DOWNLOAD => self.download(args),
                cmd::CLOSE | cmd::EXIT | cmd::QUIT => {
                    match self.client.close() {
                        Ok(Some(bye)) => writeln!(self.out, "[SERVER] {}", bye)?,
                        Ok(None) => {}
                        Err(e) => writeln!(self.out, "[CLIENT] {}", e)?,
                    }
                    return Ok(ShellExit::Closed);
                }
                _ => self.plain(line),
            };

            if let Err(e) = outcome {
                writeln!(self.out, "[CLIENT] Error: {}", e)?;
                if e.is_connection_fault() && !self.recover()? {
                    writeln!(self.out, "[CLIENT] Shutting down")?;
                    return Ok(ShellExit::Aborted);
                }
            }
        }
    }

    fn plain(&mut self, line: &str) -> Result<()> {
        let resp = self.client.command(line)?;
        writeln!(self.out, "[SERVER] {}", resp)?;
        Ok(())
    }

    fn upload(&mut self, args: &str) -> Result<()> {
        if args.is_empty() {
            return Err(TransferError::Validation("missing filename".to_string()));
        }
        let report = self.client.upload(Path::new(args))?;
        writeln!(self.out, "[SERVER] {}", report.reply)?;
        writeln!(
            self.out,
            "[CLIENT] Resumed at byte {} of {}, rate {:.1} KB/s",
            report.stats.offset,
            report.stats.total,
            report.stats.rate_kbps()
        )?;
        Ok(())
    }

    fn download(&mut self, args: &str) -> Result<()> {
        if args.is_empty() {
            return Err(TransferError::Validation("missing filename".to_string()));
        }
        let report = self.client.download(args)?;
        writeln!(
            self.out,
            "[CLIENT] Saved '{}' ({} bytes, from offset {}), rate {:.1} KB/s",
            report.path.display(),
            report.stats.total,
            report.stats.offset,
            report.stats.rate_kbps()
        )?;
        Ok(())
    }

    /// Run a reconnect cycle; `false` when the operator gave up.
    fn recover(&mut self) -> Result<bool> {
        let mut prompt = LinePrompt::new(&mut self.input);
        let out = &mut self.out;
        let mut progress_err: Option<io::Error> = None;
        let outcome = reconnect(&self.policy, &mut self.connect, &mut prompt, |n| {
            if let Err(e) = writeln!(out, "[CLIENT] Reconnect attempt #{}...", n) {
                progress_err.get_or_insert(e);
            }
        });
        let recovered = match outcome {
            Reconnected::Connected { stream, welcome } => {
                self.client.replace_stream(stream);
                writeln!(self.out, "[CLIENT] Reconnected")?;
                writeln!(self.out, "[SERVER] {}", welcome)?;
                true
            }
            Reconnected::Aborted => false,
        };
        // The new stream is already installed; report a broken console after
        if let Some(e) = progress_err {
            return Err(e.into());
        }
        Ok(recovered)
    }
}
