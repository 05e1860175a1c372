use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::session::Direction;
use crate::transfer::TransferStats;

/// Server event sink. Every hook defaults to a no-op.
pub trait Logger: Send + Sync {
    fn connected(&self, _client: &str) {}
    fn command(&self, _client: &str, _line: &str) {}
    fn transfer_done(&self, _client: &str, _dir: Direction, _file: &str, _stats: &TransferStats) {}
    fn transfer_failed(&self, _client: &str, _dir: Direction, _file: &str, _msg: &str) {}
    fn disconnected(&self, _client: &str) {}
    fn error(&self, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Daemon console output on stderr.
pub struct StderrLogger {
    verbose: bool,
}

impl StderrLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Logger for StderrLogger {
    fn connected(&self, client: &str) {
        eprintln!("[tetherd] connected {}", client);
    }
    fn command(&self, client: &str, line: &str) {
        if self.verbose {
            eprintln!("[tetherd] {} -> {:?}", client, line);
        }
    }
    fn transfer_done(&self, client: &str, dir: Direction, file: &str, stats: &TransferStats) {
        eprintln!(
            "[tetherd] {} {} {} done: offset={} size={} rate={:.1} KB/s",
            client,
            dir,
            file,
            stats.offset,
            stats.total,
            stats.rate_kbps()
        );
    }
    fn transfer_failed(&self, client: &str, dir: Direction, file: &str, msg: &str) {
        eprintln!("[tetherd] {} {} {} interrupted: {}", client, dir, file, msg);
    }
    fn disconnected(&self, client: &str) {
        eprintln!("[tetherd] {} closed", client);
    }
    fn error(&self, context: &str, msg: &str) {
        eprintln!("[tetherd] error ctx={} msg={}", context, msg);
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn connected(&self, client: &str) {
        self.line(&format!("CONNECT client={}", client));
    }
    fn command(&self, client: &str, line: &str) {
        self.line(&format!("CMD client={} line={:?}", client, line));
    }
    fn transfer_done(&self, client: &str, dir: Direction, file: &str, stats: &TransferStats) {
        self.line(&format!(
            "DONE client={} dir={} file={} offset={} size={} kbps={:.1}",
            client,
            dir,
            file,
            stats.offset,
            stats.total,
            stats.rate_kbps()
        ));
    }
    fn transfer_failed(&self, client: &str, dir: Direction, file: &str, msg: &str) {
        self.line(&format!(
            "INTERRUPTED client={} dir={} file={} msg={}",
            client, dir, file, msg
        ));
    }
    fn disconnected(&self, client: &str) {
        self.line(&format!("CLOSE client={}", client));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
}

/// Forwards every event to each inner logger in order.
pub struct FanoutLogger {
    inner: Vec<Box<dyn Logger>>,
}

impl FanoutLogger {
    pub fn new(inner: Vec<Box<dyn Logger>>) -> Self {
        Self { inner }
    }
}

impl Logger for FanoutLogger {
    fn connected(&self, client: &str) {
        self.inner.iter().for_each(|l| l.connected(client));
    }
    fn command(&self, client: &str, line: &str) {
        self.inner.iter().for_each(|l| l.command(client, line));
    }
    fn transfer_done(&self, client: &str, dir: Direction, file: &str, stats: &TransferStats) {
        self.inner
            .iter()
            .for_each(|l| l.transfer_done(client, dir, file, stats));
    }
    fn transfer_failed(&self, client: &str, dir: Direction, file: &str, msg: &str) {
        self.inner
            .iter()
            .for_each(|l| l.transfer_failed(client, dir, file, msg));
    }
    fn disconnected(&self, client: &str) {
        self.inner.iter().for_each(|l| l.disconnected(client));
    }
    fn error(&self, context: &str, msg: &str) {
        self.inner.iter().for_each(|l| l.error(context, msg));
    }
}
