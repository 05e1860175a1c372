//! Shared CLI helpers and small reusable Clap fragments

use clap::Parser;
use std::path::PathBuf;

use crate::config::{ClientConfig, DaemonConfig};
use crate::net::IdentityMode;

/// Daemon options for tetherd. Anything left unset falls back to the
/// config file, then to the built-in defaults.
#[derive(Clone, Debug, Default, Parser)]
#[command(author, version, about = "tether daemon: line protocol with resumable UPLOAD/DOWNLOAD")]
pub struct DaemonOpts {
    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bind address (host:port) [default: 0.0.0.0:9090]
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory served to clients [default: server_files]
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Where resume checkpoints live [default: sessions]
    #[arg(long = "sessions-dir")]
    pub sessions_dir: Option<PathBuf>,

    /// Session identity: host (IP only) or peer (IP and port)
    #[arg(long)]
    pub identity: Option<IdentityMode>,

    /// Reject uploads declaring more than this many bytes
    #[arg(long = "max-upload-size")]
    pub max_upload_size: Option<u64>,

    /// Serve each connection on its own thread
    #[arg(long)]
    pub threaded: bool,

    /// Append server events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Log every received command
    #[arg(short, long)]
    pub verbose: bool,
}

impl DaemonOpts {
    /// Overlay explicitly given options onto `cfg`.
    pub fn apply(&self, cfg: &mut DaemonConfig) {
        if let Some(ref b) = self.bind {
            cfg.bind = b.clone();
        }
        if let Some(ref r) = self.root {
            cfg.root = r.clone();
        }
        if let Some(ref s) = self.sessions_dir {
            cfg.sessions_dir = s.clone();
        }
        if let Some(i) = self.identity {
            cfg.identity = i;
        }
        if self.max_upload_size.is_some() {
            cfg.max_upload_size = self.max_upload_size;
        }
        if self.log_file.is_some() {
            cfg.log_file = self.log_file.clone();
        }
        cfg.threaded |= self.threaded;
        cfg.verbose |= self.verbose;
    }
}

/// Interactive client options
#[derive(Clone, Debug, Default, Parser)]
#[command(author, version, about = "tether client: ECHO, TIME, UPLOAD, DOWNLOAD with resume")]
pub struct ClientOpts {
    /// Server host [default: 127.0.0.1]
    pub host: Option<String>,

    /// Server port [default: 9090]
    pub port: Option<u16>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where downloads are written [default: downloads]
    #[arg(long = "download-dir")]
    pub download_dir: Option<PathBuf>,

    /// Seconds of failed reconnects before asking whether to continue
    #[arg(long = "reconnect-timeout")]
    pub reconnect_timeout: Option<u64>,

    /// Seconds between reconnect attempts
    #[arg(long = "reconnect-delay")]
    pub reconnect_delay: Option<u64>,

    /// Hide transfer progress bars
    #[arg(long = "no-progress")]
    pub no_progress: bool,
}

impl ClientOpts {
    pub fn apply(&self, cfg: &mut ClientConfig) {
        if let Some(ref h) = self.host {
            cfg.host = h.clone();
        }
        if let Some(p) = self.port {
            cfg.port = p;
        }
        if let Some(ref d) = self.download_dir {
            cfg.download_dir = d.clone();
        }
        if let Some(t) = self.reconnect_timeout {
            cfg.reconnect_timeout_secs = t;
        }
        if let Some(d) = self.reconnect_delay {
            cfg.reconnect_delay_secs = d;
        }
        if self.no_progress {
            cfg.progress = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_no_args_keeps_defaults() {
        let opts = DaemonOpts::try_parse_from(["tetherd"]).unwrap();
        let mut cfg = DaemonConfig::default();
        opts.apply(&mut cfg);
        assert_eq!(cfg, DaemonConfig::default());
    }

    #[test]
    fn test_daemon_flags_override_config() {
        let opts = DaemonOpts::try_parse_from([
            "tetherd",
            "--bind",
            "127.0.0.1:7777",
            "--identity",
            "peer",
            "--max-upload-size",
            "2048",
            "--threaded",
        ])
        .unwrap();
        let mut cfg = DaemonConfig {
            root: PathBuf::from("/srv/files"),
            ..DaemonConfig::default()
        };
        opts.apply(&mut cfg);
        assert_eq!(cfg.bind, "127.0.0.1:7777");
        assert_eq!(cfg.identity, IdentityMode::Peer);
        assert_eq!(cfg.max_upload_size, Some(2048));
        assert!(cfg.threaded);
        // untouched by flags
        assert_eq!(cfg.root, PathBuf::from("/srv/files"));
    }

    #[test]
    fn test_daemon_rejects_bad_identity() {
        assert!(DaemonOpts::try_parse_from(["tetherd", "--identity", "mac"]).is_err());
    }

    #[test]
    fn test_client_positionals() {
        let opts = ClientOpts::try_parse_from(["tether", "10.0.0.2", "9191"]).unwrap();
        let mut cfg = ClientConfig::default();
        opts.apply(&mut cfg);
        assert_eq!(cfg.host, "10.0.0.2");
        assert_eq!(cfg.port, 9191);

        let opts = ClientOpts::try_parse_from(["tether"]).unwrap();
        let mut cfg = ClientConfig::default();
        opts.apply(&mut cfg);
        assert_eq!(cfg, ClientConfig::default());

        assert!(ClientOpts::try_parse_from(["tether", "host", "notaport"]).is_err());
    }
}
