//! Socket plumbing: connect, keepalive tuning and client identity

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
#[cfg(target_os = "linux")]
use crate::protocol::timeouts::{KEEPALIVE_COUNT, KEEPALIVE_IDLE_SECS, KEEPALIVE_INTERVAL_SECS};

/// How a connection's session-partitioning identity is derived.
///
/// `Peer` is the literal (IP, port) keying; `Host` is the default so a
/// reconnect from a new port resumes its transfers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Source IP only; a reconnect from a new port finds its sessions again
    #[default]
    Host,
    /// Source IP and port; every physical connection is its own client
    Peer,
}

impl IdentityMode {
    pub fn identity(&self, addr: &SocketAddr) -> String {
        match self {
            IdentityMode::Host => addr.ip().to_string(),
            IdentityMode::Peer => addr.to_string(),
        }
    }
}

impl fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityMode::Host => f.write_str("host"),
            IdentityMode::Peer => f.write_str("peer"),
        }
    }
}

impl FromStr for IdentityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(IdentityMode::Host),
            "peer" => Ok(IdentityMode::Peer),
            other => Err(format!("unknown identity mode '{}' (expected host|peer)", other)),
        }
    }
}

/// Connect and tune a client socket.
pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port))?;
    tune_socket(&stream);
    Ok(stream)
}

// Socket tuning: disable Nagle for the line protocol and enable keepalive so
// a silently dead peer is eventually noticed mid-transfer
#[allow(unused_variables)]
pub fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    #[cfg(unix)]
    {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        unsafe {
            let keepalive: libc::c_int = 1;
            let _ = libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &keepalive as *const _ as *const libc::c_void,
                std::mem::size_of_val(&keepalive) as libc::socklen_t,
            );

            #[cfg(target_os = "linux")]
            {
                for (opt, val) in [
                    (libc::TCP_KEEPIDLE, KEEPALIVE_IDLE_SECS),
                    (libc::TCP_KEEPINTVL, KEEPALIVE_INTERVAL_SECS),
                    (libc::TCP_KEEPCNT, KEEPALIVE_COUNT),
                ] {
                    let v = val as libc::c_int;
                    let _ = libc::setsockopt(
                        fd,
                        libc::IPPROTO_TCP,
                        opt,
                        &v as *const _ as *const libc::c_void,
                        std::mem::size_of_val(&v) as libc::socklen_t,
                    );
                }
            }
        }
    }
}
