//! Daemon side: accept loop, per-connection command dispatch and the
//! server half of UPLOAD/DOWNLOAD.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::Context;

use crate::codec::{read_size_header, recv_line, send_line, split_command};
use crate::error::{Result, TransferError};
use crate::logger::{Logger, NoopLogger};
use crate::net::{tune_socket, IdentityMode};
use crate::paths::resolve_in_root;
use crate::protocol::{cmd, reply, WELCOME};
use crate::session::{ActiveTransfers, Direction, SessionKey, SessionStore};
use crate::transfer::{receive_into_file, send_from_file};

/// Everything a connection needs, shared across handlers.
pub struct ServerContext {
    /// Directory UPLOAD writes into and DOWNLOAD reads from
    pub root: PathBuf,
    pub store: Arc<dyn SessionStore>,
    pub logger: Arc<dyn Logger>,
    pub identity: IdentityMode,
    /// Reject UPLOAD declarations above this many bytes
    pub max_upload_size: Option<u64>,
    /// Keys claimed by a running transfer; a second claimant gets `ERROR:`
    pub active: ActiveTransfers,
}

impl ServerContext {
    pub fn new(root: PathBuf, store: Arc<dyn SessionStore>) -> Self {
        Self {
            root,
            store,
            logger: Arc::new(NoopLogger),
            identity: IdentityMode::default(),
            max_upload_size: None,
            active: ActiveTransfers::new(),
        }
    }
}

/// What the dispatcher wants after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Strategy for servicing an accepted connection.
pub trait ConnectionHandler {
    fn handle(&self, stream: TcpStream, peer: SocketAddr, ctx: &Arc<ServerContext>);
}

/// Serve each connection to completion before accepting the next.
pub struct Sequential;

impl ConnectionHandler for Sequential {
    fn handle(&self, stream: TcpStream, peer: SocketAddr, ctx: &Arc<ServerContext>) {
        serve_connection(stream, peer, ctx);
    }
}

/// One OS thread per connection. A transfer claims its session key in
/// `ServerContext::active` for its whole run; record access is serialized
/// by the store.
pub struct ThreadPerConnection;

impl ConnectionHandler for ThreadPerConnection {
    fn handle(&self, stream: TcpStream, peer: SocketAddr, ctx: &Arc<ServerContext>) {
        let shared = Arc::clone(ctx);
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", peer))
            .spawn(move || serve_connection(stream, peer, &shared));
        if let Err(e) = spawned {
            ctx.logger
                .error("spawn", &format!("handler for {}: {}", peer, e));
        }
    }
}

pub fn serve<H: ConnectionHandler>(
    bind: &str,
    ctx: Arc<ServerContext>,
    handler: &H,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).with_context(|| format!("bind {}", bind))?;
    eprintln!(
        "tetherd listening on {} root={}",
        bind,
        ctx.root.display()
    );
    serve_listener(listener, ctx, handler)
}

pub fn serve_listener<H: ConnectionHandler>(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    handler: &H,
) -> anyhow::Result<()> {
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                tune_socket(&stream);
                match stream.peer_addr() {
                    Ok(peer) => handler.handle(stream, peer, &ctx),
                    Err(e) => ctx.logger.error("peer_addr", &e.to_string()),
                }
            }
            Err(e) => {
                ctx.logger.error("accept", &e.to_string());
            }
        }
    }
    Ok(())
}

/// Run one connection to its end and log how it ended. Never panics the
/// accept loop; errors stay scoped to this connection.
pub fn serve_connection(mut stream: TcpStream, peer: SocketAddr, ctx: &ServerContext) {
    let client = ctx.identity.identity(&peer);
    ctx.logger.connected(&peer.to_string());
    if let Err(e) = run_session(&mut stream, &client, ctx) {
        ctx.logger.error(
            "connection",
            &format!("{} (possible client disconnect): {}", peer, e),
        );
    }
    ctx.logger.disconnected(&peer.to_string());
}

/// Welcome the peer, then dispatch lines until CLOSE or end of stream.
pub fn run_session<S: Read + Write>(
    stream: &mut S,
    client: &str,
    ctx: &ServerContext,
) -> Result<()> {
    send_line(stream, WELCOME)?;
    while let Some(line) = recv_line(stream)? {
        ctx.logger.command(client, &line);
        if dispatch(stream, &line, client, ctx)? == Flow::Close {
            break;
        }
    }
    Ok(())
}

/// Handle one command line.
pub fn dispatch<S: Read + Write>(
    stream: &mut S,
    line: &str,
    client: &str,
    ctx: &ServerContext,
) -> Result<Flow> {
    let Some((verb, args)) = split_command(line) else {
        return Ok(Flow::Continue);
    };
    match verb.as_str() {
        cmd::ECHO => handle_echo(stream, args)?,
        cmd::TIME => handle_time(stream)?,
        cmd::CLOSE | cmd::EXIT | cmd::QUIT => {
            send_line(stream, reply::BYE)?;
            return Ok(Flow::Close);
        }
        cmd::UPLOAD => handle_upload(stream, args, client, ctx)?,
        cmd::DOWNLOAD => handle_download(stream, args, client, ctx)?,
        other => send_line(stream, &reply::unknown_command(other))?,
    }
    Ok(Flow::Continue)
}

fn handle_echo<W: Write>(stream: &mut W, args: &str) -> Result<()> {
    send_line(stream, if args.is_empty() { reply::EMPTY_ECHO } else { args })
}

fn handle_time<W: Write>(stream: &mut W) -> Result<()> {
    let now = chrono::Local::now().format(reply::TIME_FORMAT).to_string();
    send_line(stream, &now)
}

/// Stored offset, clamped to what is actually on disk.
pub fn resume_offset(store: &dyn SessionStore, key: &SessionKey, path: &Path) -> Result<u64> {
    let stored = store.load(key)?;
    let on_disk = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    Ok(stored.min(on_disk))
}

fn handle_upload<S: Read + Write>(
    stream: &mut S,
    args: &str,
    client: &str,
    ctx: &ServerContext,
) -> Result<()> {
    if args.is_empty() {
        return send_line(stream, reply::MISSING_FILENAME);
    }
    let Ok((name, path)) = resolve_in_root(&ctx.root, args) else {
        return send_line(stream, reply::INVALID_FILENAME);
    };
    let key = SessionKey::new(client, Direction::Upload, &name);
    let Some(claim) = ctx.active.try_claim(&key) else {
        return send_line(stream, reply::TRANSFER_BUSY);
    };
    let offset = resume_offset(ctx.store.as_ref(), &key, &path)?;
    send_line(stream, &reply::offset(offset))?;

    let total = read_size_header(stream)?;
    if let Some(limit) = ctx.max_upload_size {
        if total > limit {
            // The body is already in flight; the connection cannot be reused
            send_line(
                stream,
                &format!("{}: declared size {} exceeds limit {}", reply::ERROR, total, limit),
            )?;
            return Err(TransferError::TooLarge {
                declared: total,
                limit,
            });
        }
    }
    if total < offset {
        ctx.store.delete(&key)?;
        return send_line(
            stream,
            &format!(
                "{}: declared size {} is smaller than offset {}",
                reply::ERROR,
                total,
                offset
            ),
        );
    }

    let store = ctx.store.as_ref();
    match receive_into_file(stream, &path, offset, total, |n| store.save(&key, n)) {
        Ok(stats) => {
            store.delete(&key)?;
            // Free the key before OK reaches the peer
            drop(claim);
            ctx.logger
                .transfer_done(client, Direction::Upload, &name, &stats);
            send_line(stream, &reply::upload_ok(total, stats.rate_kbps()))
        }
        Err(e) => {
            ctx.logger
                .transfer_failed(client, Direction::Upload, &name, &e.to_string());
            Err(e)
        }
    }
}

/// Offset from the client's `OFFSET <n>` line; anything unparsable is 0.
pub fn parse_client_offset(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn handle_download<S: Read + Write>(
    stream: &mut S,
    args: &str,
    client: &str,
    ctx: &ServerContext,
) -> Result<()> {
    if args.is_empty() {
        return send_line(stream, reply::MISSING_FILENAME);
    }
    // The client sends its OFFSET line right behind the request; consume it
    // before any early reply so it is never dispatched as a command
    let offset_line = recv_line(stream)?.ok_or(TransferError::ConnectionClosed("download handshake"))?;
    let offset = parse_client_offset(&offset_line);

    let Ok((name, path)) = resolve_in_root(&ctx.root, args) else {
        return send_line(stream, reply::INVALID_FILENAME);
    };
    let total = match std::fs::metadata(&path) {
        Ok(md) if md.is_file() => md.len(),
        _ => return send_line(stream, reply::FILE_NOT_FOUND),
    };
    let key = SessionKey::new(client, Direction::Download, &name);
    let Some(_claim) = ctx.active.try_claim(&key) else {
        return send_line(stream, reply::TRANSFER_BUSY);
    };
    send_line(stream, &reply::size(total))?;

    let store = ctx.store.as_ref();
    match send_from_file(stream, &path, offset, total, |n| store.save(&key, n)) {
        Ok(stats) => {
            store.delete(&key)?;
            ctx.logger
                .transfer_done(client, Direction::Download, &name, &stats);
            Ok(())
        }
        Err(e) => {
            ctx.logger
                .transfer_failed(client, Direction::Download, &name, &e.to_string());
            Err(e)
        }
    }
}
