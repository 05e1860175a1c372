use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::net::TcpStream;

use tether::cli::ClientOpts;
use tether::client::{Client, Shell, ShellExit};
use tether::config::{self, ClientConfig};
use tether::net::{self, tune_socket};
use tether::paths::ensure_dir_exists;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted");
        // 128 + SIGINT
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = ClientOpts::parse();
    let mut cfg: ClientConfig = config::load(opts.config.as_deref())?;
    opts.apply(&mut cfg);

    ensure_dir_exists(&cfg.download_dir).with_context(|| {
        format!("Failed to create download dir: {}", cfg.download_dir.display())
    })?;

    let stream = net::connect(&cfg.host, cfg.port)
        .with_context(|| format!("Could not connect to {}:{}", cfg.host, cfg.port))?;
    println!("[CLIENT] Connected to {}:{}", cfg.host, cfg.port);

    let mut client = Client::new(stream, cfg.download_dir.clone()).with_progress(cfg.progress);
    let welcome = client
        .read_welcome()?
        .context("Server closed the connection before greeting")?;
    println!("[SERVER] {}", welcome);
    println!("Commands: ECHO <text>, TIME, UPLOAD <file>, DOWNLOAD <file>, CLOSE");

    let host = cfg.host.clone();
    let port = cfg.port;
    let connect = move || -> io::Result<TcpStream> {
        let s = TcpStream::connect((host.as_str(), port))?;
        tune_socket(&s);
        Ok(s)
    };

    let stdin = io::stdin();
    let mut shell = Shell::new(
        client,
        stdin.lock(),
        io::stdout(),
        cfg.reconnect_policy(),
        connect,
    );
    match shell.run()? {
        ShellExit::Closed => println!("[CLIENT] Disconnected"),
        ShellExit::Aborted => println!("[CLIENT] Gave up reconnecting"),
    }
    Ok(())
}
