use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use tether::cli::DaemonOpts;
use tether::config::{self, DaemonConfig};
use tether::logger::{FanoutLogger, Logger, StderrLogger, TextLogger};
use tether::paths::ensure_dir_exists;
use tether::server::{serve, Sequential, ServerContext, ThreadPerConnection};
use tether::session::FileSessionStore;

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted");
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = DaemonOpts::parse();
    let mut cfg: DaemonConfig = config::load(opts.config.as_deref())?;
    opts.apply(&mut cfg);

    ensure_dir_exists(&cfg.root)
        .with_context(|| format!("Failed to create root directory: {}", cfg.root.display()))?;
    if !cfg.root.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", cfg.root.display());
    }
    let root = std::fs::canonicalize(&cfg.root)
        .with_context(|| format!("Failed to canonicalize root path: {}", cfg.root.display()))?;

    let store = FileSessionStore::new(&cfg.sessions_dir).with_context(|| {
        format!("Failed to open sessions dir: {}", cfg.sessions_dir.display())
    })?;

    let console: Box<dyn Logger> = Box::new(StderrLogger::new(cfg.verbose));
    let logger: Arc<dyn Logger> = match cfg.log_file {
        Some(ref path) => {
            let file = TextLogger::new(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Arc::new(FanoutLogger::new(vec![console, Box::new(file)]))
        }
        None => Arc::from(console),
    };

    println!("Starting tether daemon:");
    println!("  Root: {}", root.display());
    println!("  Sessions: {}", cfg.sessions_dir.display());
    println!("  Bind: {}", cfg.bind);
    println!("  Identity: {}", cfg.identity);
    if let Some(limit) = cfg.max_upload_size {
        println!("  Upload limit: {} bytes", limit);
    }

    let mut ctx = ServerContext::new(root, Arc::new(store));
    ctx.logger = logger;
    ctx.identity = cfg.identity;
    ctx.max_upload_size = cfg.max_upload_size;
    let ctx = Arc::new(ctx);

    if cfg.threaded {
        serve(&cfg.bind, ctx, &ThreadPerConnection)
    } else {
        serve(&cfg.bind, ctx, &Sequential)
    }
}
