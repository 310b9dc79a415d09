use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::App;
use crate::config::ServerConfig;
use crate::echo::demo_router;
use crate::middleware::StaticTokenVerifier;
use crate::server::{AppService, HttpServer, Principal};

#[derive(Parser)]
#[command(name = "gebeta")]
#[command(about = "Gebeta HTTP request core", long_about = None, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the demo echo routes through the full pipeline
    Serve {
        /// Listen address; overrides the config file and GEBETA_ADDR
        #[arg(long)]
        addr: Option<String>,

        /// YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bearer token accepted for the admin demo route
        #[arg(long, env = "GEBETA_ADMIN_TOKEN")]
        admin_token: Option<String>,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            addr,
            config,
            admin_token,
        } => serve(addr, config, admin_token),
    }
}

fn serve(addr: Option<String>, config: Option<PathBuf>, admin_token: Option<String>) -> Result<()> {
    let mut settings = ServerConfig::load(config.as_deref())?;
    if let Some(addr) = addr {
        settings.addr = addr;
    }
    may::config().set_stack_size(settings.core.stack_size);

    let mut verifier = StaticTokenVerifier::new();
    if let Some(token) = admin_token {
        verifier = verifier.with_token(token, Principal::new("admin", ["admin"]));
    }
    let router = demo_router(Arc::new(verifier)).context("Failed to build routes")?;
    let app = App::with_defaults(&settings.core, router).context("Invalid CORS configuration")?;

    info!(
        addr = %settings.addr,
        max_body_bytes = settings.core.max_body_bytes,
        allowed_origins = ?settings.core.allowed_origins,
        is_production = settings.core.is_production,
        stack_size = settings.core.stack_size,
        "Starting server"
    );
    let handle = HttpServer(AppService::new(app))
        .start(settings.addr.as_str())
        .with_context(|| format!("Failed to bind {}", settings.addr))?;
    handle
        .join()
        .map_err(|e| io::Error::other(format!("{e:?}")))
        .context("Server coroutine failed")?;
    Ok(())
}
