use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tollgate_lib::composition;
use tollgate_lib::container::ServiceCollection;
use tracing_subscriber::EnvFilter;

/// OAuth 2.0 / OpenID Connect authorization server.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version)]
struct Args {
    /// JSON options file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    // `log` records from the library are bridged into the subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    tracing::info!("tollgate starting");

    let server = match &args.config {
        Some(path) => composition::assemble_from_file(ServiceCollection::new(), path)
            .with_context(|| format!("assembling from {}", path.display()))?,
        None => composition::assemble(ServiceCollection::new()).context("assembling defaults")?,
    };

    tollgate_lib::host::serve(Arc::new(server), args.bind)
        .await
        .inspect_err(|e| tracing::error!("serving error: {e}"))?;
    Ok(())
}
