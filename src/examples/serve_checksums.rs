use clap::Parser;
use schema_checksum::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Serve a schema's checksums to peers
#[derive(Parser, Debug)]
#[command(name = "serve_checksums")]
struct Args {
    /// JSON schema emitted by the schema compiler
    #[arg(short, long, default_value = "schemas/server.json")]
    schema: PathBuf,

    /// Optional JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config
    #[arg(short, long)]
    addr: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(addr) = args.addr {
        config.exchange.addr = addr;
    }

    // A schema that fails to build must stop the process before it serves.
    let registry = Arc::new(Registry::load(&args.schema)?);
    for (name, sum) in registry.iter() {
        println!("   {} {}", sum, name);
    }

    let server = ExchangeServer::bind(config.exchange, registry)?;
    println!("Serving checksums on {}", server.local_addr()?);
    server.serve()?;

    Ok(())
}
