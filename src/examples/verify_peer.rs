use clap::Parser;
use schema_checksum::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Compare local checksums against a running peer
#[derive(Parser, Debug)]
#[command(name = "verify_peer")]
struct Args {
    /// JSON schema the client was built from
    #[arg(short, long, default_value = "schemas/client.json")]
    schema: PathBuf,

    /// Optional JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Peer address, overrides the config
    #[arg(short, long)]
    addr: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(addr) = args.addr {
        config.exchange.addr = addr;
    }

    let registry = Registry::load(&args.schema)?;
    let peer = RemoteChecksums::from_config(config.exchange.clone());
    println!("Verifying {} local types against {}", registry.len(), peer.addr());

    let verification = verify_peer(&registry, &peer)?;
    for (name, class) in verification.iter() {
        match class {
            Compatibility::Match => println!("   ok        {}", name),
            Compatibility::Mismatch { local, remote } => {
                println!("   MISMATCH  {} (local {}, remote {})", name, local, remote)
            }
            Compatibility::Unknown { .. } => println!("   unknown   {}", name),
        }
    }

    config.policy.enforce(&verification)?;
    println!("Peer is compatible");

    Ok(())
}
