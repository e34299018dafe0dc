use anyhow::Result;
use clap::{Parser, Subcommand};
use sessiongate::config::Config;
use sessiongate::security::AesEncryptor;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Cookie-session authentication gateway.
#[derive(Parser, Debug)]
#[command(name = "sessiongate", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override gateway.host
        #[arg(long)]
        host: Option<String>,
        /// Override gateway.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write a new random session key file
    Keygen {
        path: PathBuf,
        /// Replace an existing key (logs every user out)
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sessiongate=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.validate()?;
            sessiongate::run_gateway(config).await
        }
        Commands::Keygen { path, force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; pass --force to replace it",
                    path.display()
                );
            }
            AesEncryptor::generate_key_file(&path)?;
            println!("Wrote session key to {}", path.display());
            Ok(())
        }
    }
}
