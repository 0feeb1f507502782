// src/main.rs - Bridge entry point
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dremel_bridge::client::http::DremelClient;
use dremel_bridge::{load_config, Config, PrinterClient, SdIndex, Session};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dremel 3D45 virtual serial bridge
#[derive(Parser, Debug)]
#[command(name = "dremel-bridge", about = "Expose a Dremel 3D45 as a Marlin-compatible serial device.")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "dremel-bridge.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one virtual serial session per TCP connection
    Serve,
    /// Upload a GCode file to the printer and record it in the SD index
    Upload {
        file: PathBuf,
        /// Name the host should list the file under
        #[arg(long)]
        name: Option<String>,
    },
    /// Inspect or clear the persisted SD index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand, Debug)]
enum IndexAction {
    List,
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = cli.config.to_string_lossy().into_owned();
    tracing::info!("Loading configuration from: {}", config_path);
    let config = load_config(&config_path).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", config_path, e);
        Box::new(e) as BoxError
    })?;
    config.validate()?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Upload { file, name } => upload(config, file, name).await,
        Command::Index { action } => index(config, action).await,
    }
}

fn printer_client(config: &Config) -> Result<Arc<dyn PrinterClient>, BoxError> {
    let client = DremelClient::new(config.host(), config.request_timeout())?;
    Ok(Arc::new(client))
}

async fn serve(config: Config) -> Result<(), BoxError> {
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Virtual serial bridge listening on {}", addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                tracing::info!("Host connected from {}", peer);
                let config = config.clone();
                tokio::spawn(async move {
                    if let Err(e) = bridge_connection(stream, config).await {
                        tracing::warn!("Connection from {} ended with error: {}", peer, e);
                    }
                    tracing::info!("Host {} disconnected", peer);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down bridge");
                return Ok(());
            }
        }
    }
}

/// Pump bytes between one TCP stream and its own session.
async fn bridge_connection(stream: TcpStream, config: Config) -> Result<(), BoxError> {
    let session = Arc::new(Session::open(&config, printer_client(&config)?).await);
    let (mut reader, mut writer) = stream.into_split();

    let outbound = {
        let session = session.clone();
        tokio::spawn(async move {
            while session.is_open() {
                let line = session.read_line().await;
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    tracing::debug!("Socket write failed: {}", e);
                    break;
                }
            }
        })
    };

    let mut buf = [0u8; 4096];
    let result = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => {
                session.write(&buf[..n]).await;
            }
            Err(e) => break Err(e.into()),
        }
    };

    session.close().await;
    outbound.abort();
    result
}

async fn upload(config: Config, file: PathBuf, name: Option<String>) -> Result<(), BoxError> {
    let session = Session::open(&config, printer_client(&config)?).await;
    let result = session.upload_file(&file, name.as_deref()).await;
    session.close().await;
    let entry = result?;
    println!("{} -> {} ({} bytes)", entry.display, entry.remote, entry.size);
    Ok(())
}

async fn index(config: Config, action: IndexAction) -> Result<(), BoxError> {
    let Some(path) = config.sd_index_path() else {
        return Err("session.data_folder is not configured".into());
    };
    let mut index = SdIndex::load(Some(path)).await;
    match action {
        IndexAction::List => {
            for entry in index.snapshot() {
                println!("{}\t{}\t{}", entry.display, entry.remote, entry.size);
            }
        }
        IndexAction::Clear => {
            let count = index.clear();
            index.save().await?;
            println!("Cleared {} entries", count);
        }
    }
    Ok(())
}
