use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lottery_client::bets::{BetSource, EagerBetSource, FileBetSource};
use lottery_client::shutdown::spawn_signal_listener;
use lottery_client::{ClientBuilder, ClientConfig, ClientError};

/// How the bets file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceMode {
    /// Load every batch before connecting.
    Eager,
    /// Read one batch at a time from the last offset.
    Resumable,
}

#[derive(Debug, Parser)]
#[command(name = "lottery-client", version, about = "Submit an agency's bets and fetch its winners")]
struct Args {
    /// JSON file with client settings; flags and environment override it.
    #[arg(long, env = "CLI_CONFIG")]
    config: Option<PathBuf>,

    /// Agency id.
    #[arg(long, env = "CLI_ID")]
    id: Option<String>,

    /// Server address as host:port.
    #[arg(long, env = "CLI_SERVER_ADDRESS")]
    server_address: Option<String>,

    #[arg(long, env = "CLI_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Maximum frame body size in bytes.
    #[arg(long, env = "CLI_MAX_MESSAGE_SIZE")]
    max_message_size: Option<usize>,

    /// Header width in digits.
    #[arg(long, env = "CLI_LENGTH_BYTES")]
    length_bytes: Option<usize>,

    /// Bets file. Defaults to `agency-<id>.csv` in the working directory.
    #[arg(long, env = "CLI_DATA_FILE")]
    data_file: Option<PathBuf>,

    #[arg(long, env = "CLI_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, env = "CLI_SOURCE_MODE", default_value_t = SourceMode::Resumable)]
    mode: SourceMode,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ClientError>() {
            Some(ClientError::Cancelled) => {
                info!("action: exit | result: interrupted");
                ExitCode::SUCCESS
            }
            _ => {
                error!("action: exit | result: fail | error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    let mut builder = ClientBuilder::from_config(config);
    if let Some(id) = args.id {
        builder = builder.agency_id(id);
    }
    if let Some(address) = args.server_address {
        builder = builder.server_address(address);
    }
    if let Some(size) = args.batch_size {
        builder = builder.batch_size(size);
    }
    if let Some(size) = args.max_message_size {
        builder = builder.max_message_size(size);
    }
    if let Some(width) = args.length_bytes {
        builder = builder.length_bytes(width);
    }

    let mut client = builder.build()?;
    let config = client.config();
    info!(
        "action: config | result: success | client_id: {} | server_address: {} | batch_size: {} | max_message_size: {} | length_bytes: {} | mode: {:?}",
        config.agency_id,
        config.server_address,
        config.batch_size,
        config.max_message_size,
        config.length_bytes,
        args.mode
    );

    let data_file = args
        .data_file
        .unwrap_or_else(|| PathBuf::from(format!("agency-{}.csv", config.agency_id)));
    let batch_size = config.batch_size;

    let cancel = client.cancel_token();
    let signals = spawn_signal_listener(cancel.clone());

    let mut source: Box<dyn BetSource> = match args.mode {
        SourceMode::Eager => Box::new(EagerBetSource::load(&data_file, batch_size, &cancel).await?),
        SourceMode::Resumable => Box::new(FileBetSource::new(&data_file, batch_size)),
    };

    let result = client.run(source.as_mut()).await;

    // Stop the signal task whatever the outcome
    cancel.cancel();
    let _ = signals.await;

    let winners = result?;
    info!(
        "action: exit | result: success | winners: {}",
        winners.documents.join(",")
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<ClientConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
