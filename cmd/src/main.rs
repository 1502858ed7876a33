use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use abi::config::Config;
use abi::errors::{Error, Result};
use db::DocumentStore;
use healer::HealerService;

mod logging;

#[derive(Debug, Parser)]
#[command(name = "friendgraph", version, about = "friend requests and friendships")]
struct Cli {
    /// path of the yaml config
    #[arg(short, long, default_value = "./config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// http api only
    Serve,
    /// reciprocity healer only
    Healer,
    /// api and healer in one process, the default
    All,
    /// print a bearer token for USER_ID
    Token { user_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    if let Some(Command::Token { user_id }) = &cli.command {
        let token = api::gen_token(&config.jwt.secret, user_id, config.jwt.expires_secs)?;
        println!("{}", token);
        return Ok(());
    }

    let _guard = logging::init(&config.log);
    info!("config loaded from {}", cli.config.display());
    let store = db::store(&config).await?;

    match cli.command.unwrap_or(Command::All) {
        Command::Serve => api::start(&config, store).await,
        Command::Healer => {
            if !config.healer.enabled {
                warn!("healer.enabled is false, nothing to run");
                return Ok(());
            }
            run_healer(&config, store).await
        }
        Command::All => run_all(config, store).await,
        Command::Token { .. } => Ok(()),
    }
}

async fn run_healer(config: &Config, store: Arc<dyn DocumentStore>) -> Result<()> {
    HealerService::new(store, &config.healer).run().await
}

async fn run_all(config: Config, store: Arc<dyn DocumentStore>) -> Result<()> {
    let cloned_config = config.clone();
    let cloned_store = store.clone();
    let api_server =
        tokio::spawn(async move { api::start(&cloned_config, cloned_store).await });

    if !config.healer.enabled {
        info!("healer disabled");
        return joined(api_server.await);
    }
    let healer = tokio::spawn(async move { run_healer(&config, store).await });

    // either one stopping takes the process down
    tokio::select! {
        result = api_server => joined(result),
        result = healer => joined(result),
    }
}

fn joined(result: Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("service stopped: {}", e);
            Err(e)
        }
        Err(e) => Err(Error::internal(e)),
    }
}
