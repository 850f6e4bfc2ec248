#[macro_use]
extern crate log;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod config;
mod db;
mod indexer;
mod node;

use db::IndexStore;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// path to config file
    #[arg(short, long, default_value_t = String::from("config.toml"))]
    config: String,

    #[command(subcommand)]
    subcommand: Option<Subcommand>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.subcommand {
        None => run_indexer(&args.config).await,
        Some(subcmd) => subcmd.run(&args.config).await,
    }
}

#[derive(Debug, Parser)]
enum Subcommand {
    #[command(about = "Start the chain indexer")]
    Indexer,

    #[command(about = "Cleans all data from the index db")]
    ResetDB,

    #[command(about = "Print sync cursor and known tokens")]
    Status,
}

impl Subcommand {
    async fn run(&self, cfg_path: &str) -> anyhow::Result<()> {
        match self {
            Subcommand::Indexer => run_indexer(cfg_path).await,
            Subcommand::ResetDB => reset_db(cfg_path).await,
            Subcommand::Status => status(cfg_path).await,
        }
    }
}

async fn run_indexer(cfg_path: &str) -> anyhow::Result<()> {
    let cfg = config::read_config(cfg_path)?;

    let repo: db::Repo = db::open_postgres_db(cfg.db).await?;
    let store: Arc<dyn db::IndexStore> = Arc::new(repo);
    let chain: Arc<dyn node::ChainClient> = Arc::new(node::HttpChainClient::new(&cfg.node)?);

    let ledger = Arc::new(indexer::TokenLedger::new(store.clone(), chain.clone()));
    let orchestrator =
        indexer::SyncOrchestrator::new(chain, store, ledger.clone(), cfg.indexer.clone());

    let cancel = CancellationToken::new();
    let maintenance = indexer::Maintenance::new(
        ledger,
        Duration::from_secs(cfg.indexer.maintenance_interval_secs),
    );
    let maintenance_handle = maintenance.start(cancel.clone());

    orchestrator.start().await?;

    tokio::signal::ctrl_c().await?;
    // signal background tasks to stop running
    cancel.cancel();

    orchestrator.stop().await?;
    maintenance_handle.await?;

    log::info!("Application successfully shut down");

    Ok(())
}

async fn reset_db(cfg_path: &str) -> anyhow::Result<()> {
    let mut cfg = config::read_config(cfg_path)?;
    cfg.db.automigrate = false;

    let repo: db::Repo = db::open_postgres_db(cfg.db).await?;
    repo.reset_schema().await?;

    Ok(())
}

async fn status(cfg_path: &str) -> anyhow::Result<()> {
    let mut cfg = config::read_config(cfg_path)?;
    cfg.db.automigrate = false;

    let repo: db::Repo = db::open_postgres_db(cfg.db).await?;

    match repo.get_cursor().await? {
        Some(height) => println!("cursor:\t{}", height),
        None => println!("cursor:\t<empty>"),
    }

    let tokens = repo.list_tokens().await?;
    println!("tokens:\t{}", tokens.len());
    for token in tokens {
        println!(
            "  {}\t{}\t{}\tholders={}\ttransfers={}",
            token.contract_address, token.symbol, token.name, token.holder_count,
            token.transfer_count
        );
    }

    Ok(())
}
