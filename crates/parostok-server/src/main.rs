//! `parostok` command-line entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use parostok_core::CatalogConfig;
use parostok_provenance::{Market, RunStatus, SourceId};
use parostok_server::{init_tracing, App, Storage};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "parostok", version, about = "Provenance-verified hybrid catalog")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config
    #[arg(long, global = true)]
    bind: Option<SocketAddr>,

    /// SQLite database path, overrides the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Fallback snapshot path, overrides the config
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Keep catalog state in memory only
    #[arg(long, global = true)]
    in_memory: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve,
    /// Write the fallback snapshot and exit
    Snapshot,
    /// Print the source registry
    Sources,
    /// Run one update job in-process and print its log
    Update {
        /// Market to update, repeatable
        #[arg(long = "market")]
        markets: Vec<String>,
        /// Source to run, repeatable
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Fetch and log without writing
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<CatalogConfig> {
        let mut config = match &self.config {
            Some(path) => CatalogConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => CatalogConfig::new(),
        };
        if let Some(bind) = self.bind {
            config = config.with_bind(bind);
        }
        if let Some(path) = &self.database {
            config = config.with_database_path(path);
        }
        if let Some(path) = &self.snapshot {
            config = config.with_snapshot_path(path);
        }
        Ok(config)
    }

    fn storage(&self) -> Storage {
        if self.in_memory {
            Storage::Memory
        } else {
            Storage::Sqlite
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json).context("installing tracing subscriber")?;

    let config = cli.load_config()?;
    let app = App::new(config, cli.storage()).context("starting catalog service")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            app.serve().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Snapshot => {
            match app.orchestrator().publish_snapshot().await? {
                Some(receipt) => println!(
                    "{} hybrids, {} bytes, sha256 {} -> {}",
                    receipt.hybrids,
                    receipt.bytes,
                    receipt.digest,
                    receipt.path.display()
                ),
                None => println!("No snapshot publisher configured"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sources => {
            let overview = app.orchestrator().sources().await?;
            for status in &overview.sources {
                let source = &status.source;
                let state = if source.enabled { "enabled" } else { "disabled" };
                match &source.reason {
                    Some(reason) => {
                        println!("{:<20} {:<3} {:<8} {}", source.id, source.market, state, reason);
                    }
                    None => println!("{:<20} {:<3} {}", source.id, source.market, state),
                }
            }
            if let Some(run) = overview.latest_run {
                println!("latest run: {} {}", run.job_id, run.status);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Update {
            markets,
            sources,
            dry_run,
        } => {
            let markets = (!markets.is_empty()).then(|| markets.iter().map(Market::new).collect());
            let sources =
                (!sources.is_empty()).then(|| sources.into_iter().map(SourceId::new).collect());
            let request = app.config().resolve_request(markets, sources, dry_run);

            let orchestrator = app.orchestrator();
            let job_id = orchestrator.submit(request);
            let run = orchestrator.wait(job_id, Duration::from_millis(200)).await?;

            for line in &run.step_logs {
                println!("{} {}", line.at.format("%H:%M:%S"), line.message);
            }
            println!("{}: {}", run.job_id, run.status);
            let counts = run.counts;
            println!(
                "discovered={} parsed={} added={} updated={} unchanged={} skipped={} errors={}",
                counts.discovered,
                counts.parsed,
                counts.added,
                counts.updated,
                counts.unchanged,
                counts.skipped,
                counts.errors
            );

            Ok(if run.status == RunStatus::Succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
