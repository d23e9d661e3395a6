use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobscout_core::PortalStatus;
use jobscout_sync::{
    build_fetcher, Orchestrator, PgJobStore, ProgressEvent, ScrapePipeline, SourceRegistry,
    SyncConfig,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "jobscout")]
#[command(about = "Scrape job portals, dedup postings and store what is new")]
struct Cli {
    /// Directory holding sources.yaml; overrides JOBSCOUT_WORKSPACE_ROOT.
    #[arg(long, global = true)]
    workspace_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every enabled portal once.
    Scrape,
    /// Check whether each enabled portal answers.
    Probe,
    Migrate,
    /// Run scrapes on JOBSCOUT_SYNC_CRON until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env();
    if let Some(root) = cli.workspace_root {
        config.workspace_root = root;
    }

    match cli.command.unwrap_or(Commands::Scrape) {
        Commands::Scrape => scrape(config).await?,
        Commands::Probe => probe(config).await?,
        Commands::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to run migrations")?;
            PgJobStore::connect(url).await?.migrate().await?;
            println!("migrations applied");
        }
        Commands::Schedule => {
            config.scheduler_enabled = true;
            let pipeline = Arc::new(ScrapePipeline::from_config(config).await?);
            let Some(mut sched) = pipeline.maybe_build_scheduler().await? else {
                return Ok(());
            };
            sched.start().await.context("starting scheduler")?;
            info!("scheduler running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }

    Ok(())
}

async fn scrape(config: SyncConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let ProgressEvent::SourceFinished {
                source,
                status,
                count,
                done,
                total,
            } = event
            {
                let mark = match status {
                    PortalStatus::Success => "ok",
                    PortalStatus::Failed => "FAILED",
                };
                println!("[{done}/{total}] {source}: {mark} ({count} jobs)");
            }
        }
    });

    let pipeline = ScrapePipeline::from_config(config).await?.with_progress(tx);
    let summary = pipeline.run_once().await;
    drop(pipeline);
    printer.await.context("progress printer")?;
    let summary = summary?;

    println!(
        "scrape complete: run_id={} raw={} duplicates_removed={} unique={} reports={}",
        summary.run_id,
        summary.raw_count,
        summary.duplicates_removed,
        summary.unique_count,
        summary.reports_dir
    );
    if let Some(admission) = summary.admission {
        println!(
            "stored {} new jobs, skipped {} duplicates",
            admission.inserted, admission.skipped
        );
    }
    Ok(())
}

async fn probe(config: SyncConfig) -> Result<()> {
    let registry = SourceRegistry::load(&config.registry_path()).await?;
    let fetcher = build_fetcher(&config, &registry)?;
    let orchestrator = Orchestrator::new(Arc::new(fetcher), registry.scraping.clone());
    let plans = orchestrator.plans(&registry.portals);
    let reachable = orchestrator.probe_all(&plans).await;
    for plan in &plans {
        let ok = reachable.get(&plan.source).copied().unwrap_or(false);
        println!(
            "{:<11} {:<8} {}",
            plan.source.to_string(),
            if ok { "up" } else { "down" },
            plan.base_url
        );
    }
    Ok(())
}
