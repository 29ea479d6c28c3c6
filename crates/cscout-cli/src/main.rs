use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cscout_recommend::{filters, RecommendationEngine};
use cscout_storage::{DocumentStore, Filter, JsonFileStore, Sort, COMPETITIONS};
use cscout_sync::{
    configured_registry, load_source_settings, maybe_build_scheduler, ttl_overrides, SyncConfig,
    SyncOrchestrator,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cscout")]
#[command(about = "Competition Scout command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch and persist listings from the configured sources
    Sync {
        /// Re-fetch even when a source is still fresh
        #[arg(long)]
        force: bool,
        /// Restrict the run to the named sources (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Show per-source freshness and record counts
    Status,
    /// Rank stored competitions for a user
    Recommend {
        user_id: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Find competitions similar to a stored one
    Similar {
        competition_id: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// List stored competitions
    List {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Only competitions starting within this many days
        #[arg(long)]
        days: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run the cron scheduler until interrupted
    Schedule,
}

fn build_orchestrator(config: &SyncConfig, store: Arc<dyn DocumentStore>) -> Result<SyncOrchestrator> {
    let settings = load_source_settings(&config.sources_file)?;
    let registry = configured_registry(&settings);
    let http = config.http_client()?;
    Ok(SyncOrchestrator::new(
        store,
        registry,
        http,
        config.ttl_hours,
        ttl_overrides(&settings),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();
    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(&config.data_dir));

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Sync { force, sources } => {
            let orchestrator = build_orchestrator(&config, store)?;
            let targets = (!sources.is_empty()).then_some(sources);
            let report = orchestrator.sync_all(force, targets.as_deref()).await?;
            println!(
                "sync complete: run_id={} sources={}/{} records={}",
                report.run_id,
                report.sources_successful,
                report.sources_processed,
                report.total_records
            );
            for detail in &report.details {
                let state = if detail.skipped {
                    "skipped (fresh)".to_string()
                } else if detail.success {
                    format!("{} records", detail.count)
                } else {
                    format!("failed: {}", detail.error.as_deref().unwrap_or("unknown"))
                };
                println!("  {:<12} {state}", detail.source);
            }
        }
        Commands::Status => {
            let orchestrator = build_orchestrator(&config, store)?;
            for status in orchestrator.source_status().await? {
                let synced = status
                    .last_synced_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<12} fresh={:<5} records={:<5} last_synced={synced}",
                    status.source, status.is_fresh, status.record_count
                );
            }
        }
        Commands::Recommend { user_id, limit } => {
            let engine = RecommendationEngine::new(store);
            let recommendations = engine.recommend(&user_id, limit).await?;
            if recommendations.is_empty() {
                println!("no recommendations available");
            }
            for rec in recommendations {
                println!("{:>6.2}  {} [{}]", rec.score, rec.record.title, rec.record.platform);
                for reason in &rec.reasons {
                    println!("        - {reason}");
                }
            }
        }
        Commands::Similar { competition_id, limit } => {
            let engine = RecommendationEngine::new(store);
            for m in engine.similar(&competition_id, limit).await? {
                println!("{:>5.2}  {} [{}]", m.similarity, m.record.title, m.record.platform);
            }
        }
        Commands::List { platform, search, days, limit } => {
            let documents = store
                .find_all(
                    COMPETITIONS,
                    &Filter::new(),
                    Some(&Sort::ascending("start_date")),
                    None,
                    0,
                )
                .await
                .context("reading stored competitions")?;
            let mut records: Vec<cscout_core::CompetitionRecord> = documents
                .into_iter()
                .filter_map(|d| serde_json::from_value(d).ok())
                .collect();
            if let Some(days) = days {
                records = filters::upcoming(records, chrono::Utc::now(), chrono::Duration::days(days));
            }
            if let Some(platform) = &platform {
                records = filters::by_platform(records, platform);
            }
            if let Some(query) = &search {
                records = filters::search(records, query);
            }
            records.truncate(limit);
            for record in records {
                let start = record
                    .start_date
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!("{start}  {:<12} {}", record.platform, record.title);
            }
        }
        Commands::Schedule => {
            let mut config = config;
            config.scheduler_enabled = true;
            let orchestrator = Arc::new(build_orchestrator(&config, store)?);
            let scheduler = maybe_build_scheduler(orchestrator, &config)
                .await?
                .context("scheduler disabled")?;
            scheduler.start().await.context("starting scheduler")?;
            info!(
                cron_1 = %config.sync_cron_1,
                cron_2 = %config.sync_cron_2,
                "scheduler running, press ctrl-c to stop"
            );
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            info!("shutting down");
        }
    }

    Ok(())
}
