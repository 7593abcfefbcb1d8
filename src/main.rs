use clap::Parser;
use signal_connector::config::{CacheAction, Cli, Command, RunArgs};
use signal_connector::utils::error::{ConnectorError, ErrorSeverity};
use signal_connector::utils::logger;
use signal_connector::{ConnectorRun, EnrichmentCache};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI arguments: {:?}", cli);

    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Cache { cache_dir, action } => cache(cache_dir, action).await,
    };

    if let Err(e) = outcome {
        tracing::error!(
            "❌ connector failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(args: RunArgs) -> Result<(), ConnectorError> {
    let config = args.load_config()?;
    let connector = ConnectorRun::from_config(&config)?;

    let cancel = connector.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight lookups");
            cancel.cancel();
        }
    });

    let report = connector.run().await?;
    let summary = &report.summary;
    println!("✅ {} supply x {} demand", summary.supply_records, summary.demand_records);
    println!(
        "   {} matches ({} strong, {} good, {} open), {} exported",
        summary.matches_total,
        summary.tiers.strong,
        summary.tiers.good,
        summary.tiers.open,
        summary.matches_exported
    );
    if !summary.rejected.is_empty() {
        println!("   {} rows skipped without company or domain", summary.rejected.len());
    }
    if let Some(enrichment) = &summary.enrichment {
        println!(
            "   {} emails found for {} records ({} from cache, {} failed)",
            enrichment.resolved,
            enrichment.attempted,
            enrichment.cache_hits,
            enrichment.failures.len()
        );
        if enrichment.cancelled {
            println!("   ⚠️  enrichment was interrupted");
        }
    }
    for output in &report.outputs {
        println!("📁 {}/{}", config.output_dir(), output);
    }
    Ok(())
}

async fn cache(cache_dir: Option<PathBuf>, action: CacheAction) -> Result<(), ConnectorError> {
    let cache = match cache_dir {
        Some(dir) => EnrichmentCache::new(dir),
        None => EnrichmentCache::open_default()?,
    };

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await?;
            println!("📁 {}", stats.location.display());
            println!(
                "   {} entries: {} fresh, {} stale, {} without email",
                stats.total, stats.fresh, stats.stale, stats.negative
            );
            for (provider, count) in &stats.by_provider {
                println!("   {:<16} {}", provider, count);
            }
        }
        CacheAction::List { limit } => {
            let now = chrono::Utc::now();
            let entries = cache.list().await?;
            let shown = limit.unwrap_or(entries.len());
            for entry in entries.iter().take(shown) {
                println!(
                    "{}\t{}\t{}\t{}{}",
                    entry.key,
                    entry.result.email.as_deref().unwrap_or("-"),
                    entry.result.provider,
                    entry.expires_at.format("%Y-%m-%d"),
                    if entry.is_expired_at(now) { " (stale)" } else { "" }
                );
            }
            if entries.len() > shown {
                println!("... {} more", entries.len() - shown);
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear().await?;
            println!("🗑️  Removed {} cache entries from {}", removed, cache.root().display());
        }
    }
    Ok(())
}
