use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use shoplink::config;
use shoplink::db;
use shoplink::links::HttpLinkClient;
use shoplink::sweep::{run_sweep, SweepOptions};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Check every published product link once and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Write changes; without this flag the run only reports
    #[arg(long)]
    live: bool,

    /// Publish every product and skip link checks
    #[arg(long)]
    republish: bool,

    /// Relink broken products to the placeholder instead of unpublishing them
    #[arg(long)]
    safe_mode: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let client = HttpLinkClient::from_config(&cfg)?;
    let opts = SweepOptions {
        dry_run: !args.live,
        republish_all: args.republish,
        safe_mode: args.safe_mode,
    };

    info!(mode = opts.mode(), safe_mode = opts.safe_mode, "starting link check");
    let report = run_sweep(&pool, &client, cfg.sweep.placeholder_url.trim(), opts).await?;

    if opts.republish_all {
        info!(
            republished = report.republished,
            committed = report.committed,
            "republish finished"
        );
        return Ok(());
    }

    for product in &report.flagged {
        warn!(
            id = %product.id,
            title = %product.title,
            url = %product.failed_url,
            "broken link"
        );
    }
    if report.flagged.is_empty() {
        info!(scanned = report.scanned, "all links healthy");
    } else if opts.dry_run {
        warn!(
            flagged = report.flagged.len(),
            "dry run: nothing changed; rerun with --live to apply"
        );
    } else {
        info!(
            flagged = report.flagged.len(),
            action = if opts.safe_mode { "relinked" } else { "unpublished" },
            "changes committed"
        );
    }
    Ok(())
}
