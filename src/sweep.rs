use crate::db::{self, LinkFix, Pool};
use crate::links::{is_alive, stored_urls, LinkClient};
use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepOptions {
    pub dry_run: bool,
    /// Publish every product and skip link checks entirely.
    pub republish_all: bool,
    /// Relink broken products to the placeholder instead of unpublishing.
    pub safe_mode: bool,
}

impl SweepOptions {
    pub fn mode(&self) -> &'static str {
        if self.dry_run {
            "DRY RUN"
        } else {
            "LIVE"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedProduct {
    pub id: String,
    pub title: String,
    pub failed_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub options: SweepOptions,
    pub scanned: usize,
    pub checked_urls: usize,
    pub skipped: usize,
    pub flagged: Vec<FlaggedProduct>,
    pub republished: u64,
    pub committed: bool,
}

/// Run one link health sweep over published products.
///
/// Probing happens outside any transaction; the decisions are written once at
/// the end, and only in live mode when something was flagged.
#[instrument(skip_all, fields(mode = opts.mode(), safe_mode = opts.safe_mode))]
pub async fn run_sweep(
    pool: &Pool,
    client: &dyn LinkClient,
    placeholder_url: &str,
    opts: SweepOptions,
) -> Result<SweepReport> {
    let mut report = SweepReport {
        options: opts,
        ..Default::default()
    };

    if opts.republish_all {
        if opts.dry_run {
            report.republished = db::count_unpublished_products(pool).await? as u64;
            info!(would_republish = report.republished, "[DRY RUN] republish all");
        } else {
            report.republished = db::republish_all_products(pool).await?;
            report.committed = true;
            info!(republished = report.republished, "republished all products");
        }
        return Ok(report);
    }

    let products = db::list_published_product_links(pool).await?;
    info!(count = products.len(), "checking published products");

    let mut fixes = Vec::new();
    for product in products {
        report.scanned += 1;
        let urls = stored_urls(&product.product_url);
        if is_placeholder(&urls, placeholder_url) {
            report.skipped += 1;
            continue;
        }

        let mut failed = None;
        for url in urls {
            report.checked_urls += 1;
            if !is_alive(client, &url).await {
                failed = Some(url);
                break;
            }
        }
        let Some(failed_url) = failed else {
            continue;
        };

        warn!(
            id = %product.id,
            title = %product.title,
            url = %failed_url,
            mode = opts.mode(),
            "product has broken link"
        );
        if !opts.dry_run {
            fixes.push(if opts.safe_mode {
                LinkFix::Relink {
                    product_id: product.id.clone(),
                    product_url: placeholder_url.to_string(),
                }
            } else {
                LinkFix::Unpublish {
                    product_id: product.id.clone(),
                }
            });
        }
        report.flagged.push(FlaggedProduct {
            id: product.id,
            title: product.title,
            failed_url,
        });
    }

    if !fixes.is_empty() {
        db::apply_link_fixes(pool, &fixes).await?;
        report.committed = true;
    }
    info!(
        scanned = report.scanned,
        checked = report.checked_urls,
        flagged = report.flagged.len(),
        committed = report.committed,
        "link sweep finished"
    );
    Ok(report)
}

fn is_placeholder(urls: &[String], placeholder_url: &str) -> bool {
    let placeholder = placeholder_url.trim();
    !urls.is_empty() && urls.iter().all(|u| u == placeholder)
}
