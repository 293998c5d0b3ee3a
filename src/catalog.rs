//! Catalog operations for admins and the public feed.
//!
//! Every write of `product_url` goes through the link pipeline. Store errors
//! are mapped onto [`CatalogError`] so callers can tell a missing entity from
//! a refused password or a broken database.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::db::{self, Pool, StoreStats};
use crate::links::{LinkPipeline, ResolvedUrls};
use crate::model::{
    feed_tag, Bundle, BundlePatch, EntityKind, FeedSettings, NewBundle, NewProduct, Product,
    ProductPatch, PublicFeed,
};
use crate::sweep::{self, SweepOptions, SweepReport};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{} {id} not found", .entity.as_str())]
    NotFound { entity: EntityKind, id: String },
    #[error("public feed is disabled")]
    FeedDisabled,
    #[error("not authorized")]
    Unauthorized,
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("constraint violation: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(anyhow::Error),
}

impl CatalogError {
    /// Disabled feeds are reported to readers the same way as missing items.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. } | CatalogError::FeedDisabled)
    }

    fn not_found(entity: EntityKind, id: &str) -> Self {
        CatalogError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(sqlx::Error::Database(db_err)) = err.downcast_ref::<sqlx::Error>() {
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                return CatalogError::Conflict(db_err.message().to_string());
            }
        }
        CatalogError::Store(err)
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

pub struct Catalog {
    pool: Pool,
    pipeline: Arc<LinkPipeline>,
    public_feed_enabled: bool,
    placeholder_url: String,
    admin_password: String,
}

impl Catalog {
    pub fn new(pool: Pool, pipeline: Arc<LinkPipeline>, cfg: &Config) -> Self {
        Self {
            pool,
            pipeline,
            public_feed_enabled: cfg.feed.public_enabled,
            placeholder_url: cfg.sweep.placeholder_url.trim().to_string(),
            admin_password: cfg.admin.password.clone(),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn pipeline(&self) -> &LinkPipeline {
        &self.pipeline
    }

    /// Unlock the admin operations.
    pub fn admin(&self, password: &str) -> CatalogResult<Admin<'_>> {
        if constant_time_eq(password.as_bytes(), self.admin_password.as_bytes()) {
            Ok(Admin { catalog: self })
        } else {
            Err(CatalogError::Unauthorized)
        }
    }

    fn ensure_feed_enabled(&self) -> CatalogResult<()> {
        if self.public_feed_enabled {
            Ok(())
        } else {
            Err(CatalogError::FeedDisabled)
        }
    }

    /// Published products and bundles of one feed plus its avatar. Stored
    /// links are returned as-is.
    #[instrument(skip_all)]
    pub async fn public_feed(&self, feed: Option<&str>) -> CatalogResult<PublicFeed> {
        self.ensure_feed_enabled()?;
        let tag = feed_tag(feed);
        let products = db::list_published_products(&self.pool, Some(tag)).await?;
        let bundles = db::list_published_bundles(&self.pool, Some(tag)).await?;
        let settings = db::get_or_create_feed_settings(&self.pool, tag).await?;
        Ok(PublicFeed {
            feed: tag.to_string(),
            products,
            bundles,
            avatar_url: settings.avatar_url,
        })
    }

    pub async fn public_product(&self, slug: &str) -> CatalogResult<Product> {
        self.ensure_feed_enabled()?;
        db::fetch_published_product_by_slug(&self.pool, slug)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Product, slug))
    }

    pub async fn public_bundle(&self, slug: &str) -> CatalogResult<Bundle> {
        self.ensure_feed_enabled()?;
        db::fetch_published_bundle_by_slug(&self.pool, slug)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Bundle, slug))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Admin view of the catalog, obtained through [`Catalog::admin`].
pub struct Admin<'a> {
    catalog: &'a Catalog,
}

impl Admin<'_> {
    fn pool(&self) -> &Pool {
        &self.catalog.pool
    }

    #[instrument(skip_all)]
    pub async fn create_product(&self, mut new: NewProduct) -> CatalogResult<Product> {
        if new.title.trim().is_empty() {
            return Err(CatalogError::Invalid("product title must be non-empty"));
        }
        new.product_url = self.catalog.pipeline.sanitize(&new.product_url).await;
        let product = db::insert_product(self.pool(), &new).await?;
        info!(id = %product.id, slug = %product.slug, "created product");
        Ok(product)
    }

    pub async fn get_product(&self, id: &str) -> CatalogResult<Product> {
        db::fetch_product(self.pool(), id)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Product, id))
    }

    pub async fn list_products(&self) -> CatalogResult<Vec<Product>> {
        Ok(db::list_products(self.pool()).await?)
    }

    #[instrument(skip_all)]
    pub async fn update_product(
        &self,
        id: &str,
        mut patch: ProductPatch,
    ) -> CatalogResult<Product> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(CatalogError::Invalid("product title must be non-empty"));
        }
        // Check first so a missing product costs no network calls.
        if db::fetch_product(self.pool(), id).await?.is_none() {
            return Err(CatalogError::not_found(EntityKind::Product, id));
        }
        if let Some(raw) = patch.product_url.take() {
            patch.product_url = Some(self.catalog.pipeline.sanitize(&raw).await);
        }
        let product = db::update_product(self.pool(), id, &patch)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Product, id))?;
        info!(id = %product.id, "updated product");
        Ok(product)
    }

    pub async fn delete_product(&self, id: &str) -> CatalogResult<()> {
        if !db::delete_product(self.pool(), id).await? {
            return Err(CatalogError::not_found(EntityKind::Product, id));
        }
        info!(id, "deleted product");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn create_bundle(&self, new: NewBundle) -> CatalogResult<Bundle> {
        if new.title.trim().is_empty() {
            return Err(CatalogError::Invalid("bundle title must be non-empty"));
        }
        let bundle = db::insert_bundle(self.pool(), &new).await?;
        info!(id = %bundle.id, products = bundle.products.len(), "created bundle");
        Ok(bundle)
    }

    pub async fn get_bundle(&self, id: &str) -> CatalogResult<Bundle> {
        db::fetch_bundle(self.pool(), id)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Bundle, id))
    }

    pub async fn list_bundles(&self) -> CatalogResult<Vec<Bundle>> {
        Ok(db::list_bundles(self.pool()).await?)
    }

    #[instrument(skip_all)]
    pub async fn update_bundle(&self, id: &str, patch: BundlePatch) -> CatalogResult<Bundle> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(CatalogError::Invalid("bundle title must be non-empty"));
        }
        db::update_bundle(self.pool(), id, &patch)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Bundle, id))
    }

    pub async fn delete_bundle(&self, id: &str) -> CatalogResult<()> {
        if !db::delete_bundle(self.pool(), id).await? {
            return Err(CatalogError::not_found(EntityKind::Bundle, id));
        }
        info!(id, "deleted bundle");
        Ok(())
    }

    pub async fn feed_settings(&self, feed: Option<&str>) -> CatalogResult<FeedSettings> {
        Ok(db::get_or_create_feed_settings(self.pool(), feed_tag(feed)).await?)
    }

    /// `None` leaves the stored avatar untouched.
    pub async fn update_feed_settings(
        &self,
        feed: Option<&str>,
        avatar_url: Option<&str>,
    ) -> CatalogResult<FeedSettings> {
        let tag = feed_tag(feed);
        match avatar_url {
            Some(url) => Ok(db::set_feed_avatar(self.pool(), tag, url).await?),
            None => Ok(db::get_or_create_feed_settings(self.pool(), tag).await?),
        }
    }

    /// Preview what would be stored for `raw` without touching the store.
    pub async fn sanitize_links(&self, raw: &str) -> String {
        self.catalog.pipeline.sanitize(raw).await
    }

    pub async fn resolve_urls(&self, urls: &[String]) -> ResolvedUrls {
        self.catalog.pipeline.resolve_urls(urls).await
    }

    pub async fn stats(&self) -> CatalogResult<StoreStats> {
        Ok(db::store_stats(self.pool()).await?)
    }

    pub async fn run_sweep(&self, opts: SweepOptions) -> CatalogResult<SweepReport> {
        let client = self.catalog.pipeline.client();
        Ok(sweep::run_sweep(
            self.pool(),
            client.as_ref(),
            &self.catalog.placeholder_url,
            opts,
        )
        .await?)
    }

    /// Start a sweep in the background and return immediately with a
    /// description of what was started.
    pub fn trigger_sweep(&self, opts: SweepOptions) -> String {
        let pool = self.catalog.pool.clone();
        let client = self.catalog.pipeline.client();
        let placeholder = self.catalog.placeholder_url.clone();
        tokio::spawn(async move {
            if let Err(err) = sweep::run_sweep(&pool, client.as_ref(), &placeholder, opts).await {
                error!(?err, "background link sweep failed");
            }
        });

        if opts.republish_all {
            format!("Republishing all products in {} mode. Check logs.", opts.mode())
        } else {
            format!(
                "Link health check started in {} mode. Check logs for details.",
                opts.mode()
            )
        }
    }
}
