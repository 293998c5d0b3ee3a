use super::model::{LinkFix, ProductLinks, StoreStats};
use crate::model::{
    feed_tag, Bundle, BundlePatch, EntityKind, FeedSettings, NewBundle, NewProduct, Product,
    ProductPatch,
};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

pub type Pool = SqlitePool;

const PRODUCT_COLUMNS: &str =
    "id, slug, title, description, image_url, product_url, is_published, feed, created_at, updated_at";
const JOINED_PRODUCT_COLUMNS: &str = "p.id, p.slug, p.title, p.description, p.image_url, \
     p.product_url, p.is_published, p.feed, p.created_at, p.updated_at";
const BUNDLE_COLUMNS: &str =
    "id, slug, title, description, is_published, feed, created_at, updated_at";
const SLUG_LEN: usize = 10;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn random_slug() -> String {
    let mut slug = Uuid::new_v4().simple().to_string();
    slug.truncate(SLUG_LEN);
    slug
}

/// Pick a slug not yet used by `kind`, appending `-1`, `-2`, ... on collision.
async fn unique_slug(conn: &mut SqliteConnection, kind: EntityKind) -> Result<String> {
    let sql = format!("SELECT 1 FROM {} WHERE slug = ?", kind.table());
    let base = random_slug();
    let mut slug = base.clone();
    let mut counter = 1;
    while sqlx::query_scalar::<_, i64>(&sql)
        .bind(&slug)
        .fetch_optional(&mut *conn)
        .await?
        .is_some()
    {
        slug = format!("{}-{}", base, counter);
        counter += 1;
    }
    Ok(slug)
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        product_url: row.try_get("product_url")?,
        is_published: row.try_get("is_published")?,
        feed: row
            .try_get::<Option<String>, _>("feed")?
            .unwrap_or_else(|| feed_tag(None).to_string()),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ---------------------------------------------------------------- products

/// Insert a product whose `product_url` has already been sanitized.
#[instrument(skip_all)]
pub async fn insert_product(pool: &Pool, new: &NewProduct) -> Result<Product> {
    let mut tx = pool.begin().await?;
    let slug = unique_slug(&mut tx, EntityKind::Product).await?;
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO products (id, slug, title, description, image_url, product_url, is_published, feed, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&slug)
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.image_url)
    .bind(&new.product_url)
    .bind(new.is_published)
    .bind(feed_tag(new.feed.as_deref()))
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    debug!(%id, %slug, "inserted product");

    fetch_product(pool, &id)
        .await?
        .context("inserted product vanished")
}

#[instrument(skip_all)]
pub async fn fetch_product(pool: &Pool, id: &str) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(product_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn fetch_published_product_by_slug(pool: &Pool, slug: &str) -> Result<Option<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE slug = ? AND is_published = 1",
        PRODUCT_COLUMNS
    );
    let row = sqlx::query(&sql).bind(slug).fetch_optional(pool).await?;
    row.as_ref().map(product_from_row).transpose()
}

/// All products, newest first.
#[instrument(skip_all)]
pub async fn list_products(pool: &Pool) -> Result<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products ORDER BY datetime(created_at) DESC, rowid DESC",
        PRODUCT_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(product_from_row).collect()
}

/// Published products, newest first; restricted to one feed when given.
#[instrument(skip_all)]
pub async fn list_published_products(pool: &Pool, feed: Option<&str>) -> Result<Vec<Product>> {
    let rows = match feed {
        Some(tag) => {
            let sql = format!(
                "SELECT {} FROM products WHERE is_published = 1 AND feed = ? \
                 ORDER BY datetime(created_at) DESC, rowid DESC",
                PRODUCT_COLUMNS
            );
            sqlx::query(&sql).bind(tag).fetch_all(pool).await?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM products WHERE is_published = 1 \
                 ORDER BY datetime(created_at) DESC, rowid DESC",
                PRODUCT_COLUMNS
            );
            sqlx::query(&sql).fetch_all(pool).await?
        }
    };
    rows.iter().map(product_from_row).collect()
}

/// Apply a partial update. `patch.product_url` must already be sanitized.
/// Returns `None` if the product does not exist.
#[instrument(skip_all)]
pub async fn update_product(pool: &Pool, id: &str, patch: &ProductPatch) -> Result<Option<Product>> {
    let Some(mut product) = fetch_product(pool, id).await? else {
        return Ok(None);
    };
    if let Some(title) = &patch.title {
        product.title = title.clone();
    }
    if let Some(description) = &patch.description {
        product.description = Some(description.clone());
    }
    if let Some(image_url) = &patch.image_url {
        product.image_url = Some(image_url.clone());
    }
    if let Some(product_url) = &patch.product_url {
        product.product_url = product_url.clone();
    }
    if let Some(is_published) = patch.is_published {
        product.is_published = is_published;
    }
    if patch.feed.is_some() {
        product.feed = feed_tag(patch.feed.as_deref()).to_string();
    }

    sqlx::query(
        "UPDATE products SET title = ?, description = ?, image_url = ?, product_url = ?, \
         is_published = ?, feed = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&product.title)
    .bind(&product.description)
    .bind(&product.image_url)
    .bind(&product.product_url)
    .bind(product.is_published)
    .bind(&product.feed)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    fetch_product(pool, id).await
}

/// Returns `false` when nothing was deleted.
#[instrument(skip_all)]
pub async fn delete_product(pool: &Pool, id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM bundle_products WHERE product_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let res = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected() > 0)
}

// ----------------------------------------------------------------- bundles

async fn bundle_products(conn: &mut SqliteConnection, bundle_id: &str) -> Result<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products p JOIN bundle_products bp ON bp.product_id = p.id \
         WHERE bp.bundle_id = ? ORDER BY datetime(p.created_at) ASC, p.rowid ASC",
        JOINED_PRODUCT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(bundle_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(product_from_row).collect()
}

async fn bundle_from_row(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<Bundle> {
    let id: String = row.try_get("id")?;
    let products = bundle_products(conn, &id).await?;
    Ok(Bundle {
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        is_published: row.try_get("is_published")?,
        feed: row
            .try_get::<Option<String>, _>("feed")?
            .unwrap_or_else(|| feed_tag(None).to_string()),
        products,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        id,
    })
}

async fn bundles_from_rows(pool: &Pool, rows: Vec<SqliteRow>) -> Result<Vec<Bundle>> {
    let mut conn = pool.acquire().await?;
    let mut bundles = Vec::with_capacity(rows.len());
    for row in &rows {
        bundles.push(bundle_from_row(&mut conn, row).await?);
    }
    Ok(bundles)
}

/// Replace the membership of a bundle. Ids that match no product are dropped.
async fn replace_bundle_products(
    conn: &mut SqliteConnection,
    bundle_id: &str,
    product_ids: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM bundle_products WHERE bundle_id = ?")
        .bind(bundle_id)
        .execute(&mut *conn)
        .await?;
    for product_id in product_ids {
        // INSERT ... SELECT skips ids with no matching product.
        sqlx::query(
            "INSERT OR IGNORE INTO bundle_products (bundle_id, product_id) \
             SELECT ?, id FROM products WHERE id = ?",
        )
        .bind(bundle_id)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_bundle(pool: &Pool, new: &NewBundle) -> Result<Bundle> {
    let mut tx = pool.begin().await?;
    let slug = unique_slug(&mut tx, EntityKind::Bundle).await?;
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO bundles (id, slug, title, description, is_published, feed, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&slug)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.is_published)
    .bind(feed_tag(new.feed.as_deref()))
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    replace_bundle_products(&mut tx, &id, &new.product_ids).await?;
    tx.commit().await?;
    debug!(%id, %slug, "inserted bundle");

    fetch_bundle(pool, &id)
        .await?
        .context("inserted bundle vanished")
}

#[instrument(skip_all)]
pub async fn fetch_bundle(pool: &Pool, id: &str) -> Result<Option<Bundle>> {
    let sql = format!("SELECT {} FROM bundles WHERE id = ?", BUNDLE_COLUMNS);
    let mut conn = pool.acquire().await?;
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => Ok(Some(bundle_from_row(&mut conn, &row).await?)),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub async fn fetch_published_bundle_by_slug(pool: &Pool, slug: &str) -> Result<Option<Bundle>> {
    let sql = format!(
        "SELECT {} FROM bundles WHERE slug = ? AND is_published = 1",
        BUNDLE_COLUMNS
    );
    let mut conn = pool.acquire().await?;
    let row = sqlx::query(&sql).bind(slug).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => Ok(Some(bundle_from_row(&mut conn, &row).await?)),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub async fn list_bundles(pool: &Pool) -> Result<Vec<Bundle>> {
    let sql = format!(
        "SELECT {} FROM bundles ORDER BY datetime(created_at) DESC, rowid DESC",
        BUNDLE_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    bundles_from_rows(pool, rows).await
}

#[instrument(skip_all)]
pub async fn list_published_bundles(pool: &Pool, feed: Option<&str>) -> Result<Vec<Bundle>> {
    let rows = match feed {
        Some(tag) => {
            let sql = format!(
                "SELECT {} FROM bundles WHERE is_published = 1 AND feed = ? \
                 ORDER BY datetime(created_at) DESC, rowid DESC",
                BUNDLE_COLUMNS
            );
            sqlx::query(&sql).bind(tag).fetch_all(pool).await?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM bundles WHERE is_published = 1 \
                 ORDER BY datetime(created_at) DESC, rowid DESC",
                BUNDLE_COLUMNS
            );
            sqlx::query(&sql).fetch_all(pool).await?
        }
    };
    bundles_from_rows(pool, rows).await
}

#[instrument(skip_all)]
pub async fn update_bundle(pool: &Pool, id: &str, patch: &BundlePatch) -> Result<Option<Bundle>> {
    let Some(mut bundle) = fetch_bundle(pool, id).await? else {
        return Ok(None);
    };
    if let Some(title) = &patch.title {
        bundle.title = title.clone();
    }
    if let Some(description) = &patch.description {
        bundle.description = Some(description.clone());
    }
    if let Some(is_published) = patch.is_published {
        bundle.is_published = is_published;
    }
    if patch.feed.is_some() {
        bundle.feed = feed_tag(patch.feed.as_deref()).to_string();
    }

    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE bundles SET title = ?, description = ?, is_published = ?, feed = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&bundle.title)
    .bind(&bundle.description)
    .bind(bundle.is_published)
    .bind(&bundle.feed)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if let Some(product_ids) = &patch.product_ids {
        replace_bundle_products(&mut tx, id, product_ids).await?;
    }
    tx.commit().await?;

    fetch_bundle(pool, id).await
}

#[instrument(skip_all)]
pub async fn delete_bundle(pool: &Pool, id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM bundle_products WHERE bundle_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let res = sqlx::query("DELETE FROM bundles WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected() > 0)
}

// ---------------------------------------------------------------- settings

/// Fetch the settings row for `feed`, creating it with a null avatar first.
#[instrument(skip_all)]
pub async fn get_or_create_feed_settings(pool: &Pool, feed: &str) -> Result<FeedSettings> {
    sqlx::query("INSERT OR IGNORE INTO feed_settings (feed, avatar_url) VALUES (?, NULL)")
        .bind(feed)
        .execute(pool)
        .await?;
    let avatar_url: Option<String> =
        sqlx::query_scalar("SELECT avatar_url FROM feed_settings WHERE feed = ?")
            .bind(feed)
            .fetch_one(pool)
            .await?;
    Ok(FeedSettings {
        feed: feed.to_string(),
        avatar_url,
    })
}

#[instrument(skip_all)]
pub async fn set_feed_avatar(pool: &Pool, feed: &str, avatar_url: &str) -> Result<FeedSettings> {
    sqlx::query(
        "INSERT INTO feed_settings (feed, avatar_url) VALUES (?, ?) \
         ON CONFLICT(feed) DO UPDATE SET avatar_url = excluded.avatar_url",
    )
    .bind(feed)
    .bind(avatar_url)
    .execute(pool)
    .await?;
    get_or_create_feed_settings(pool, feed).await
}

// ------------------------------------------------------------------- sweep

/// Published products in the order the sweep scans them (oldest first).
#[instrument(skip_all)]
pub async fn list_published_product_links(pool: &Pool) -> Result<Vec<ProductLinks>> {
    let rows = sqlx::query(
        "SELECT id, title, product_url FROM products WHERE is_published = 1 \
         ORDER BY datetime(created_at) ASC, rowid ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| -> Result<ProductLinks> {
            Ok(ProductLinks {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                product_url: row.try_get("product_url")?,
            })
        })
        .collect()
}

/// Apply every sweep decision in a single transaction.
#[instrument(skip_all)]
pub async fn apply_link_fixes(pool: &Pool, fixes: &[LinkFix]) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for fix in fixes {
        debug!(product_id = fix.product_id(), ?fix, "applying link fix");
        match fix {
            LinkFix::Unpublish { product_id } => {
                sqlx::query("UPDATE products SET is_published = 0, updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?;
            }
            LinkFix::Relink {
                product_id,
                product_url,
            } => {
                sqlx::query("UPDATE products SET product_url = ?, updated_at = ? WHERE id = ?")
                    .bind(product_url)
                    .bind(now)
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }
    tx.commit().await.context("failed to commit link fixes")?;
    Ok(())
}

/// Number of products currently unpublished.
pub async fn count_unpublished_products(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_published = 0")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Mark every product published. Returns how many rows changed.
#[instrument(skip_all)]
pub async fn republish_all_products(pool: &Pool) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query("UPDATE products SET is_published = 1, updated_at = ? WHERE is_published = 0")
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected())
}

pub async fn store_stats(pool: &Pool) -> Result<StoreStats> {
    let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    let published_products: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_published = 1")
            .fetch_one(pool)
            .await?;
    let bundles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bundles")
        .fetch_one(pool)
        .await?;
    Ok(StoreStats {
        products,
        published_products,
        bundles,
    })
}
