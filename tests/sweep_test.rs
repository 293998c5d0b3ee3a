mod common;

use common::{setup_pool, ScriptedLinks};
use shoplink::db;
use shoplink::model::{NewProduct, Product};
use shoplink::sweep::{run_sweep, SweepOptions};

const PLACEHOLDER: &str = "https://www.amazon.com/";
const GOOD: &str = "https://shop.example/good";
const BAD: &str = "https://shop.example/gone";

async fn add(pool: &sqlx::SqlitePool, title: &str, product_url: &str, published: bool) -> Product {
    db::insert_product(
        pool,
        &NewProduct {
            title: title.into(),
            product_url: product_url.into(),
            is_published: published,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

async fn reload(pool: &sqlx::SqlitePool, id: &str) -> Product {
    db::fetch_product(pool, id).await.unwrap().unwrap()
}

fn links() -> ScriptedLinks {
    ScriptedLinks::new()
        .head(GOOD, GOOD, 200)
        .head(BAD, BAD, 404)
        .plain(BAD, 404)
}

fn live() -> SweepOptions {
    SweepOptions {
        dry_run: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let pool = setup_pool().await;
    let good = add(&pool, "Good", &format!("Good | {}", GOOD), true).await;
    let bad = add(&pool, "Bad", &format!("Good | {}\nGone | {}", GOOD, BAD), true).await;

    let opts = SweepOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = run_sweep(&pool, &links(), PLACEHOLDER, opts).await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.flagged.len(), 1);
    assert_eq!(report.flagged[0].id, bad.id);
    assert_eq!(report.flagged[0].failed_url, BAD);
    assert!(!report.committed);
    assert_eq!(reload(&pool, &bad.id).await, bad);
    assert_eq!(reload(&pool, &good.id).await, good);
}

#[tokio::test]
async fn live_run_unpublishes_broken_products() {
    let pool = setup_pool().await;
    let good = add(&pool, "Good", &format!("Good | {}", GOOD), true).await;
    let bad = add(&pool, "Bad", &format!("Gone | {}", BAD), true).await;

    let report = run_sweep(&pool, &links(), PLACEHOLDER, live()).await.unwrap();
    assert!(report.committed);

    let bad_now = reload(&pool, &bad.id).await;
    assert!(!bad_now.is_published);
    assert_eq!(bad_now.product_url, bad.product_url);
    assert!(reload(&pool, &good.id).await.is_published);
}

#[tokio::test]
async fn safe_mode_relinks_and_keeps_published() {
    let pool = setup_pool().await;
    let bad = add(&pool, "Bad", &format!("Gone | {}", BAD), true).await;

    let opts = SweepOptions {
        safe_mode: true,
        ..live()
    };
    let report = run_sweep(&pool, &links(), PLACEHOLDER, opts).await.unwrap();
    assert_eq!(report.flagged.len(), 1);

    let bad_now = reload(&pool, &bad.id).await;
    assert!(bad_now.is_published);
    assert_eq!(bad_now.product_url, PLACEHOLDER);

    // The placeholder is not probed on the next run.
    let client = links();
    let again = run_sweep(&pool, &client, PLACEHOLDER, opts).await.unwrap();
    assert_eq!(again.skipped, 1);
    assert!(again.flagged.is_empty());
    assert!(client.calls().await.is_empty());
}

#[tokio::test]
async fn head_rejection_falls_back_to_get() {
    let pool = setup_pool().await;
    let url = "https://shop.example/no-head";
    let product = add(&pool, "NoHead", &format!("NoHead | {}", url), true).await;
    let client = ScriptedLinks::new().head(url, url, 405).plain(url, 200);

    let report = run_sweep(&pool, &client, PLACEHOLDER, live()).await.unwrap();
    assert!(report.flagged.is_empty());
    assert!(!report.committed);
    assert!(reload(&pool, &product.id).await.is_published);
}

#[tokio::test]
async fn unpublished_products_are_not_checked() {
    let pool = setup_pool().await;
    add(&pool, "Hidden", &format!("Gone | {}", BAD), false).await;
    let client = links();

    let report = run_sweep(&pool, &client, PLACEHOLDER, live()).await.unwrap();
    assert_eq!(report.scanned, 0);
    assert!(client.calls().await.is_empty());
}

#[tokio::test]
async fn republish_all_ignores_link_health() {
    let pool = setup_pool().await;
    let a = add(&pool, "A", &format!("Gone | {}", BAD), false).await;
    let b = add(&pool, "B", &format!("Good | {}", GOOD), false).await;
    let client = links();

    let dry = run_sweep(
        &pool,
        &client,
        PLACEHOLDER,
        SweepOptions {
            dry_run: true,
            republish_all: true,
            safe_mode: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(dry.republished, 2);
    assert!(!reload(&pool, &a.id).await.is_published);

    let opts = SweepOptions {
        republish_all: true,
        ..live()
    };
    let report = run_sweep(&pool, &client, PLACEHOLDER, opts).await.unwrap();
    assert_eq!(report.republished, 2);
    assert!(report.committed);
    assert!(reload(&pool, &a.id).await.is_published);
    assert!(reload(&pool, &b.id).await.is_published);
    assert!(client.calls().await.is_empty());
}
