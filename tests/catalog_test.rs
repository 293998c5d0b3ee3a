mod common;

use common::{setup_pool, ScriptedLinks};
use std::sync::Arc;

use shoplink::catalog::{Catalog, CatalogError};
use shoplink::config::{self, Config};
use shoplink::links::LinkPipeline;
use shoplink::model::{BundlePatch, EntityKind, NewBundle, NewProduct, ProductPatch, DEFAULT_FEED};
use shoplink::sweep::SweepOptions;

const PASSWORD: &str = "CHANGE_ME";

fn test_config() -> Config {
    config::parse(config::example()).unwrap()
}

async fn catalog_with(cfg: &Config, links: &ScriptedLinks) -> Catalog {
    let pool = setup_pool().await;
    let pipeline = Arc::new(LinkPipeline::from_config(cfg, Arc::new(links.clone())));
    Catalog::new(pool, pipeline, cfg)
}

fn product(title: &str, url: &str, feed: Option<&str>, published: bool) -> NewProduct {
    NewProduct {
        title: title.into(),
        product_url: url.into(),
        is_published: published,
        feed: feed.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    assert!(matches!(catalog.admin("nope").err(), Some(CatalogError::Unauthorized)));
    assert!(matches!(catalog.admin("").err(), Some(CatalogError::Unauthorized)));
    assert!(catalog.admin(PASSWORD).is_ok());
}

#[tokio::test]
async fn create_product_stores_sanitized_links() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();

    let created = admin
        .create_product(product(
            "Kettle",
            "https://example.com/foo-bar,  Spare | https://example.com/lid",
            None,
            true,
        ))
        .await
        .unwrap();
    assert_eq!(
        created.product_url,
        "Foo Bar | https://example.com/foo-bar\nSpare | https://example.com/lid"
    );
    assert_eq!(created.slug.len(), 10);
    assert_eq!(created.feed, DEFAULT_FEED);
    assert_eq!(admin.get_product(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    let err = admin
        .create_product(product("  ", "https://example.com/x", None, true))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Invalid(_)));
    assert!(links.calls().await.is_empty());
}

#[tokio::test]
async fn update_resanitizes_links_and_keeps_other_fields() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    let created = admin
        .create_product(product("Mug", "Mug | https://shop.example/mug", None, false))
        .await
        .unwrap();

    let updated = admin
        .update_product(
            &created.id,
            ProductPatch {
                product_url: Some("https://shop.example/big_mug".into()),
                is_published: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.product_url, "Big Mug | https://shop.example/big_mug");
    assert!(updated.is_published);
    assert_eq!(updated.title, "Mug");
    assert_eq!(updated.slug, created.slug);
    assert!(updated.updated_at.is_some());
}

#[tokio::test]
async fn missing_entities_are_not_found() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();

    match admin.get_product("missing").await.unwrap_err() {
        CatalogError::NotFound { entity, id } => {
            assert_eq!(entity, EntityKind::Product);
            assert_eq!(id, "missing");
        }
        other => panic!("unexpected error: {other}"),
    }
    let err = admin
        .update_product(
            "missing",
            ProductPatch {
                product_url: Some("https://shop.example/x".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(links.calls().await.is_empty());

    assert!(admin.delete_bundle("missing").await.unwrap_err().is_not_found());
    assert!(admin
        .update_bundle("missing", BundlePatch::default())
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn delete_product_twice() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    let created = admin
        .create_product(product("Hat", "Hat | https://shop.example/hat", None, true))
        .await
        .unwrap();
    admin.delete_product(&created.id).await.unwrap();
    assert!(admin.delete_product(&created.id).await.unwrap_err().is_not_found());
    assert!(admin.list_products().await.unwrap().is_empty());
}

#[tokio::test]
async fn bundles_keep_only_known_products() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    let a = admin
        .create_product(product("A", "A | https://shop.example/a", None, true))
        .await
        .unwrap();
    let b = admin
        .create_product(product("B", "B | https://shop.example/b", None, true))
        .await
        .unwrap();

    let bundle = admin
        .create_bundle(NewBundle {
            title: "Set".into(),
            is_published: true,
            product_ids: vec![a.id.clone(), "ghost".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bundle.products, vec![a.clone()]);

    let bundle = admin
        .update_bundle(
            &bundle.id,
            BundlePatch {
                product_ids: Some(vec![b.id.clone(), a.id.clone()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ids: Vec<&str> = bundle.products.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);

    // Deleting a member product drops it from the bundle.
    admin.delete_product(&a.id).await.unwrap();
    let bundle = admin.get_bundle(&bundle.id).await.unwrap();
    assert_eq!(bundle.products.len(), 1);
    assert_eq!(admin.list_bundles().await.unwrap().len(), 1);
}

#[tokio::test]
async fn public_feed_lists_published_items_of_one_feed() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();

    let shown = admin
        .create_product(product("Shown", "Shown | https://shop.example/s", None, true))
        .await
        .unwrap();
    admin
        .create_product(product("Draft", "Draft | https://shop.example/d", None, false))
        .await
        .unwrap();
    let other = admin
        .create_product(product("Other", "Other | https://shop.example/o", Some("eve"), true))
        .await
        .unwrap();
    let bundle = admin
        .create_bundle(NewBundle {
            title: "Kit".into(),
            is_published: true,
            product_ids: vec![shown.id.clone()],
            ..Default::default()
        })
        .await
        .unwrap();
    admin
        .update_feed_settings(None, Some("https://cdn.example/me.png"))
        .await
        .unwrap();

    let calls_before = links.calls().await.len();
    let feed = catalog.public_feed(None).await.unwrap();
    assert_eq!(feed.feed, DEFAULT_FEED);
    assert_eq!(feed.products, vec![shown.clone()]);
    assert_eq!(feed.bundles.len(), 1);
    assert_eq!(feed.avatar_url.as_deref(), Some("https://cdn.example/me.png"));

    let eve = catalog.public_feed(Some("eve")).await.unwrap();
    assert_eq!(eve.products, vec![other]);
    assert!(eve.bundles.is_empty());
    assert!(eve.avatar_url.is_none());

    assert_eq!(catalog.public_product(&shown.slug).await.unwrap(), shown);
    assert_eq!(catalog.public_bundle(&bundle.slug).await.unwrap().id, bundle.id);
    assert!(catalog.public_product("nope").await.unwrap_err().is_not_found());
    assert_eq!(links.calls().await.len(), calls_before);
}

#[tokio::test]
async fn unpublished_items_are_hidden_by_slug() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    let draft = admin
        .create_product(product("Draft", "Draft | https://shop.example/d", None, false))
        .await
        .unwrap();
    assert!(catalog.public_product(&draft.slug).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn disabled_public_feed_reads_as_not_found() {
    let mut cfg = test_config();
    cfg.feed.public_enabled = false;
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&cfg, &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    let p = admin
        .create_product(product("P", "P | https://shop.example/p", None, true))
        .await
        .unwrap();

    let err = catalog.public_feed(None).await.unwrap_err();
    assert!(matches!(err, CatalogError::FeedDisabled));
    assert!(err.is_not_found());
    assert!(catalog.public_product(&p.slug).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn feed_settings_only_change_when_avatar_given() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();

    let fresh = admin.feed_settings(Some("eve")).await.unwrap();
    assert_eq!(fresh.feed, "eve");
    assert!(fresh.avatar_url.is_none());

    admin
        .update_feed_settings(Some("eve"), Some("https://cdn.example/a.png"))
        .await
        .unwrap();
    let kept = admin.update_feed_settings(Some("eve"), None).await.unwrap();
    assert_eq!(kept.avatar_url.as_deref(), Some("https://cdn.example/a.png"));
}

#[tokio::test]
async fn stats_count_products_and_bundles() {
    let links = ScriptedLinks::new();
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    admin
        .create_product(product("A", "A | https://shop.example/a", None, true))
        .await
        .unwrap();
    admin
        .create_product(product("B", "B | https://shop.example/b", None, false))
        .await
        .unwrap();
    admin
        .create_bundle(NewBundle {
            title: "Empty".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let stats = admin.stats().await.unwrap();
    assert_eq!(stats.products, 2);
    assert_eq!(stats.published_products, 1);
    assert_eq!(stats.bundles, 1);
}

#[tokio::test]
async fn sweep_through_catalog_uses_placeholder() {
    let gone = "https://shop.example/gone";
    let links = ScriptedLinks::new().head(gone, gone, 410).plain(gone, 410);
    let catalog = catalog_with(&test_config(), &links).await;
    let admin = catalog.admin(PASSWORD).unwrap();
    let p = admin
        .create_product(product("Gone", &format!("Gone | {}", gone), None, true))
        .await
        .unwrap();

    let report = admin
        .run_sweep(SweepOptions {
            safe_mode: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(report.committed);
    let now = admin.get_product(&p.id).await.unwrap();
    assert_eq!(now.product_url, "https://www.amazon.com/");
    assert!(now.is_published);

    let message = admin.trigger_sweep(SweepOptions {
        dry_run: true,
        ..Default::default()
    });
    assert!(message.contains("DRY RUN"));
}
