use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Feed tag used when a product or bundle has none.
pub const DEFAULT_FEED: &str = "default";

/// Resolve an optional feed tag to the tag actually stored/queried.
pub fn feed_tag(feed: Option<&str>) -> &str {
    match feed.map(str::trim) {
        Some(tag) if !tag.is_empty() => tag,
        _ => DEFAULT_FEED,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub product_url: String,
    pub is_published: bool,
    pub feed: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Admin input for a new product. `product_url` is raw admin text; the
/// catalog stores the sanitized form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub product_url: String,
    #[serde(default)]
    pub is_published: bool,
    pub feed: Option<String>,
}

/// Partial product update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub is_published: Option<bool>,
    pub feed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bundle {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub is_published: bool,
    pub feed: String,
    pub products: Vec<Product>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBundle {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    pub feed: Option<String>,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

/// Partial bundle update. `product_ids`, when present, replaces the whole
/// membership set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundlePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_published: Option<bool>,
    pub feed: Option<String>,
    pub product_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSettings {
    pub feed: String,
    pub avatar_url: Option<String>,
}

/// Everything a public feed page needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicFeed {
    pub feed: String,
    pub products: Vec<Product>,
    pub bundles: Vec<Bundle>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntityKind {
    Product,
    Bundle,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Bundle => "bundle",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Bundle => "bundles",
        }
    }
}
