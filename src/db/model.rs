//! Database view models used by repositories.
//!
//! Catalog entities live in `crate::model`; these are the narrower slices the
//! sweep and the stats report read and write.

/// Published product slice probed by the link health sweep.
#[derive(Debug, Clone)]
pub struct ProductLinks {
    pub id: String,
    pub title: String,
    pub product_url: String,
}

/// A mutation decided by the sweep, applied in one transaction at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFix {
    Unpublish { product_id: String },
    Relink { product_id: String, product_url: String },
}

impl LinkFix {
    pub fn product_id(&self) -> &str {
        match self {
            LinkFix::Unpublish { product_id } => product_id,
            LinkFix::Relink { product_id, .. } => product_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub products: i64,
    pub published_products: i64,
    pub bundles: i64,
}
