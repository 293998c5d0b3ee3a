//! Database module: view models and SQL repositories for the catalog.
//!
//! - `model`: narrow row slices used by the sweep and stats.
//! - `repo`: SQL-only functions that map rows into `crate::model` entities.
//!
//! Callers import from `shoplink::db`; the repository API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{LinkFix, ProductLinks, StoreStats};
