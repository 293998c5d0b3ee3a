pub mod catalog;
pub mod config;
pub mod db;
pub mod links;
pub mod model;
pub mod sweep;
