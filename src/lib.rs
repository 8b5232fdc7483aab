//! Backend for a personal site: blog listing behind a coalescing cache,
//! admin session tokens, analytics ingestion and CDN purging.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
