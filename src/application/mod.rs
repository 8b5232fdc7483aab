//! Application services sitting between HTTP handlers and persistence.

pub mod analytics;
pub mod auth;
pub mod blogs;
pub mod cdn;
pub mod error;
pub mod repos;
