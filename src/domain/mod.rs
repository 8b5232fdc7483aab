//! Domain types and their validation rules.

pub mod analytics;
pub mod blogs;
pub mod error;
