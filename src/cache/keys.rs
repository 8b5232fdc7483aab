//! Cache key derivation.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::blogs::ListingQuery;

/// Key for one page of the blog listing.
///
/// Built from an already normalized [`ListingQuery`], so requests that differ
/// only in spelling (`order=DESC` vs `order=desc`, omitted defaults) share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingKey(String);

impl ListingKey {
    pub fn from_query(query: &ListingQuery) -> Self {
        let canonical = format!(
            "page:{}_limit:{}_sortBy:{}_order:{}",
            query.page,
            query.limit,
            query.sort.as_column(),
            query.order.as_sql(),
        );
        Self(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
