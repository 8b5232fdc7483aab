//! Blog metadata and listing parameters.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub prequel_id: Option<String>,
    pub sequel_id: Option<String>,
    pub parts: Vec<String>,
    #[serde(default)]
    pub views: u64,
}

/// One page of the listing, as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogsPage {
    pub blogs: Vec<Blog>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
    pub limit: u32,
}

impl BlogsPage {
    pub fn new(blogs: Vec<Blog>, total: u64, query: &ListingQuery) -> Self {
        Self {
            blogs,
            total,
            page: query.page,
            total_pages: total_pages(total, query.limit),
            limit: query.limit,
        }
    }
}

pub fn total_pages(total: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 0;
    }
    let pages = total.div_ceil(u64::from(limit));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortField {
    Id,
    Title,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "id" => Some(Self::Id),
            "title" => Some(Self::Title),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    /// Column name; only ever one of the four literals below.
    pub const fn as_column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Raw listing parameters as they arrive on the query string.
///
/// Kept as text so malformed numbers fall back to defaults instead of
/// failing extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

/// Listing parameters after defaults and bounds are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListingQuery {
    pub page: u32,
    pub limit: u32,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self::normalize(ListingParams::default())
    }
}

impl ListingQuery {
    pub fn normalize(params: ListingParams) -> Self {
        let page = positive(params.page.as_deref()).unwrap_or(DEFAULT_PAGE);
        let limit = positive(params.limit.as_deref())
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        let sort = params
            .sort_by
            .as_deref()
            .and_then(SortField::parse)
            .unwrap_or_default();
        let order = params
            .order
            .as_deref()
            .and_then(SortOrder::parse)
            .unwrap_or_default();

        Self {
            page,
            limit,
            sort,
            order,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

fn positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value >= 1)
}

/// Fields accepted when publishing a blog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBlog {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub prequel_id: Option<String>,
    #[serde(default)]
    pub sequel_id: Option<String>,
    #[serde(default)]
    pub parts: Vec<String>,
}

impl NewBlog {
    /// Trim and check fields, returning the cleaned copy.
    pub fn validate(self) -> Result<Self, DomainError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("blog title is required"));
        }

        let link = |value: Option<String>, field: &str| -> Result<Option<String>, DomainError> {
            match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                Some(id) if !is_valid_blog_id(&id) => Err(DomainError::validation(format!(
                    "{field} contains unsupported characters"
                ))),
                other => Ok(other),
            }
        };

        Ok(Self {
            title,
            summary: self.summary.trim().to_string(),
            prequel_id: link(self.prequel_id, "prequel_id")?,
            sequel_id: link(self.sequel_id, "sequel_id")?,
            parts: self
                .parts
                .into_iter()
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
        })
    }
}

/// Blog ids are restricted to `[A-Za-z0-9_-]+`.
pub fn is_valid_blog_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_params() {
        let query = ListingQuery::normalize(ListingParams::default());
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.sort, SortField::CreatedAt);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let query = ListingQuery::normalize(ListingParams {
            page: Some("0".into()),
            limit: Some("5000".into()),
            sort_by: Some("nope".into()),
            order: Some("sideways".into()),
        });
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, MAX_LIMIT);
        assert_eq!(query.sort, SortField::CreatedAt);
        assert_eq!(query.order, SortOrder::Desc);
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        for (page, limit) in [("abc", "-3"), ("", ""), ("1.5", "ten"), ("-1", "0")] {
            let query = ListingQuery::normalize(ListingParams {
                page: Some(page.into()),
                limit: Some(limit.into()),
                ..ListingParams::default()
            });
            assert_eq!((query.page, query.limit), (1, 10), "page={page:?} limit={limit:?}");
        }
    }

    #[test]
    fn order_is_case_insensitive() {
        let query = ListingQuery::normalize(ListingParams {
            page: Some("3".into()),
            limit: Some("20".into()),
            sort_by: Some("title".into()),
            order: Some("ASC".into()),
        });
        assert_eq!(query.order, SortOrder::Asc);
        assert_eq!(query.sort.as_column(), "title");
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(42, 5), 9);
    }

    #[test]
    fn new_blog_requires_title_and_cleans_parts() {
        assert!(matches!(
            NewBlog {
                title: "   ".into(),
                ..NewBlog::default()
            }
            .validate(),
            Err(DomainError::Validation { .. })
        ));

        let cleaned = NewBlog {
            title: " Rust ".into(),
            parts: vec![" a1b2c3d ".into(), "".into(), "  ".into()],
            prequel_id: Some("  ".into()),
            ..NewBlog::default()
        }
        .validate()
        .expect("valid blog");
        assert_eq!(cleaned.title, "Rust");
        assert_eq!(cleaned.parts, vec!["a1b2c3d".to_string()]);
        assert_eq!(cleaned.prequel_id, None);
    }

    #[test]
    fn blog_ids_reject_path_characters() {
        assert!(is_valid_blog_id("52a081c"));
        assert!(is_valid_blog_id("part_2-final"));
        assert!(!is_valid_blog_id("../etc/passwd"));
        assert!(!is_valid_blog_id(""));
    }

    #[test]
    fn blog_serializes_camel_case() {
        let blog = Blog {
            id: "52a081c".into(),
            title: "t".into(),
            summary: "s".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            prequel_id: None,
            sequel_id: Some("1234567".into()),
            parts: Vec::new(),
            views: 3,
        };
        let json = serde_json::to_value(&blog).expect("serialize");
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert_eq!(json["sequelId"], "1234567");
        assert!(json["prequelId"].is_null());
        assert_eq!(json["views"], 3);
    }
}
