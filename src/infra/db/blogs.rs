use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::repos::{BlogRecord, BlogsRepo, CreateBlogParams, RepoError};
use crate::domain::blogs::ListingQuery;

use super::PostgresRepositories;
use super::util::{convert_count, map_sqlx_error};

const BLOG_COLUMNS: &str =
    "id, title, summary, created_at, updated_at, prequel_id, sequel_id, parts";

#[derive(sqlx::FromRow)]
struct BlogRow {
    id: String,
    title: String,
    summary: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    prequel_id: Option<String>,
    sequel_id: Option<String>,
    parts: Option<Json<Vec<String>>>,
}

impl From<BlogRow> for BlogRecord {
    fn from(row: BlogRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            summary: row.summary.unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            prequel_id: row.prequel_id,
            sequel_id: row.sequel_id,
            parts: row.parts.map(|Json(parts)| parts).unwrap_or_default(),
        }
    }
}

fn listing_query(query: &ListingQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {BLOG_COLUMNS} FROM blogs ORDER BY "));
    // Column and direction come from closed enums, never from request text.
    qb.push(query.sort.as_column());
    qb.push(" ");
    qb.push(query.order.as_sql());
    qb.push(", id ");
    qb.push(query.order.as_sql());
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(query.limit));
    qb.push(" OFFSET ");
    qb.push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
    qb
}

#[async_trait]
impl BlogsRepo for PostgresRepositories {
    async fn list_blogs(&self, query: &ListingQuery) -> Result<Vec<BlogRecord>, RepoError> {
        let rows: Vec<BlogRow> = listing_query(query)
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BlogRecord::from).collect())
    }

    async fn count_blogs(&self) -> Result<u64, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blogs")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        convert_count(total)
    }

    async fn find_blog(&self, id: &str) -> Result<Option<BlogRecord>, RepoError> {
        let row: Option<BlogRow> =
            sqlx::query_as(&format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(BlogRecord::from))
    }

    async fn create_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, RepoError> {
        let row: BlogRow = sqlx::query_as(&format!(
            "INSERT INTO blogs \
             (id, title, summary, created_at, updated_at, prequel_id, sequel_id, parts) \
             VALUES ($1, $2, $3, $4, $4, $5, $6, $7) \
             RETURNING {BLOG_COLUMNS}"
        ))
        .bind(&params.id)
        .bind(&params.title)
        .bind(&params.summary)
        .bind(params.created_at)
        .bind(&params.prequel_id)
        .bind(&params.sequel_id)
        .bind(Json(&params.parts))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
