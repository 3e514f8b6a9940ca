//! # Postgres adapters
//!
//! Maps the fragment aggregate onto a single `fragments` row: the whole
//! document in JSONB, with the columns the listings filter on copied out
//! next to it. The version guard is a conditional `UPDATE`. Reads are
//! counted in their own column so they never contend with the guard.

use std::collections::BTreeSet;
use std::fmt::Display;

use async_trait::async_trait;
use domains::{
    CategoryId, CategoryRepository, DomainError, FollowerDirectory, Fragment, FragmentId,
    FragmentQuery, FragmentRepository, Result, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../migrations/0001_fragments.sql");

fn internal(err: impl Display) -> DomainError {
    DomainError::Internal(err.to_string())
}

fn to_db_version(version: u64) -> Result<i64> {
    i64::try_from(version).map_err(internal)
}

fn from_db_count(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(internal)
}

/// Opens a pool and applies the schema.
pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    info!("postgres schema ready");
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PgFragmentRepository {
    pool: PgPool,
}

impl PgFragmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn fragment_from_row(row: &PgRow) -> Result<Fragment> {
    let Json(mut fragment): Json<Fragment> = row.try_get("document").map_err(internal)?;
    let version: i64 = row.try_get("version").map_err(internal)?;
    let views: i64 = row.try_get("view_count").map_err(internal)?;
    fragment.version = from_db_count(version)?;
    fragment.view_count = from_db_count(views)?;
    Ok(fragment)
}

#[async_trait]
impl FragmentRepository for PgFragmentRepository {
    async fn insert_fragment(&self, fragment: &Fragment) -> Result<Fragment> {
        let mut stored = fragment.clone();
        stored.version = 1;

        sqlx::query(
            "INSERT INTO fragments (id, author_id, category_id, status, is_deleted, version, view_count, document, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(stored.id.0)
        .bind(stored.author.0)
        .bind(stored.category.0)
        .bind(stored.status.as_str())
        .bind(stored.is_deleted)
        .bind(to_db_version(stored.version)?)
        .bind(to_db_version(stored.view_count)?)
        .bind(Json(&stored))
        .bind(stored.created_at)
        .bind(stored.updated_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        debug!(fragment_id = %stored.id, "fragment inserted");
        Ok(stored)
    }

    async fn load_fragment(&self, id: FragmentId) -> Result<Fragment> {
        let row = sqlx::query("SELECT document, version, view_count FROM fragments WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;

        match row {
            Some(row) => fragment_from_row(&row),
            None => Err(DomainError::fragment_not_found(id)),
        }
    }

    async fn save_fragment(&self, fragment: &Fragment, expected_version: u64) -> Result<Fragment> {
        let mut stored = fragment.clone();
        stored.version = expected_version + 1;

        let views: Option<i64> = sqlx::query_scalar(
            "UPDATE fragments \
             SET category_id = $2, status = $3, is_deleted = $4, version = $5, document = $6, updated_at = $7 \
             WHERE id = $1 AND version = $8 \
             RETURNING view_count",
        )
        .bind(stored.id.0)
        .bind(stored.category.0)
        .bind(stored.status.as_str())
        .bind(stored.is_deleted)
        .bind(to_db_version(stored.version)?)
        .bind(Json(&stored))
        .bind(stored.updated_at)
        .bind(to_db_version(expected_version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        if let Some(views) = views {
            stored.view_count = from_db_count(views)?;
            debug!(fragment_id = %stored.id, version = stored.version, "fragment saved");
            return Ok(stored);
        }

        // Nothing matched: either the row is gone or someone else won.
        let found: Option<i64> = sqlx::query_scalar("SELECT version FROM fragments WHERE id = $1")
            .bind(stored.id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;

        match found {
            Some(found) => Err(DomainError::VersionConflict {
                id: stored.id.to_string(),
                expected: expected_version,
                found: from_db_count(found)?,
            }),
            None => Err(DomainError::fragment_not_found(stored.id)),
        }
    }

    async fn record_view(&self, id: FragmentId) -> Result<u64> {
        let views: Option<i64> = sqlx::query_scalar(
            "UPDATE fragments SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        match views {
            Some(views) => from_db_count(views),
            None => Err(DomainError::fragment_not_found(id)),
        }
    }

    async fn list_fragments(&self, query: &FragmentQuery) -> Result<Vec<Fragment>> {
        let mut sql: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT document, version, view_count FROM fragments WHERE TRUE");
        if !query.include_deleted {
            sql.push(" AND NOT is_deleted");
        }
        if let Some(author) = query.author {
            sql.push(" AND author_id = ").push_bind(author.0);
        }
        if let Some(category) = query.category {
            sql.push(" AND category_id = ").push_bind(category.0);
        }
        if let Some(statuses) = &query.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            sql.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        sql.push(" ORDER BY created_at DESC");

        let rows = sql.build().fetch_all(&self.pool).await.map_err(internal)?;
        rows.iter().map(fragment_from_row).collect()
    }
}

#[derive(Debug, Clone)]
pub struct PgCategoryRepository {
    pool: PgPool,
}

impl PgCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn category_exists(&self, id: CategoryId) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
    }
}

#[derive(Debug, Clone)]
pub struct PgFollowerDirectory {
    pool: PgPool,
}

impl PgFollowerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowerDirectory for PgFollowerDirectory {
    async fn followers_of(&self, author: UserId) -> Result<BTreeSet<UserId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT follower_id FROM follows WHERE author_id = $1")
            .bind(author.0)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        Ok(ids.into_iter().map(UserId::from).collect())
    }
}
