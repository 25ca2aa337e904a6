//! Postgres-backed review store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revdesk_core::{Category, NewReview, Review, Sentiment};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use crate::{ReviewStore, StoreError};

const SELECT_BY_EXTERNAL_ID: &str = "SELECT id, external_id, product_id, product_name, rating, text, \
     customer_name, sentiment, category, answered, drafts, created_at, ingested_at \
     FROM reviews WHERE external_id = $1";

const INSERT_IF_ABSENT: &str = "INSERT INTO reviews (id, external_id, product_id, product_name, rating, \
     text, customer_name, sentiment, category, answered, drafts, created_at, ingested_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10, $11, $12) \
     ON CONFLICT (external_id) DO NOTHING \
     RETURNING id, external_id, product_id, product_name, rating, text, customer_name, \
     sentiment, category, answered, drafts, created_at, ingested_at";

#[derive(Debug, Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn review_from_row(row: &PgRow) -> Result<Review, StoreError> {
    let external_id: String = row.try_get("external_id")?;
    let corrupt = |reason: String| StoreError::Corrupt {
        external_id: external_id.clone(),
        reason,
    };

    let sentiment = row
        .try_get::<Option<String>, _>("sentiment")?
        .map(|s| s.parse::<Sentiment>())
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let category = row
        .try_get::<Option<String>, _>("category")?
        .map(|s| s.parse::<Category>())
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let Json(drafts) = row.try_get::<Json<Vec<String>>, _>("drafts")?;

    Ok(Review {
        id: row.try_get::<Uuid, _>("id")?,
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        rating: row.try_get("rating")?,
        text: row.try_get("text")?,
        customer_name: row.try_get("customer_name")?,
        sentiment,
        category,
        answered: row.try_get("answered")?,
        drafts,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        ingested_at: row.try_get::<DateTime<Utc>, _>("ingested_at")?,
        external_id,
    })
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query(SELECT_BY_EXTERNAL_ID)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn insert_if_absent(&self, review: NewReview) -> Result<Option<Review>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(INSERT_IF_ABSENT)
            .bind(review.id)
            .bind(&review.external_id)
            .bind(&review.product_id)
            .bind(&review.product_name)
            .bind(review.rating)
            .bind(&review.text)
            .bind(&review.customer_name)
            .bind(review.sentiment.map(|s| s.as_str()))
            .bind(review.category.map(|c| c.as_str()))
            .bind(Json(&review.drafts))
            .bind(review.created_at)
            .bind(review.ingested_at)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn mark_answered(&self, external_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE reviews SET answered = TRUE WHERE external_id = $1")
            .bind(external_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
