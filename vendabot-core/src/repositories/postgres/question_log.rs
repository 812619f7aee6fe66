// vendabot-core/src/repositories/postgres/question_log.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::models::{merge_patch, QuestionPatch, QuestionRecord};
use crate::Error;

#[async_trait]
pub trait QuestionLogRepository: Send + Sync {
    async fn get(&self, question_id: i64) -> Result<Option<QuestionRecord>, Error>;

    /// Looks a question up by the message id of its outbound notification.
    /// This is how an inbound quoted reply is correlated back to a question.
    async fn get_by_notification_id(
        &self,
        message_id: &str,
    ) -> Result<Option<QuestionRecord>, Error>;

    /// Merge-writes one row. Missing rows are created; existing rows are
    /// merged per [`merge_patch`], and an illegal status transition fails the
    /// whole write with no change to the row.
    async fn upsert(&self, patch: &QuestionPatch) -> Result<QuestionRecord, Error>;

    /// Questions for `seller_id` still in AWAITING_REPLY whose notification
    /// went out at or before `cutoff`, oldest first, at most `limit` rows.
    async fn awaiting_reply_older_than(
        &self,
        seller_id: i64,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuestionRecord>, Error>;
}

#[derive(Clone)]
pub struct PostgresQuestionLogRepository {
    pool: Pool<Postgres>,
}

impl PostgresQuestionLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionLogRepository for PostgresQuestionLogRepository {
    async fn get(&self, question_id: i64) -> Result<Option<QuestionRecord>, Error> {
        let row = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT question_id, tenant_id, seller_id, item_id, question_text,
                   status, ai_response_text, error_message, notification_message_id,
                   created_at, notified_at, ai_answered_at, human_answered_at,
                   last_processed_at
            FROM question_log
            WHERE question_id = $1
            "#,
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_by_notification_id(
        &self,
        message_id: &str,
    ) -> Result<Option<QuestionRecord>, Error> {
        let row = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT question_id, tenant_id, seller_id, item_id, question_text,
                   status, ai_response_text, error_message, notification_message_id,
                   created_at, notified_at, ai_answered_at, human_answered_at,
                   last_processed_at
            FROM question_log
            WHERE notification_message_id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert(&self, patch: &QuestionPatch) -> Result<QuestionRecord, Error> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so concurrent writers (webhook vs. sweeper) serialize
        // and the transition check sees the latest state.
        let existing = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT question_id, tenant_id, seller_id, item_id, question_text,
                   status, ai_response_text, error_message, notification_message_id,
                   created_at, notified_at, ai_answered_at, human_answered_at,
                   last_processed_at
            FROM question_log
            WHERE question_id = $1
            FOR UPDATE
            "#,
        )
        .bind(patch.question_id)
        .fetch_optional(&mut *tx)
        .await?;

        let merged = merge_patch(existing.as_ref(), patch, Utc::now())?;

        sqlx::query(
            r#"
            INSERT INTO question_log (
                question_id, tenant_id, seller_id, item_id, question_text,
                status, ai_response_text, error_message, notification_message_id,
                created_at, notified_at, ai_answered_at, human_answered_at,
                last_processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (question_id) DO UPDATE
               SET tenant_id               = EXCLUDED.tenant_id,
                   seller_id               = EXCLUDED.seller_id,
                   item_id                 = EXCLUDED.item_id,
                   question_text           = EXCLUDED.question_text,
                   status                  = EXCLUDED.status,
                   ai_response_text        = EXCLUDED.ai_response_text,
                   error_message           = EXCLUDED.error_message,
                   notification_message_id = EXCLUDED.notification_message_id,
                   notified_at             = EXCLUDED.notified_at,
                   ai_answered_at          = EXCLUDED.ai_answered_at,
                   human_answered_at       = EXCLUDED.human_answered_at,
                   last_processed_at       = EXCLUDED.last_processed_at
            "#,
        )
        .bind(merged.question_id)
        .bind(merged.tenant_id)
        .bind(merged.seller_id)
        .bind(&merged.item_id)
        .bind(&merged.question_text)
        .bind(merged.status)
        .bind(&merged.ai_response_text)
        .bind(&merged.error_message)
        .bind(&merged.notification_message_id)
        .bind(merged.created_at)
        .bind(merged.notified_at)
        .bind(merged.ai_answered_at)
        .bind(merged.human_answered_at)
        .bind(merged.last_processed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(merged)
    }

    async fn awaiting_reply_older_than(
        &self,
        seller_id: i64,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuestionRecord>, Error> {
        let rows = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT question_id, tenant_id, seller_id, item_id, question_text,
                   status, ai_response_text, error_message, notification_message_id,
                   created_at, notified_at, ai_answered_at, human_answered_at,
                   last_processed_at
            FROM question_log
            WHERE seller_id = $1
              AND status = 'AWAITING_REPLY'
              AND notified_at IS NOT NULL
              AND notified_at <= $2
            ORDER BY notified_at ASC
            LIMIT $3
            "#,
        )
        .bind(seller_id)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
