//! Conversation data access (sqlx / SQLite)

use crate::im::types::{millis_to_datetime, Conversation, ConversationPatch, SenderType};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = r#"
    id, owner_id, customer_id, link_id, created_at, updated_at, last_message_at,
    unread_owner_count, unread_customer_count, ai_enabled, active_agent_id
"#;

#[derive(Clone)]
pub struct ConversationDao {
    db: Pool<Sqlite>,
}

fn counter(row: &SqliteRow, column: &str) -> u32 {
    let raw: i64 = row.get(column);
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn row_to_conversation(row: &SqliteRow) -> Conversation {
    let ai_enabled: i64 = row.get("ai_enabled");
    let last_message_at: Option<i64> = row.get("last_message_at");
    Conversation {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        customer_id: row.get("customer_id"),
        link_id: row.get("link_id"),
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
        last_message_at: last_message_at.map(millis_to_datetime),
        unread_owner_count: counter(row, "unread_owner_count"),
        unread_customer_count: counter(row, "unread_customer_count"),
        ai_enabled: ai_enabled != 0,
        active_agent_id: row.get("active_agent_id"),
    }
}

impl ConversationDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// All conversations of an owner, most recent activity first, idle ones last
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Conversation>> {
        let sql = format!(
            "SELECT {} FROM conversations WHERE owner_id = ? \
             ORDER BY last_message_at IS NULL, last_message_at DESC",
            CONVERSATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.db)
            .await
            .context("failed to list conversations")?;
        debug!(
            "[ConvDAO] owner {} has {} conversations",
            owner_id,
            rows.len()
        );
        Ok(rows.iter().map(row_to_conversation).collect())
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let sql = format!(
            "SELECT {} FROM conversations WHERE id = ?",
            CONVERSATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(conversation_id)
            .fetch_optional(&self.db)
            .await
            .context("failed to load conversation")?;
        Ok(row.as_ref().map(row_to_conversation))
    }

    pub async fn get_by_pair(&self, owner_id: &str, customer_id: &str) -> Result<Option<Conversation>> {
        let sql = format!(
            "SELECT {} FROM conversations WHERE owner_id = ? AND customer_id = ?",
            CONVERSATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(owner_id)
            .bind(customer_id)
            .fetch_optional(&self.db)
            .await
            .context("failed to load conversation by participants")?;
        Ok(row.as_ref().map(row_to_conversation))
    }

    /// Inserts the (owner, customer) conversation unless it already exists.
    /// Returns `true` when a row was created.
    pub async fn insert_if_absent(
        &self,
        owner_id: &str,
        customer_id: &str,
        link_id: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO conversations (
                id, owner_id, customer_id, link_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(owner_id)
        .bind(customer_id)
        .bind(link_id)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .context("failed to create conversation")?;
        Ok(result.rows_affected() == 1)
    }

    /// Bumps activity and the recipient's unread counter for a new message
    pub(crate) async fn record_message_with(
        conn: &mut SqliteConnection,
        conversation_id: &str,
        sender: SenderType,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let (owner_inc, customer_inc) = match sender {
            SenderType::Customer => (1i64, 0i64),
            SenderType::Owner => (0, 1),
        };
        let ms = at.timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_at = ?,
                updated_at = ?,
                unread_owner_count = unread_owner_count + ?,
                unread_customer_count = unread_customer_count + ?
            WHERE id = ?
            "#,
        )
        .bind(ms)
        .bind(ms)
        .bind(owner_inc)
        .bind(customer_inc)
        .bind(conversation_id)
        .execute(&mut *conn)
        .await
        .context("failed to update conversation activity")?;
        Ok(result.rows_affected() == 1)
    }

    /// Sets the reader's unread counter to zero
    pub(crate) async fn reset_unread_with(
        conn: &mut SqliteConnection,
        conversation_id: &str,
        reader: SenderType,
    ) -> Result<()> {
        let sql = match reader {
            SenderType::Owner => "UPDATE conversations SET unread_owner_count = 0 WHERE id = ?",
            SenderType::Customer => {
                "UPDATE conversations SET unread_customer_count = 0 WHERE id = ?"
            }
        };
        sqlx::query(sql)
            .bind(conversation_id)
            .execute(&mut *conn)
            .await
            .context("failed to reset unread counter")?;
        Ok(())
    }

    pub async fn update(&self, conversation_id: &str, patch: &ConversationPatch) -> Result<bool> {
        let mut tx = self.db.begin().await.context("failed to open transaction")?;
        let now = Utc::now().timestamp_millis();

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .context("failed to touch conversation")?;
        if touched.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(enabled) = patch.ai_enabled {
            sqlx::query("UPDATE conversations SET ai_enabled = ? WHERE id = ?")
                .bind(if enabled { 1i64 } else { 0i64 })
                .bind(conversation_id)
                .execute(&mut *tx)
                .await
                .context("failed to update ai_enabled")?;
        }
        if let Some(agent) = &patch.active_agent_id {
            sqlx::query("UPDATE conversations SET active_agent_id = ? WHERE id = ?")
                .bind(agent.as_deref())
                .bind(conversation_id)
                .execute(&mut *tx)
                .await
                .context("failed to update active_agent_id")?;
        }

        tx.commit().await.context("failed to commit conversation update")?;
        Ok(true)
    }

    /// Deletes the conversation together with all of its messages
    pub async fn delete(&self, conversation_id: &str) -> Result<bool> {
        let mut tx = self.db.begin().await.context("failed to open transaction")?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .context("failed to delete conversation messages")?;
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .context("failed to delete conversation")?;
        tx.commit().await.context("failed to commit delete")?;
        Ok(result.rows_affected() == 1)
    }
}
