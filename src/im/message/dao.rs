//! Message data access (sqlx / SQLite)

use crate::im::types::{millis_to_datetime, Message, SenderType};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use tracing::{debug, warn};

const MESSAGE_COLUMNS: &str = r#"
    id, conversation_id, owner_id, customer_id, sender_type, content,
    media_url, media_type, file_name, created_at, is_read_by_owner, is_read_by_customer
"#;

#[derive(Clone)]
pub struct MessageDao {
    db: Pool<Sqlite>,
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let sender: String = row.get("sender_type");
    let media_type: Option<String> = row.get("media_type");
    let is_read_by_owner: i64 = row.get("is_read_by_owner");
    let is_read_by_customer: i64 = row.get("is_read_by_customer");

    let media_type = match media_type.as_deref() {
        Some(raw) => match raw.parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!("[MsgDAO] ignoring media type: {}", e);
                None
            }
        },
        None => None,
    };

    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        owner_id: row.get("owner_id"),
        customer_id: row.get("customer_id"),
        sender_type: sender.parse()?,
        content: row.get("content"),
        media_url: row.get("media_url"),
        media_type,
        file_name: row.get("file_name"),
        created_at: millis_to_datetime(row.get("created_at")),
        is_read_by_owner: is_read_by_owner != 0,
        is_read_by_customer: is_read_by_customer != 0,
    })
}

impl MessageDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Full history of a conversation, oldest first
    pub async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id)
            .fetch_all(&self.db)
            .await
            .context("failed to list messages")?;
        debug!(
            "[MsgDAO] conversation {} has {} messages",
            conversation_id,
            rows.len()
        );
        rows.iter().map(row_to_message).collect()
    }

    pub(crate) async fn insert_with(conn: &mut SqliteConnection, msg: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, owner_id, customer_id, sender_type, content,
                media_url, media_type, file_name, created_at, is_read_by_owner, is_read_by_customer
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.conversation_id)
        .bind(&msg.owner_id)
        .bind(&msg.customer_id)
        .bind(msg.sender_type.as_str())
        .bind(&msg.content)
        .bind(&msg.media_url)
        .bind(msg.media_type.map(|m| m.as_str()))
        .bind(&msg.file_name)
        .bind(msg.created_at.timestamp_millis())
        .bind(if msg.is_read_by_owner { 1i64 } else { 0i64 })
        .bind(if msg.is_read_by_customer { 1i64 } else { 0i64 })
        .execute(&mut *conn)
        .await
        .context("failed to insert message")?;
        Ok(())
    }

    /// Marks every message written by the other side as read for `reader`
    pub(crate) async fn mark_read_with(
        conn: &mut SqliteConnection,
        conversation_id: &str,
        reader: SenderType,
    ) -> Result<u64> {
        let sql = match reader {
            SenderType::Owner => {
                "UPDATE messages SET is_read_by_owner = 1 \
                 WHERE conversation_id = ? AND sender_type = ? AND is_read_by_owner = 0"
            }
            SenderType::Customer => {
                "UPDATE messages SET is_read_by_customer = 1 \
                 WHERE conversation_id = ? AND sender_type = ? AND is_read_by_customer = 0"
            }
        };
        let result = sqlx::query(sql)
            .bind(conversation_id)
            .bind(reader.counterpart().as_str())
            .execute(&mut *conn)
            .await
            .context("failed to mark messages as read")?;
        Ok(result.rows_affected())
    }
}
