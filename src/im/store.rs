//! Persisted store seam and the bundled SQLite implementation
//!
//! `SqliteStore` behaves like a database with change-data-capture: after every
//! committed mutation it publishes the affected rows on its `LocalChangeBus`.

use crate::im::bus::{ChangeEvent, LocalChangeBus};
use crate::im::conversation::dao::ConversationDao;
use crate::im::message::dao::MessageDao;
use crate::im::types::{millis_to_datetime, Conversation, ConversationPatch, Message, NewMessage, SenderType};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Owner's conversations, lastMessageAt descending, nulls last
    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<Conversation>>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Conversation history, createdAt ascending with id as tiebreak
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// Marks the other side's messages read for `reader` and zeroes the
    /// reader's unread counter. Returns how many messages changed.
    async fn mark_conversation_read(&self, conversation_id: &str, reader: SenderType) -> Result<u64>;

    async fn update_conversation(&self, conversation_id: &str, patch: ConversationPatch) -> Result<()>;

    /// Removes the conversation and all of its messages
    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;

    /// Get-or-create of the single conversation for (owner, customer)
    async fn redeem_link(&self, owner_id: &str, customer_id: &str, link_id: Option<&str>) -> Result<Conversation>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: Pool<Sqlite>,
    conversations: ConversationDao,
    messages: MessageDao,
    bus: LocalChangeBus,
}

impl SqliteStore {
    pub fn new(db: Pool<Sqlite>, bus: LocalChangeBus) -> Self {
        Self {
            conversations: ConversationDao::new(db.clone()),
            messages: MessageDao::new(db.clone()),
            db,
            bus,
        }
    }

    pub fn bus(&self) -> &LocalChangeBus {
        &self.bus
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    /// Publishes the current row after a committed change. The change stands
    /// even if the row cannot be reloaded, so failures are only logged.
    async fn publish_conversation(&self, conversation_id: &str) {
        match self.conversations.get(conversation_id).await {
            Ok(Some(conversation)) => {
                self.bus
                    .publish(ChangeEvent::conversation_updated(conversation))
                    .await
            }
            Ok(None) => {}
            Err(e) => warn!(
                "[Store] change to {} committed but not published: {:#}",
                conversation_id, e
            ),
        }
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<Conversation>> {
        self.conversations.list_by_owner(owner_id).await
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.conversations.get(conversation_id).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.messages.list_by_conversation(conversation_id).await
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message> {
        let sender_type = match new.sender_type {
            Some(sender) => sender,
            None => bail!("message has no sender type"),
        };
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: new.conversation_id,
            owner_id: new.owner_id,
            customer_id: new.customer_id,
            sender_type,
            content: new.content,
            media_url: new.media_url,
            media_type: new.media_type,
            file_name: new.file_name,
            // stored with millisecond precision, keep the in-memory copy identical
            created_at: millis_to_datetime(Utc::now().timestamp_millis()),
            is_read_by_owner: sender_type == SenderType::Owner,
            is_read_by_customer: sender_type == SenderType::Customer,
        };

        let mut tx = self.db.begin().await.context("failed to open transaction")?;
        let found = ConversationDao::record_message_with(
            &mut tx,
            &message.conversation_id,
            sender_type,
            message.created_at,
        )
        .await?;
        if !found {
            bail!("conversation {} does not exist", message.conversation_id);
        }
        MessageDao::insert_with(&mut tx, &message).await?;
        tx.commit().await.context("failed to commit message insert")?;

        debug!(
            "[Store] inserted message {} into {} ({})",
            message.id, message.conversation_id, sender_type
        );
        self.bus
            .publish(ChangeEvent::message_inserted(message.clone()))
            .await;
        self.publish_conversation(&message.conversation_id).await;
        Ok(message)
    }

    async fn mark_conversation_read(&self, conversation_id: &str, reader: SenderType) -> Result<u64> {
        let mut tx = self.db.begin().await.context("failed to open transaction")?;
        let changed = MessageDao::mark_read_with(&mut tx, conversation_id, reader).await?;
        ConversationDao::reset_unread_with(&mut tx, conversation_id, reader).await?;
        tx.commit().await.context("failed to commit read-mark")?;

        debug!(
            "[Store] {} read-mark on {} changed {} messages",
            reader, conversation_id, changed
        );
        self.publish_conversation(conversation_id).await;
        Ok(changed)
    }

    async fn update_conversation(&self, conversation_id: &str, patch: ConversationPatch) -> Result<()> {
        if !self.conversations.update(conversation_id, &patch).await? {
            bail!("conversation {} does not exist", conversation_id);
        }
        self.publish_conversation(conversation_id).await;
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        if !self.conversations.delete(conversation_id).await? {
            bail!("conversation {} does not exist", conversation_id);
        }
        info!("[Store] deleted conversation {}", conversation_id);
        Ok(())
    }

    async fn redeem_link(&self, owner_id: &str, customer_id: &str, link_id: Option<&str>) -> Result<Conversation> {
        let created = self
            .conversations
            .insert_if_absent(owner_id, customer_id, link_id)
            .await?;
        let conversation = self
            .conversations
            .get_by_pair(owner_id, customer_id)
            .await?
            .context("conversation missing after redeem")?;
        if created {
            info!(
                "[Store] conversation {} created for owner {} / customer {}",
                conversation.id, owner_id, customer_id
            );
            self.bus
                .publish(ChangeEvent::conversation_inserted(conversation.clone()))
                .await;
        }
        Ok(conversation)
    }
}
