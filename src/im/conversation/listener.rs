//! Conversation directory callbacks

use crate::im::types::{ConversationEntry, MediaType};
use async_trait::async_trait;

/// Callbacks raised by a `ConversationDirectory`
#[async_trait]
pub trait DirectoryListener: Send + Sync {
    /// A customer message arrived for one of the owner's conversations
    async fn on_new_message(
        &self,
        conversation_id: String,
        customer_name: String,
        content: String,
        media_type: Option<MediaType>,
        file_name: Option<String>,
    );

    /// The list was reloaded
    async fn on_conversations_changed(&self, conversations: Vec<ConversationEntry>);

    /// A conversation entered or left the highlighted state
    async fn on_highlight_changed(&self, conversation_id: String, highlighted: bool);
}

/// No-op listener (default)
pub struct EmptyDirectoryListener;

#[async_trait]
impl DirectoryListener for EmptyDirectoryListener {
    async fn on_new_message(
        &self,
        _conversation_id: String,
        _customer_name: String,
        _content: String,
        _media_type: Option<MediaType>,
        _file_name: Option<String>,
    ) {
    }
    async fn on_conversations_changed(&self, _conversations: Vec<ConversationEntry>) {}
    async fn on_highlight_changed(&self, _conversation_id: String, _highlighted: bool) {}
}
