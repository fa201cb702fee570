//! Global notifier callbacks

use async_trait::async_trait;

#[async_trait]
pub trait NotifierListener: Send + Sync {
    /// Total unread customer messages across all conversations changed
    async fn on_unread_count_changed(&self, unread_count: u32);

    async fn on_has_new_message_changed(&self, has_new_message: bool);

    /// A banner was clicked; the window has already been focused
    async fn on_notification_clicked(&self, conversation_id: String);
}

/// No-op listener (default)
pub struct EmptyNotifierListener;

#[async_trait]
impl NotifierListener for EmptyNotifierListener {
    async fn on_unread_count_changed(&self, _unread_count: u32) {}
    async fn on_has_new_message_changed(&self, _has_new_message: bool) {}
    async fn on_notification_clicked(&self, _conversation_id: String) {}
}
