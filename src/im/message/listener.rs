//! Message timeline callbacks

use crate::im::message::timeline::TimelineEntry;
use crate::im::types::Message;
use async_trait::async_trait;

#[async_trait]
pub trait TimelineListener: Send + Sync {
    /// A message from the other participant arrived after the history loaded
    async fn on_new_message(&self, message: Message);

    /// The visible timeline changed (load, append, or a "new" flag expiring)
    async fn on_timeline_changed(&self, entries: Vec<TimelineEntry>);
}

/// No-op listener (default)
pub struct EmptyTimelineListener;

#[async_trait]
impl TimelineListener for EmptyTimelineListener {
    async fn on_new_message(&self, _message: Message) {}
    async fn on_timeline_changed(&self, _entries: Vec<TimelineEntry>) {}
}
