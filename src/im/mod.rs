pub mod bus;
pub mod client;
pub mod conversation;
pub mod db;
pub mod dedup;
pub mod link;
pub mod message;
pub mod notification;
pub mod notifier;
pub mod store;
pub mod transient;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Mutex, MutexGuard};

// Re-export the commonly used types
pub use bus::{ChangeBus, ChangeEvent, ChangeFilter, ChangeHandler, ChangeRow, LocalChangeBus, Subscription};
pub use client::{ChatClient, ClientConfig};
pub use conversation::{ConversationDirectory, DirectoryConfig, DirectoryListener, EmptyDirectoryListener};
pub use link::{HttpLinkRegistry, LinkRegistry, SqliteLinkRegistry};
pub use message::{EmptyTimelineListener, MessageTimeline, TimelineConfig, TimelineEntry, TimelineListener};
pub use notification::{CueKind, NotificationChannel, NotificationSettings, PermissionState};
pub use notifier::{EmptyNotifierListener, GlobalNotifier, NotifierConfig, NotifierListener};
pub use store::{ChatStore, SqliteStore};
pub use types::{Conversation, ConversationEntry, ConversationPatch, MediaType, Message, NewMessage, SenderType};

/// Locks `m`, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
