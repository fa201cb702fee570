pub mod im;

// Re-export the commonly used types
pub use im::{
    client::{ChatClient, ClientConfig},
    conversation::ConversationDirectory,
    message::MessageTimeline,
    notification::NotificationChannel,
    notifier::GlobalNotifier,
    store::{ChatStore, SqliteStore},
};
