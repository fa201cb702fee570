//! Conversation module
//!
//! Conversation rows, the owner's conversation directory and its callbacks.

pub mod dao;
pub mod directory;
pub mod listener;
pub mod models;

pub use dao::ConversationDao;
pub use directory::ConversationDirectory;
pub use listener::{DirectoryListener, EmptyDirectoryListener};
pub use models::DirectoryConfig;
