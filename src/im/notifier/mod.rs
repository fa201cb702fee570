//! Notifier module
//!
//! Session-wide unread tracking and owner notifications.

pub mod global;
pub mod listener;
pub mod models;

pub use global::{banner_tag, preview, GlobalNotifier};
pub use listener::{EmptyNotifierListener, NotifierListener};
pub use models::NotifierConfig;
