//! Global notifier configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub fallback_customer_label: String,
    /// How long `has_new_message` stays raised after the last arrival
    pub has_new_duration: Duration,
    /// Characters of message text shown in a banner body
    pub preview_length: usize,
    pub banner_icon: Option<String>,
    pub dedup_capacity: usize,
    pub dedup_retain: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            fallback_customer_label: "Customer".to_string(),
            has_new_duration: Duration::from_secs(5),
            preview_length: 100,
            banner_icon: None,
            dedup_capacity: 100,
            dedup_retain: 50,
        }
    }
}
