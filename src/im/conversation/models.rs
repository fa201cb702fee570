//! Conversation directory configuration

use std::time::Duration;

/// Directory tuning, normally derived from `ClientConfig`
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Shown when the link registry has no usable name
    pub fallback_customer_label: String,
    /// How long a conversation stays highlighted after a customer message
    pub highlight_duration: Duration,
    pub dedup_capacity: usize,
    pub dedup_retain: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            fallback_customer_label: "Customer".to_string(),
            highlight_duration: Duration::from_secs(3),
            dedup_capacity: 100,
            dedup_retain: 50,
        }
    }
}
