//! Message timeline configuration

use crate::im::types::SenderType;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Role of the person looking at the timeline
    pub viewer: SenderType,
    /// How long a freshly arrived foreign message carries the "new" flag
    pub new_flag_duration: Duration,
}

impl TimelineConfig {
    pub fn for_viewer(viewer: SenderType) -> Self {
        Self {
            viewer,
            ..Default::default()
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            viewer: SenderType::Owner,
            new_flag_duration: Duration::from_secs(1),
        }
    }
}
