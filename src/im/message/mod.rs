//! Message module
//!
//! Message rows and the per-conversation timeline.

pub mod dao;
pub mod listener;
pub mod models;
pub mod timeline;

pub use dao::MessageDao;
pub use listener::{EmptyTimelineListener, TimelineListener};
pub use models::TimelineConfig;
pub use timeline::{MessageTimeline, TimelineEntry};
