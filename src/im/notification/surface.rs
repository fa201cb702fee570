//! Platform notification surface: permission prompt, banners, window focus

use crate::im::lock;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Banner permission as reported by the platform
///
/// `Unsupported` never changes. `Default` only leaves through the prompt, and
/// `Denied` stays until the user changes it outside the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Unsupported,
    Default,
    Granted,
    Denied,
}

pub type ClickHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct NotificationOptions {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Banners with the same tag replace each other
    pub tag: Option<String>,
    pub on_click: Option<ClickHandler>,
}

impl fmt::Debug for NotificationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationOptions")
            .field("title", &self.title)
            .field("body", &self.body)
            .field("icon", &self.icon)
            .field("tag", &self.tag)
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

#[async_trait]
pub trait NotificationSurface: Send + Sync {
    fn permission(&self) -> PermissionState;

    /// Shows the platform prompt and returns the resulting state
    async fn request_permission(&self) -> Result<PermissionState>;

    fn show(&self, options: NotificationOptions) -> Result<()>;

    fn focus_window(&self);
}

/// A visible banner as kept by [`HeadlessSurface`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleBanner {
    pub title: String,
    pub body: String,
    pub tag: Option<String>,
}

/// In-process surface for hosts without native banners
///
/// Keeps visible banners in display order, replacing any banner with the same
/// tag, and answers the permission prompt with a fixed outcome.
pub struct HeadlessSurface {
    permission: Mutex<PermissionState>,
    prompt_answer: PermissionState,
    banners: Mutex<Vec<NotificationOptions>>,
    focus_requests: Mutex<u32>,
}

impl HeadlessSurface {
    pub fn new(initial: PermissionState, prompt_answer: PermissionState) -> Self {
        Self {
            permission: Mutex::new(initial),
            prompt_answer,
            banners: Mutex::new(Vec::new()),
            focus_requests: Mutex::new(0),
        }
    }

    pub fn visible(&self) -> Vec<VisibleBanner> {
        lock(&self.banners)
            .iter()
            .map(|b| VisibleBanner {
                title: b.title.clone(),
                body: b.body.clone(),
                tag: b.tag.clone(),
            })
            .collect()
    }

    /// Clicks the banner with `tag`: closes it and runs its handler
    pub fn click(&self, tag: &str) -> bool {
        let clicked = {
            let mut banners = lock(&self.banners);
            match banners.iter().position(|b| b.tag.as_deref() == Some(tag)) {
                Some(index) => Some(banners.remove(index)),
                None => None,
            }
        };
        match clicked {
            Some(banner) => {
                if let Some(handler) = banner.on_click {
                    handler();
                }
                true
            }
            None => false,
        }
    }

    pub fn focus_requests(&self) -> u32 {
        *lock(&self.focus_requests)
    }
}

#[async_trait]
impl NotificationSurface for HeadlessSurface {
    fn permission(&self) -> PermissionState {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        let mut permission = lock(&self.permission);
        if *permission == PermissionState::Default {
            *permission = self.prompt_answer;
            info!("[Surface] permission prompt answered: {:?}", *permission);
        }
        Ok(*permission)
    }

    fn show(&self, options: NotificationOptions) -> Result<()> {
        if self.permission() != PermissionState::Granted {
            bail!("banners are not permitted");
        }
        let mut banners = lock(&self.banners);
        if let Some(tag) = options.tag.as_deref() {
            banners.retain(|b| b.tag.as_deref() != Some(tag));
        }
        debug!("[Surface] showing banner {:?}", options.tag);
        banners.push(options);
        Ok(())
    }

    fn focus_window(&self) {
        *lock(&self.focus_requests) += 1;
    }
}
