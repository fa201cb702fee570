use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error};

/// Who authored a message (and, for a timeline, who is looking at it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Owner,
    Customer,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Owner => "owner",
            SenderType::Customer => "customer",
        }
    }

    /// The other participant of a conversation
    pub fn counterpart(&self) -> SenderType {
        match self {
            SenderType::Owner => SenderType::Customer,
            SenderType::Customer => SenderType::Owner,
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "owner" => Ok(SenderType::Owner),
            "customer" => Ok(SenderType::Customer),
            other => Err(anyhow::anyhow!("unknown sender type: {}", other)),
        }
    }
}

/// Kind of attachment carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Audio,
    Video,
    Document,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Document => "document",
        }
    }

    /// Glyph shown in previews when a message has no text
    pub fn glyph(&self) -> &'static str {
        match self {
            MediaType::Image => "📷",
            MediaType::Audio => "🎵",
            MediaType::Video => "🎬",
            MediaType::Document => "📄",
        }
    }

    /// Label used when the attachment has no file name
    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Image => "Image",
            MediaType::Audio => "Audio",
            MediaType::Video => "Video",
            MediaType::Document => "Document",
        }
    }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "image" => Ok(MediaType::Image),
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            "document" => Ok(MediaType::Document),
            other => Err(anyhow::anyhow!("unknown media type: {}", other)),
        }
    }
}

/// One owner/customer conversation
///
/// Exactly one exists per (owner, customer) pair. The unread counters are
/// maintained by the store: `unread_owner_count` only grows on customer
/// messages and only drops (to zero) on an explicit read-mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    pub customer_id: String,
    pub link_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_owner_count: u32,
    pub unread_customer_count: u32,
    pub ai_enabled: bool,
    pub active_agent_id: Option<String>,
}

/// A persisted chat message. Only the two read flags ever change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub owner_id: String,
    pub customer_id: String,
    pub sender_type: SenderType,
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read_by_owner: bool,
    pub is_read_by_customer: bool,
}

impl Message {
    pub fn is_read_by(&self, reader: SenderType) -> bool {
        match reader {
            SenderType::Owner => self.is_read_by_owner,
            SenderType::Customer => self.is_read_by_customer,
        }
    }
}

/// Row to insert; id, timestamp and read flags are assigned by the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: String,
    pub owner_id: String,
    pub customer_id: String,
    pub sender_type: Option<SenderType>,
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Partial update of the mutable conversation settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPatch {
    pub ai_enabled: Option<bool>,
    /// `Some(None)` clears the active agent
    pub active_agent_id: Option<Option<String>>,
}

/// Conversation row joined with the customer's display name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub customer_name: String,
}

/// lastMessageAt descending, conversations without messages last
pub fn compare_by_recent_activity(a: &Conversation, b: &Conversation) -> Ordering {
    match (&a.last_message_at, &b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// createdAt ascending, id as tiebreak
pub fn compare_chronologically(a: &Message, b: &Message) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Unified API envelope (errCode, errMsg, data); `data` may be null or missing
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    pub data: Option<T>,
}

/// Shared HTTP response handling: status check, envelope decode, errCode check
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use anyhow::Context;

    let status = response.status();
    let body_bytes = response.bytes().await.context("failed to read response body")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {} response body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {} request failed, status: {}, body: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP error {}: {}", status, body_str));
    }

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {} failed to decode: {:?}\nraw body: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("failed to decode response: {:?}", e)
    })?;

    if api_resp.err_code != 0 {
        error!(
            "[HTTP] {} server error, code: {}, message: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(anyhow::anyhow!(
            "server error {}: {}",
            api_resp.err_code,
            api_resp.err_msg
        ));
    }

    Ok(api_resp)
}
