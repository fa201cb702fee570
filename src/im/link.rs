//! Link registry: resolves the display name a customer gave when redeeming
//! a chat link
//!
//! Resolution is best-effort. Callers go through [`display_name`], which turns
//! misses and failures into the configured fallback label.

use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait LinkRegistry: Send + Sync {
    async fn resolve(&self, customer_id: &str) -> Result<Option<String>>;
}

/// Resolves a name, falling back to `fallback` on a miss, a blank name or an error
pub async fn display_name(registry: &dyn LinkRegistry, customer_id: &str, fallback: &str) -> String {
    match registry.resolve(customer_id).await {
        Ok(Some(name)) if !name.trim().is_empty() => name,
        Ok(_) => {
            debug!("[Link] no name for customer {}, using fallback", customer_id);
            fallback.to_string()
        }
        Err(e) => {
            warn!("[Link] failed to resolve customer {}: {:#}", customer_id, e);
            fallback.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLink {
    pub id: String,
    pub owner_id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
}

/// Registry backed by the `chat_links` table
#[derive(Clone)]
pub struct SqliteLinkRegistry {
    db: Pool<Sqlite>,
}

impl SqliteLinkRegistry {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Records a redeemed link and returns it
    pub async fn register(
        &self,
        owner_id: &str,
        customer_id: &str,
        customer_name: Option<&str>,
    ) -> Result<ChatLink> {
        let link = ChatLink {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            customer_id: customer_id.to_string(),
            customer_name: customer_name.map(str::to_string),
        };
        sqlx::query(
            "INSERT INTO chat_links (id, owner_id, customer_id, customer_name, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&link.id)
        .bind(&link.owner_id)
        .bind(&link.customer_id)
        .bind(&link.customer_name)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .context("failed to register chat link")?;
        Ok(link)
    }
}

#[async_trait]
impl LinkRegistry for SqliteLinkRegistry {
    async fn resolve(&self, customer_id: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT customer_name FROM chat_links WHERE customer_id = ? \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(customer_id)
        .fetch_optional(&self.db)
        .await
        .context("failed to query chat links")?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>("customer_name")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveLinkResp {
    customer_name: Option<String>,
}

/// Registry served by the backend's REST API
pub struct HttpLinkRegistry {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpLinkRegistry {
    /// `token` is sent as a default header on every request
    pub fn new(api_base_url: String, token: &str) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("token"),
                    reqwest::header::HeaderValue::from_str(token).context("invalid token")?,
                );
                headers
            })
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base_url,
        })
    }
}

#[async_trait]
impl LinkRegistry for HttpLinkRegistry {
    async fn resolve(&self, customer_id: &str) -> Result<Option<String>> {
        let url = format!("{}/chat_links/resolve", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("operationID", Uuid::new_v4().to_string())
            .json(&serde_json::json!({ "customerID": customer_id }))
            .send()
            .await
            .context("link resolve request failed")?;
        let resp = handle_http_response::<ResolveLinkResp>(response, "resolve link").await?;
        Ok(resp.data.and_then(|d| d.customer_name))
    }
}
