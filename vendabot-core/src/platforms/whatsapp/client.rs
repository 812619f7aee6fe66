// vendabot-core/src/platforms/whatsapp/client.rs
//
// Outbound WhatsApp via an Evolution API instance. Send operations return the
// gateway's message id, which we persist to correlate quoted replies.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::Error;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends plain text to `jid`, returning the gateway message id.
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, Error>;

    /// Sends an image by URL with a caption, returning the gateway message id.
    async fn send_image(&self, jid: &str, image_url: &str, caption: &str)
        -> Result<String, Error>;
}

#[derive(Clone)]
pub struct EvolutionClient {
    http: reqwest::Client,
    base_url: String,
    instance: String,
    api_key: String,
}

impl EvolutionClient {
    pub fn new(
        base_url: impl Into<String>,
        instance: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            instance: instance.into(),
            api_key: api_key.into(),
        })
    }

    async fn post(&self, path: &str, payload: Value) -> Result<String, Error> {
        let url = format!("{}/message/{}/{}", self.base_url, path, self.instance);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Messaging(format!(
                "{path}: HTTP {status}: {body}"
            )));
        }

        let body: Value = resp.json().await?;
        message_id(&body).ok_or_else(|| {
            Error::Messaging(format!("{path}: response carried no message id: {body}"))
        })
    }
}

/// Evolution API versions differ in where the id lands; accept all known
/// shapes.
fn message_id(body: &Value) -> Option<String> {
    body.pointer("/key/id")
        .or_else(|| body.pointer("/messageSend/key/id"))
        .or_else(|| body.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl Messenger for EvolutionClient {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, Error> {
        debug!(jid, "sending text message");
        self.post(
            "sendText",
            json!({
                "number": jid,
                "options": { "delay": 1200, "presence": "composing" },
                "text": text,
            }),
        )
        .await
    }

    async fn send_image(
        &self,
        jid: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, Error> {
        debug!(jid, "sending image message");
        self.post(
            "sendMedia",
            json!({
                "number": jid,
                "options": { "delay": 1200, "presence": "composing" },
                "mediatype": "image",
                "media": image_url,
                "caption": caption,
                "fileName": "item.jpg",
            }),
        )
        .await
    }
}
