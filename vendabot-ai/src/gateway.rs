// vendabot-ai/src/gateway.rs

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{GeminiResponse, GenerateRequest};

#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Runs one generation call and returns the raw model text.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Search grounding only exists on the v1beta surface.
    fn endpoint(&self, grounding: bool) -> String {
        let version = if grounding { "v1beta" } else { "v1" };
        format!(
            "https://generativelanguage.googleapis.com/{}/models/{}:generateContent",
            version, self.model
        )
    }

    fn payload(request: &GenerateRequest, grounding: bool) -> Value {
        let mut generation_config = json!({
            "temperature": request.temperature,
        });
        if let Some(max) = request.max_output_tokens {
            generation_config["maxOutputTokens"] = json!(max);
        }
        // The API rejects responseMimeType together with search tools.
        if request.json_mode && !grounding {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let mut payload = json!({
            "contents": [{
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": generation_config,
        });
        if grounding {
            payload["tools"] = json!([{ "google_search": {} }]);
        }
        payload
    }

    async fn call(&self, request: &GenerateRequest, grounding: bool) -> Result<String> {
        let url = self.endpoint(grounding);
        debug!(model = %self.model, grounding, "calling Gemini");

        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::payload(request, grounding))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Gemini HTTP {status}: {body}"));
        }

        let parsed: GeminiResponse = serde_json::from_str(&body)?;
        parsed
            .first_text()
            .ok_or_else(|| anyhow!("Gemini returned no candidate text"))
    }
}

#[async_trait]
impl LlmGateway for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        match self.call(request, request.grounding).await {
            Ok(text) => Ok(text),
            // Some models reject the search tool outright; retry ungrounded
            // rather than failing the whole question.
            Err(e) if request.grounding && e.to_string().contains("Search Grounding is not supported") => {
                warn!("search grounding unsupported for {}, retrying without", self.model);
                self.call(request, false).await
            }
            Err(e) => Err(e),
        }
    }
}
