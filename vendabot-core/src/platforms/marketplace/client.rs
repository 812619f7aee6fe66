// vendabot-core/src/platforms/marketplace/client.rs
//
// Thin client over the marketplace's REST API. Auth failures (401/403) are
// surfaced as Error::Auth so callers can deactivate the connection; every
// other non-2xx becomes Error::Marketplace with the body attached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDetail {
    pub id: i64,
    pub seller_id: i64,
    pub item_id: Option<String>,
    pub status: String,
    pub text: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
}

impl QuestionDetail {
    /// Only UNANSWERED questions are still open for us to act on.
    pub fn is_unanswered(&self) -> bool {
        self.status.eq_ignore_ascii_case("UNANSWERED")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionSearchPage {
    pub questions: Vec<QuestionDetail>,
    pub total: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemPicture {
    pub secure_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemAttribute {
    pub id: String,
    pub name: Option<String>,
    pub value_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub pictures: Vec<ItemPicture>,
    #[serde(default)]
    pub attributes: Vec<ItemAttribute>,
}

impl ItemDetail {
    pub fn first_picture_url(&self) -> Option<&str> {
        self.pictures
            .first()
            .and_then(|p| p.secure_url.as_deref().or(p.url.as_deref()))
    }

    /// One "Name: value" line per attribute that carries a value, for LLM
    /// context. `None` when the listing has no usable attributes.
    pub fn attributes_text(&self) -> Option<String> {
        let lines: Vec<String> = self
            .attributes
            .iter()
            .filter_map(|a| {
                let value = a.value_name.as_deref()?.trim();
                if value.is_empty() {
                    return None;
                }
                Some(format!("{}: {}", a.name.as_deref().unwrap_or(&a.id), value))
            })
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Result of a refresh-token exchange. `refresh_token` is absent when the
/// provider chose not to rotate it; `expires_in` is in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn question(&self, question_id: i64, access_token: &str)
        -> Result<QuestionDetail, Error>;

    async fn unanswered_questions(
        &self,
        seller_id: i64,
        from: DateTime<Utc>,
        limit: i64,
        offset: i64,
        access_token: &str,
    ) -> Result<QuestionSearchPage, Error>;

    async fn item(&self, item_id: &str, access_token: &str) -> Result<ItemDetail, Error>;

    /// Plain-text item description; `None` when the item has none.
    async fn item_description(
        &self,
        item_id: &str,
        access_token: &str,
    ) -> Result<Option<String>, Error>;

    async fn seller_nickname(
        &self,
        seller_id: i64,
        access_token: &str,
    ) -> Result<Option<String>, Error>;

    async fn post_answer(
        &self,
        question_id: i64,
        text: &str,
        access_token: &str,
    ) -> Result<(), Error>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, Error>;
}

#[derive(Clone)]
pub struct MercadoClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    app_id: String,
    app_secret: String,
}

impl MercadoClient {
    pub fn new(
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        })
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Err(Error::Auth(format!("{what}: HTTP {status}: {body}")))
        } else {
            Err(Error::Marketplace(format!("{what}: HTTP {status}: {body}")))
        }
    }
}

#[async_trait]
impl MarketplaceApi for MercadoClient {
    async fn question(
        &self,
        question_id: i64,
        access_token: &str,
    ) -> Result<QuestionDetail, Error> {
        let url = format!("{}/questions/{}", self.base_url, question_id);
        let resp = self.http.get(&url).bearer_auth(access_token).send().await?;
        let resp = Self::check(resp, "fetch question").await?;
        Ok(resp.json::<QuestionDetail>().await?)
    }

    async fn unanswered_questions(
        &self,
        seller_id: i64,
        from: DateTime<Utc>,
        limit: i64,
        offset: i64,
        access_token: &str,
    ) -> Result<QuestionSearchPage, Error> {
        let url = format!("{}/questions/search", self.base_url);
        debug!(seller_id, limit, offset, "searching unanswered questions");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("seller_id", seller_id.to_string()),
                ("status", "UNANSWERED".to_string()),
                ("sort_fields", "date_created".to_string()),
                ("sort_types", "ASC".to_string()),
                ("date_created_from", from.to_rfc3339()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("api_version", "4".to_string()),
            ])
            .send()
            .await?;
        let resp = Self::check(resp, "search questions").await?;
        Ok(resp.json::<QuestionSearchPage>().await?)
    }

    async fn item(&self, item_id: &str, access_token: &str) -> Result<ItemDetail, Error> {
        let url = format!("{}/items/{}", self.base_url, item_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("include_attributes", "all")])
            .send()
            .await?;
        let resp = Self::check(resp, "fetch item").await?;
        Ok(resp.json::<ItemDetail>().await?)
    }

    async fn item_description(
        &self,
        item_id: &str,
        access_token: &str,
    ) -> Result<Option<String>, Error> {
        #[derive(Deserialize)]
        struct Description {
            plain_text: Option<String>,
        }

        let url = format!("{}/items/{}/description", self.base_url, item_id);
        let resp = self.http.get(&url).bearer_auth(access_token).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check(resp, "fetch item description").await?;
        let desc = resp.json::<Description>().await?;
        Ok(desc.plain_text.filter(|t| !t.trim().is_empty()))
    }

    async fn seller_nickname(
        &self,
        seller_id: i64,
        access_token: &str,
    ) -> Result<Option<String>, Error> {
        #[derive(Deserialize)]
        struct User {
            nickname: Option<String>,
        }

        let url = format!("{}/users/{}", self.base_url, seller_id);
        let resp = self.http.get(&url).bearer_auth(access_token).send().await?;
        let resp = Self::check(resp, "fetch seller").await?;
        let user = resp.json::<User>().await?;
        Ok(user.nickname)
    }

    async fn post_answer(
        &self,
        question_id: i64,
        text: &str,
        access_token: &str,
    ) -> Result<(), Error> {
        let url = format!("{}/answers", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({
                "question_id": question_id,
                "text": text,
            }))
            .send()
            .await?;

        // Only 200/201 counts as published; anything else must not flip the
        // question into an answered state.
        let status = resp.status();
        if status == reqwest::StatusCode::OK || status == reqwest::StatusCode::CREATED {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Err(Error::Auth(format!("post answer: HTTP {status}: {body}")))
        } else {
            Err(Error::Marketplace(format!(
                "post answer: HTTP {status}: {body}"
            )))
        }
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, Error> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token refresh rejected: HTTP {status}: {body}"
            )));
        }
        Ok(resp.json::<TokenGrant>().await?)
    }
}
