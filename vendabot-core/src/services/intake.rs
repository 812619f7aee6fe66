// vendabot-core/src/services/intake.rs
//
// Both ingestion paths (webhook event, periodic reconciliation) converge on
// register_question, keyed by the marketplace question id. Reconciliation is
// the correctness backstop for undelivered webhooks.

use chrono::{Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::TokenManager;
use crate::models::{QuestionPatch, QuestionStatus, Tenant, TenantConnection};
use crate::platforms::marketplace::{MarketplaceApi, QuestionDetail};
use crate::platforms::whatsapp::Messenger;
use crate::repositories::{QuestionLogRepository, TenantConnectionRepository};
use crate::Error;

const LOOKBACK_DAYS: i64 = 7;
const PAGE_LIMIT: i64 = 50;
const MAX_PAGES: i64 = 5;

static QUESTION_RESOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/questions/(\d+)")
        .unwrap_or_else(|e| panic!("invalid question resource regex: {e}"))
});

/// Marketplace webhook body. `attempts` is informational only.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub topic: String,
    pub resource: String,
    pub user_id: i64,
    #[serde(default)]
    pub attempts: Option<i64>,
}

pub struct IntakeService {
    questions: Arc<dyn QuestionLogRepository>,
    connections: Arc<dyn TenantConnectionRepository>,
    marketplace: Arc<dyn MarketplaceApi>,
    messenger: Arc<dyn Messenger>,
    tokens: Arc<TokenManager>,
    timeout_minutes: i64,
}

impl IntakeService {
    pub fn new(
        questions: Arc<dyn QuestionLogRepository>,
        connections: Arc<dyn TenantConnectionRepository>,
        marketplace: Arc<dyn MarketplaceApi>,
        messenger: Arc<dyn Messenger>,
        tokens: Arc<TokenManager>,
        timeout_minutes: i64,
    ) -> Self {
        Self {
            questions,
            connections,
            marketplace,
            messenger,
            tokens,
            timeout_minutes,
        }
    }

    /// Event-driven intake. `Ok(())` covers both "registered" and
    /// "intentionally ignored"; only malformed input or infrastructure
    /// failures return an error.
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<(), Error> {
        if event.topic != "questions" {
            debug!(topic = %event.topic, "ignoring webhook topic");
            return Ok(());
        }

        let question_id = parse_question_id(&event.resource).ok_or_else(|| {
            Error::Validation(format!("unparseable question resource: {}", event.resource))
        })?;

        let Some((conn, tenant)) = self.connections.active_for_seller(event.user_id).await? else {
            debug!(seller_id = event.user_id, "no active connection for webhook seller");
            return Ok(());
        };

        if self.questions.get(question_id).await?.is_some() {
            debug!(question_id, "question already logged");
            return Ok(());
        }

        let token = match self.tokens.valid_access_token(&conn).await {
            Ok(token) => token,
            Err(Error::AuthExpired(id)) => {
                warn!(connection_id = %id, question_id, "skipping question, connection expired");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let detail = self.marketplace.question(question_id, &token).await?;
        if !detail.is_unanswered() {
            debug!(question_id, status = %detail.status, "question not open, ignoring");
            return Ok(());
        }

        self.register_question(&conn, &tenant, &detail, &token).await
    }

    /// Poll-driven intake for one tenant. Pages through unanswered questions
    /// inside the lookback window and registers every id missing from the
    /// log. Per-question failures are logged and skipped.
    pub async fn reconcile_tenant(
        &self,
        conn: &TenantConnection,
        tenant: &Tenant,
    ) -> Result<(), Error> {
        let token = self.tokens.valid_access_token(conn).await?;
        let from = Utc::now() - ChronoDuration::days(LOOKBACK_DAYS);

        for page in 0..MAX_PAGES {
            let offset = page * PAGE_LIMIT;
            let batch = match self
                .marketplace
                .unanswered_questions(conn.seller_id, from, PAGE_LIMIT, offset, &token)
                .await
            {
                Ok(batch) => batch,
                Err(Error::Auth(msg)) => {
                    warn!(connection_id = %conn.connection_id, %msg,
                          "question search rejected, deactivating connection");
                    self.connections.deactivate(conn.connection_id).await?;
                    return Err(Error::AuthExpired(conn.connection_id));
                }
                Err(e) => return Err(e),
            };

            let fetched = batch.questions.len() as i64;
            for detail in &batch.questions {
                if self.questions.get(detail.id).await?.is_some() {
                    continue;
                }
                if let Err(e) = self.register_question(conn, tenant, detail, &token).await {
                    warn!(question_id = detail.id, error = %e,
                          "registration failed, continuing with next question");
                }
                let secs = rand::rng().random_range(1..=2);
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }

            if fetched < PAGE_LIMIT || offset + fetched >= batch.total {
                break;
            }
        }
        Ok(())
    }

    /// Idempotent registration shared by both paths. The caller has already
    /// checked the log; a duplicate call is still safe because the upsert
    /// merge never nulls stored fields.
    pub async fn register_question(
        &self,
        conn: &TenantConnection,
        tenant: &Tenant,
        detail: &QuestionDetail,
        token: &str,
    ) -> Result<(), Error> {
        let question_text = detail.text.clone().unwrap_or_default();
        let mut patch = QuestionPatch::new(detail.id, conn.seller_id, QuestionStatus::PendingNotify);
        patch.tenant_id = Some(tenant.tenant_id);
        patch.item_id = detail.item_id.clone();
        patch.question_text = Some(question_text.clone());

        let Some(jid) = tenant.whatsapp_jid.as_deref() else {
            info!(question_id = detail.id, tenant_id = %tenant.tenant_id,
                  "tenant has no notification target, parking question");
            self.questions.upsert(&patch).await?;
            return Ok(());
        };

        let (item_title, image_url) = match detail.item_id.as_deref() {
            Some(item_id) => match self.marketplace.item(item_id, token).await {
                Ok(item) => {
                    let image = item.first_picture_url().map(str::to_string);
                    (Some(item.title), image)
                }
                Err(e) => {
                    warn!(item_id, error = %e, "item fetch failed, notifying without it");
                    (None, None)
                }
            },
            None => (None, None),
        };
        let nickname = match self.marketplace.seller_nickname(conn.seller_id, token).await {
            Ok(nickname) => nickname,
            Err(e) => {
                warn!(seller_id = conn.seller_id, error = %e, "nickname fetch failed");
                None
            }
        };

        let caption = notification_caption(
            nickname.as_deref(),
            item_title.as_deref(),
            &question_text,
            detail.id,
            detail.item_id.as_deref(),
            self.timeout_minutes,
        );

        let sent = match image_url.as_deref().filter(|u| url::Url::parse(u).is_ok()) {
            Some(image) => self.messenger.send_image(jid, image, &caption).await,
            None => self.messenger.send_text(jid, &caption).await,
        };

        match sent {
            Ok(message_id) => {
                info!(question_id = detail.id, %message_id, "question registered and notified");
                patch.status = QuestionStatus::AwaitingReply;
                patch.notified_at = Some(Utc::now());
                patch.notification_message_id = Some(message_id);
                self.questions.upsert(&patch).await?;
            }
            Err(e) => {
                warn!(question_id = detail.id, error = %e, "notification failed, parking question");
                patch = patch.with_error(e.to_string());
                self.questions.upsert(&patch).await?;
            }
        }
        Ok(())
    }
}

fn parse_question_id(resource: &str) -> Option<i64> {
    QUESTION_RESOURCE
        .captures(resource)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Body of the WhatsApp notification. Instructions and the reference footer
/// are load-bearing: the footer correlates human eyes, the quoted message id
/// correlates the machine.
pub fn notification_caption(
    nickname: Option<&str>,
    item_title: Option<&str>,
    question_text: &str,
    question_id: i64,
    item_id: Option<&str>,
    timeout_minutes: i64,
) -> String {
    let mut caption = String::new();
    if let Some(nickname) = nickname {
        caption.push_str(&format!("*Conta: {nickname}*\n\n"));
    }
    caption.push_str("📩 *Nova pergunta no anúncio:*\n");
    caption.push_str(&format!("_{}_\n\n", item_title.unwrap_or("(anúncio sem título)")));
    caption.push_str(&format!("❓ *Pergunta:* {question_text}\n\n"));
    caption.push_str("Responda esta mensagem com:\n");
    caption.push_str("1️⃣ O texto da resposta, para publicar manualmente;\n");
    caption.push_str("2️⃣ Apenas *2*, para a IA responder agora.\n\n");
    caption.push_str(&format!(
        "⏰ Sem resposta em {timeout_minutes} minutos, a IA responde automaticamente.\n"
    ));
    caption.push_str(&format!(
        "(Ref: Q#{question_id} | Item: {})",
        item_id.unwrap_or("-")
    ));
    caption
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_parsed_from_resource_path() {
        assert_eq!(parse_question_id("/questions/11223344"), Some(11223344));
        assert_eq!(parse_question_id("https://api.site.com/questions/5?x=1"), Some(5));
        assert_eq!(parse_question_id("/items/MLB123"), None);
    }

    #[test]
    fn caption_carries_reference_and_instructions() {
        let caption = notification_caption(
            Some("AUTOPECAS_SILVA"),
            Some("Farol Dianteiro Gol G5"),
            "Serve no G6?",
            998877,
            Some("MLB42"),
            30,
        );
        assert!(caption.contains("AUTOPECAS_SILVA"));
        assert!(caption.contains("Farol Dianteiro Gol G5"));
        assert!(caption.contains("Serve no G6?"));
        assert!(caption.contains("(Ref: Q#998877 | Item: MLB42)"));
        assert!(caption.contains("30 minutos"));
    }
}
