// vendabot-core/src/services/reply.rs
//
// Inbound WhatsApp replies. A reply is correlated to a question through the
// quoted message id of our own notification; all feedback goes to the
// tenant's registered JID, which owns the channel, not to whoever replied.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::TokenManager;
use crate::models::{QuestionPatch, QuestionStatus, Tenant};
use crate::platforms::marketplace::MarketplaceApi;
use crate::platforms::whatsapp::Messenger;
use crate::repositories::{QuestionLogRepository, TenantConnectionRepository};
use crate::services::ai_pipeline::AiPipeline;
use crate::services::intent::{IntentClassifier, ReplyIntent};
use crate::Error;

/// One inbound message from the messaging gateway, reduced to what the
/// orchestrator needs.
#[derive(Debug, Clone)]
pub struct InboundReply {
    pub sender: String,
    pub text: String,
    pub quoted_message_id: Option<String>,
    pub from_me: bool,
}

impl InboundReply {
    /// Extracts a reply from an Evolution-shaped `messages.upsert` payload.
    /// Returns `None` when the payload carries no usable message.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let data = payload.get("data")?;
        let key = data.get("key")?;
        let sender = key.get("remoteJid")?.as_str()?.to_string();
        let from_me = key
            .get("fromMe")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let message = data.get("message")?;
        let text = message
            .get("conversation")
            .and_then(|v| v.as_str())
            .or_else(|| {
                message
                    .pointer("/extendedTextMessage/text")
                    .and_then(|v| v.as_str())
            })?
            .to_string();

        // Quoted-id placement differs between gateway versions.
        let quoted_message_id = message
            .pointer("/extendedTextMessage/contextInfo/stanzaId")
            .or_else(|| data.pointer("/contextInfo/stanzaId"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Some(Self {
            sender,
            text,
            quoted_message_id,
            from_me,
        })
    }
}

pub struct ReplyService {
    questions: Arc<dyn QuestionLogRepository>,
    connections: Arc<dyn TenantConnectionRepository>,
    marketplace: Arc<dyn MarketplaceApi>,
    messenger: Arc<dyn Messenger>,
    tokens: Arc<TokenManager>,
    classifier: IntentClassifier,
    pipeline: Arc<AiPipeline>,
}

impl ReplyService {
    pub fn new(
        questions: Arc<dyn QuestionLogRepository>,
        connections: Arc<dyn TenantConnectionRepository>,
        marketplace: Arc<dyn MarketplaceApi>,
        messenger: Arc<dyn Messenger>,
        tokens: Arc<TokenManager>,
        classifier: IntentClassifier,
        pipeline: Arc<AiPipeline>,
    ) -> Self {
        Self {
            questions,
            connections,
            marketplace,
            messenger,
            tokens,
            classifier,
            pipeline,
        }
    }

    /// Processes one inbound reply. `Ok(())` covers "acted on" and
    /// "intentionally ignored" alike.
    pub async fn handle_reply(&self, reply: &InboundReply) -> Result<(), Error> {
        if reply.from_me {
            return Ok(());
        }
        let Some(quoted_id) = reply.quoted_message_id.as_deref() else {
            debug!(sender = %reply.sender, "message is not a reply, ignoring");
            return Ok(());
        };
        let Some(record) = self.questions.get_by_notification_id(quoted_id).await? else {
            debug!(quoted_id, "no question correlated to quoted message");
            return Ok(());
        };

        let Some((conn, tenant)) = self.connections.active_for_seller(record.seller_id).await?
        else {
            warn!(question_id = record.question_id, "reply for seller with no active connection");
            return Ok(());
        };

        if record.status != QuestionStatus::AwaitingReply {
            info!(question_id = record.question_id, status = %record.status,
                  "reply arrived after question left AWAITING_REPLY");
            self.send_feedback(
                &tenant,
                &format!(
                    "ℹ️ A pergunta Q#{} já foi tratada (status atual: {}). \
                     Nenhuma ação foi tomada.",
                    record.question_id, record.status
                ),
            )
            .await;
            return Ok(());
        }

        let question_text = record.question_text.clone().unwrap_or_default();
        match self.classifier.classify(&reply.text, &question_text).await {
            ReplyIntent::TriggerAi => {
                info!(question_id = record.question_id, "human requested AI resolution");
                self.pipeline.resolve_with_ai(record.question_id).await;
                Ok(())
            }
            ReplyIntent::ManualAnswer(answer) => {
                self.post_manual_answer(&conn, &tenant, record.question_id, &answer)
                    .await
            }
            ReplyIntent::InvalidFormat => {
                self.send_feedback(
                    &tenant,
                    &format!(
                        "🤔 Não entendi a resposta para a pergunta Q#{}. Responda a \
                         mensagem original com o texto a publicar, ou apenas *2* para \
                         a IA responder.",
                        record.question_id
                    ),
                )
                .await;
                Ok(())
            }
        }
    }

    async fn post_manual_answer(
        &self,
        conn: &crate::models::TenantConnection,
        tenant: &Tenant,
        question_id: i64,
        answer: &str,
    ) -> Result<(), Error> {
        let token = match self.tokens.valid_access_token(conn).await {
            Ok(token) => token,
            Err(e) => {
                warn!(question_id, error = %e, "no valid token for manual answer");
                self.send_feedback(
                    tenant,
                    &format!(
                        "⚠️ Não foi possível publicar a resposta da pergunta Q#{question_id}: \
                         a conexão com o marketplace expirou. Reconecte a conta."
                    ),
                )
                .await;
                return Ok(());
            }
        };

        match self.marketplace.post_answer(question_id, answer, &token).await {
            Ok(()) => {
                info!(question_id, "manual answer published");
                let mut patch = QuestionPatch::new(
                    question_id,
                    conn.seller_id,
                    QuestionStatus::HumanAnsweredViaChannel,
                );
                patch.human_answered_at = Some(chrono::Utc::now());
                self.questions.upsert(&patch).await?;
                self.send_feedback(
                    tenant,
                    &format!("✅ Resposta da pergunta Q#{question_id} publicada com sucesso."),
                )
                .await;
            }
            Err(e) => {
                warn!(question_id, error = %e, "manual answer post rejected");
                let patch = QuestionPatch::new(question_id, conn.seller_id, QuestionStatus::Error)
                    .with_error(e.to_string());
                self.questions.upsert(&patch).await?;
                self.send_feedback(
                    tenant,
                    &format!(
                        "⚠️ Falha ao publicar a resposta da pergunta Q#{question_id}. \
                         Por favor, responda diretamente pelo site do marketplace."
                    ),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn send_feedback(&self, tenant: &Tenant, text: &str) {
        let Some(jid) = tenant.whatsapp_jid.as_deref() else {
            return;
        };
        if let Err(e) = self.messenger.send_text(jid, text).await {
            warn!(tenant_id = %tenant.tenant_id, error = %e, "feedback message failed");
        }
    }
}
