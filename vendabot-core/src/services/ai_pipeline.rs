// vendabot-core/src/services/ai_pipeline.rs
//
// Two-stage answer generation. Stage 1 (Analyst) decides from internal item
// context whether it can answer; anything short of a clean verdict escalates
// to Stage 2 (Researcher), which runs with search grounding. The pipeline
// never lets an error escape its boundary: every failure ends as a status
// written to the question log.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};
use vendabot_ai::{GenerateRequest, LlmGateway};

use crate::auth::TokenManager;
use crate::models::{QuestionPatch, QuestionStatus, Tenant};
use crate::platforms::marketplace::MarketplaceApi;
use crate::platforms::whatsapp::Messenger;
use crate::repositories::{QuestionLogRepository, TenantConnectionRepository};
use crate::services::intent::strip_code_fences;
use crate::services::sanitize::space_long_digit_runs;
use crate::Error;

/// Published when the Researcher fails or returns nothing. The buyer always
/// gets an acknowledgment rather than silence.
pub const HOLDING_RESPONSE: &str = "Olá! Agradecemos o seu contato. Estamos \
verificando sua dúvida e responderemos o mais breve possível. Qualquer outra \
dúvida, estamos à disposição!";

#[derive(Debug, Deserialize)]
pub(crate) struct AnalystVerdict {
    pub answer: Option<String>,
    #[serde(default)]
    pub requires_external_search: bool,
}

/// Malformed analyst output fails toward the higher-quality grounded path,
/// never toward publishing a guess.
pub(crate) fn parse_analyst_verdict(raw: &str) -> AnalystVerdict {
    match serde_json::from_str::<AnalystVerdict>(strip_code_fences(raw)) {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(error = %e, "analyst returned undecodable output, escalating to researcher");
            AnalystVerdict {
                answer: None,
                requires_external_search: true,
            }
        }
    }
}

pub struct AiPipeline {
    questions: Arc<dyn QuestionLogRepository>,
    connections: Arc<dyn TenantConnectionRepository>,
    marketplace: Arc<dyn MarketplaceApi>,
    messenger: Arc<dyn Messenger>,
    tokens: Arc<TokenManager>,
    llm: Arc<dyn LlmGateway>,
}

impl AiPipeline {
    pub fn new(
        questions: Arc<dyn QuestionLogRepository>,
        connections: Arc<dyn TenantConnectionRepository>,
        marketplace: Arc<dyn MarketplaceApi>,
        messenger: Arc<dyn Messenger>,
        tokens: Arc<TokenManager>,
        llm: Arc<dyn LlmGateway>,
    ) -> Self {
        Self {
            questions,
            connections,
            marketplace,
            messenger,
            tokens,
            llm,
        }
    }

    /// Resolves one question with AI. Returns true when the question ended in
    /// a resolved state (answered by us, or found already answered on the
    /// marketplace). Never propagates an error.
    pub async fn resolve_with_ai(&self, question_id: i64) -> bool {
        match self.run(question_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(question_id, error = %e, "AI pipeline failed");
                self.mark_error(question_id, &e.to_string()).await;
                false
            }
        }
    }

    async fn run(&self, question_id: i64) -> Result<bool, Error> {
        let record = self
            .questions
            .get(question_id)
            .await?
            .ok_or_else(|| Error::Validation(format!("question {question_id} not in log")))?;
        let question_text = record
            .question_text
            .clone()
            .ok_or_else(|| Error::Validation(format!("question {question_id} has no text")))?;

        let (conn, tenant) = self
            .connections
            .active_for_seller(record.seller_id)
            .await?
            .ok_or_else(|| {
                Error::Auth(format!("no active connection for seller {}", record.seller_id))
            })?;
        let token = self.tokens.valid_access_token(&conn).await?;

        // A human may have answered directly on the marketplace since we were
        // triggered.
        let detail = self.marketplace.question(question_id, &token).await?;
        if !detail.is_unanswered() {
            info!(question_id, status = %detail.status, "question already closed on marketplace");
            self.questions
                .upsert(
                    &QuestionPatch::new(
                        question_id,
                        record.seller_id,
                        QuestionStatus::HumanAnsweredOnMarketplace,
                    ),
                )
                .await?;
            return Ok(true);
        }

        self.questions
            .upsert(&QuestionPatch::new(
                question_id,
                record.seller_id,
                QuestionStatus::AiProcessing,
            ))
            .await?;

        let item_id = record.item_id.clone().or(detail.item_id.clone());
        let context = self.item_context(item_id.as_deref(), &token).await;

        let answer = self.generate_answer(&question_text, &context).await;
        let answer = space_long_digit_runs(&answer);

        match self.marketplace.post_answer(question_id, &answer, &token).await {
            Ok(()) => {
                info!(question_id, "AI answer published");
                let mut patch =
                    QuestionPatch::new(question_id, record.seller_id, QuestionStatus::AiAnswered);
                patch.ai_answered_at = Some(chrono::Utc::now());
                patch.ai_response_text = Some(answer.clone());
                self.questions.upsert(&patch).await?;
                self.notify_tenant(
                    &tenant,
                    &format!(
                        "🤖 Pergunta respondida pela IA (Ref: Q#{question_id})\n\n\
                         *Pergunta:* {question_text}\n\n*Resposta publicada:* {answer}"
                    ),
                )
                .await;
                Ok(true)
            }
            Err(e) => {
                warn!(question_id, error = %e, "answer post rejected");
                let mut patch =
                    QuestionPatch::new(question_id, record.seller_id, QuestionStatus::AiFailed)
                        .with_error(e.to_string());
                // Keep the generated text for audit even though it never
                // reached the marketplace.
                patch.ai_response_text = Some(answer);
                self.questions.upsert(&patch).await?;
                self.notify_tenant(
                    &tenant,
                    &format!(
                        "⚠️ A IA gerou uma resposta para a pergunta Q#{question_id}, mas a \
                         publicação no marketplace falhou. Por favor, responda diretamente \
                         pelo site do marketplace."
                    ),
                )
                .await;
                Ok(false)
            }
        }
    }

    /// Item title, attributes and description are context enrichment, not
    /// preconditions; fetch failures degrade to an answer without them.
    async fn item_context(&self, item_id: Option<&str>, token: &str) -> ItemContext {
        let Some(item_id) = item_id else {
            return ItemContext::default();
        };

        let (title, attributes) = match self.marketplace.item(item_id, token).await {
            Ok(item) => {
                let attributes = item.attributes_text();
                (Some(item.title), attributes)
            }
            Err(e) => {
                warn!(item_id, error = %e, "item fetch failed, answering without it");
                (None, None)
            }
        };
        let description = match self.marketplace.item_description(item_id, token).await {
            Ok(desc) => desc,
            Err(e) => {
                warn!(item_id, error = %e, "description fetch failed, answering without it");
                None
            }
        };
        ItemContext {
            title,
            description,
            attributes,
        }
    }

    async fn generate_answer(&self, question_text: &str, context: &ItemContext) -> String {
        let analyst_request = GenerateRequest::new(analyst_prompt(question_text, context))
            .temperature(0.0)
            .max_output_tokens(300)
            .json_mode();

        let verdict = match self.llm.generate(&analyst_request).await {
            Ok(raw) => parse_analyst_verdict(&raw),
            Err(e) => {
                warn!(error = %e, "analyst call failed, escalating to researcher");
                AnalystVerdict {
                    answer: None,
                    requires_external_search: true,
                }
            }
        };

        if !verdict.requires_external_search {
            if let Some(answer) = verdict.answer.as_deref().map(str::trim) {
                if !answer.is_empty() {
                    return answer.to_string();
                }
            }
        }

        let researcher_request = GenerateRequest::new(researcher_prompt(question_text, context))
            .temperature(0.6)
            .grounded();

        match self.llm.generate(&researcher_request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("researcher returned empty text, using holding response");
                HOLDING_RESPONSE.to_string()
            }
            Err(e) => {
                warn!(error = %e, "researcher call failed, using holding response");
                HOLDING_RESPONSE.to_string()
            }
        }
    }

    async fn mark_error(&self, question_id: i64, message: &str) {
        let record = match self.questions.get(question_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!(question_id, error = %e, "could not load question to record failure");
                return;
            }
        };
        let patch = QuestionPatch::new(question_id, record.seller_id, QuestionStatus::Error)
            .with_error(message);
        if let Err(e) = self.questions.upsert(&patch).await {
            error!(question_id, error = %e, "could not record pipeline failure");
        }
    }

    async fn notify_tenant(&self, tenant: &Tenant, text: &str) {
        let Some(jid) = tenant.whatsapp_jid.as_deref() else {
            return;
        };
        if let Err(e) = self.messenger.send_text(jid, text).await {
            warn!(tenant_id = %tenant.tenant_id, error = %e, "tenant notification failed");
        }
    }
}

/// Listing context fed to both generation stages.
#[derive(Debug, Default)]
struct ItemContext {
    title: Option<String>,
    description: Option<String>,
    attributes: Option<String>,
}

impl ItemContext {
    fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("(sem título)")
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("(sem descrição)")
    }

    fn attributes(&self) -> &str {
        self.attributes.as_deref().unwrap_or("(sem atributos)")
    }
}

fn analyst_prompt(question_text: &str, context: &ItemContext) -> String {
    format!(
        "Você é um analista de atendimento de um vendedor em um marketplace \
         brasileiro.\n\
         Anúncio: \"{}\"\n\
         Atributos do anúncio:\n{}\n\
         Descrição do anúncio: \"{}\"\n\
         Pergunta do comprador: \"{question_text}\"\n\n\
         Se o anúncio, os atributos e a descrição acima bastam para responder \
         com certeza, escreva a resposta. Se a pergunta exige conhecimento \
         externo (compatibilidade de peças, especificações técnicas não \
         listadas, normas), NÃO invente: marque que é necessária pesquisa \
         externa.\n\n\
         Responda SOMENTE com JSON no formato:\n\
         {{\"answer\": \"resposta ou null\", \"requires_external_search\": true|false}}",
        context.title(),
        context.attributes(),
        context.description(),
    )
}

fn researcher_prompt(question_text: &str, context: &ItemContext) -> String {
    format!(
        "Você é um atendente experiente de um vendedor em um marketplace \
         brasileiro, respondendo em português do Brasil, de forma curta e \
         cordial.\n\
         Anúncio: \"{}\"\n\
         Atributos do anúncio:\n{}\n\
         Descrição do anúncio: \"{}\"\n\
         Pergunta do comprador: \"{question_text}\"\n\n\
         Regras:\n\
         - Use a pesquisa na web para verificar fatos (compatibilidade, \
         especificações) antes de afirmar.\n\
         - NUNCA invente especificações ou compatibilidades.\n\
         - Se não tiver certeza, reconheça o que sabe parcialmente ou faça \
         uma pergunta de esclarecimento ao comprador.\n\
         - Não inclua links nem dados de contato.\n\
         - Responda apenas com o texto final a ser publicado.",
        context.title(),
        context.attributes(),
        context.description(),
    )
}
