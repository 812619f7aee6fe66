// vendabot-core/src/services/intent.rs
//
// Classifies an inbound human reply. Anything the classifier cannot make
// sense of, including its own transport failures, degrades to InvalidFormat;
// a reply is never silently dropped and never guessed into an answer.

use std::sync::Arc;
use tracing::warn;
use vendabot_ai::{GenerateRequest, LlmGateway};

/// Fixed reply that forces AI resolution instead of a manual answer.
pub const AI_SENTINEL: &str = "2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyIntent {
    ManualAnswer(String),
    TriggerAi,
    InvalidFormat,
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmGateway>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, reply_text: &str, question_text: &str) -> ReplyIntent {
        let trimmed = reply_text.trim();
        if trimmed.is_empty() {
            return ReplyIntent::InvalidFormat;
        }
        if trimmed == AI_SENTINEL {
            return ReplyIntent::TriggerAi;
        }

        let request = GenerateRequest::new(classification_prompt(trimmed, question_text))
            .temperature(0.0)
            .max_output_tokens(300)
            .json_mode();

        match self.llm.generate(&request).await {
            Ok(raw) => parse_intent(&raw),
            Err(e) => {
                warn!(error = %e, "intent classification call failed, treating as invalid");
                ReplyIntent::InvalidFormat
            }
        }
    }
}

fn classification_prompt(reply_text: &str, question_text: &str) -> String {
    format!(
        "Você é um classificador de mensagens de um vendedor respondendo a uma \
         pergunta de comprador em um marketplace.\n\
         Pergunta original do comprador: \"{question_text}\"\n\
         Resposta do vendedor: \"{reply_text}\"\n\n\
         Classifique a resposta do vendedor em exatamente uma das intenções:\n\
         - \"MANUAL_ANSWER\": o vendedor escreveu a resposta que deve ser \
         publicada ao comprador. Limpe saudações e comentários dirigidos ao \
         robô, mantendo apenas o texto a publicar.\n\
         - \"TRIGGER_AI\": o vendedor pediu que a IA responda (por exemplo \
         enviando \"2\" ou pedindo explicitamente).\n\
         - \"INVALID_FORMAT\": a mensagem não é uma resposta utilizável.\n\n\
         Responda SOMENTE com JSON no formato:\n\
         {{\"intent\": \"MANUAL_ANSWER|TRIGGER_AI|INVALID_FORMAT\", \
         \"cleaned_text\": \"texto a publicar ou vazio\"}}"
    )
}

/// Models frequently wrap JSON in a fenced code block; strip it before
/// parsing.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

pub(crate) fn parse_intent(raw: &str) -> ReplyIntent {
    let cleaned = strip_code_fences(raw);
    let value: serde_json::Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "intent classifier returned non-JSON output");
            return ReplyIntent::InvalidFormat;
        }
    };

    match value.get("intent").and_then(|v| v.as_str()) {
        Some("TRIGGER_AI") => ReplyIntent::TriggerAi,
        Some("MANUAL_ANSWER") => {
            let text = value
                .get("cleaned_text")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .unwrap_or("");
            if text.is_empty() {
                // An answer with nothing to publish is not an answer.
                ReplyIntent::InvalidFormat
            } else {
                ReplyIntent::ManualAnswer(text.to_string())
            }
        }
        _ => ReplyIntent::InvalidFormat,
    }
}
