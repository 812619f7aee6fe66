// vendabot-ai/src/models.rs

use serde::Deserialize;

/// One text-generation call. `json_mode` asks the model for a JSON body;
/// `grounding` enables web search, which the provider treats as mutually
/// exclusive with a forced response MIME type.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub json_mode: bool,
    pub grounding: bool,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.0,
            max_output_tokens: None,
            json_mode: false,
            grounding: false,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    pub fn json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn grounded(mut self) -> Self {
        self.grounding = true;
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiPart {
    pub text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate, if the model produced any.
    pub fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_joins_candidate_parts() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Olá, "}, {"text": "tudo bem?"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("Olá, tudo bem?"));
    }

    #[test]
    fn empty_candidates_yield_none() {
        let resp: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(resp.first_text().is_none());

        let resp: GeminiResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(resp.first_text().is_none());
    }
}
