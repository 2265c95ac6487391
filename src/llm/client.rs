use crate::error::{BalanceAnalysisError, Result};
use crate::llm::types::*;
use crate::synthesis::{GenerationRequest, TextGenerator};
use futures::future::BoxFuture;
use log::debug;
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// [`TextGenerator`] backed by the Gemini `generateContent` endpoint, with
/// JSON output constrained to the request's schema.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) async fn generate_content(
        &self,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<serde_json::Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::user_text(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
            },
        };

        debug!("POST generateContent ({})", self.model);
        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(BalanceAnalysisError::ExternalGeneratorFailure(format!(
                "Gemini API error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;

        let part = body
            .candidates
            .ok_or_else(|| BalanceAnalysisError::ExternalGeneratorFailure("No candidates returned".to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| BalanceAnalysisError::ExternalGeneratorFailure("Empty candidates list".to_string()))?
            .content
            .parts
            .into_iter()
            .next()
            .ok_or_else(|| BalanceAnalysisError::ExternalGeneratorFailure("No parts in content".to_string()))?;

        match part {
            Part::Text { text } => Ok(text),
            Part::Other(_) => Err(BalanceAnalysisError::ExternalGeneratorFailure(
                "Model returned non-text content".to_string(),
            )),
        }
    }
}

impl TextGenerator for GeminiClient {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.generate_content(
                &request.system,
                vec![Content::user_text(request.user.clone())],
                Some(request.response_schema.clone()),
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_camel_case() {
        let payload = GenerateContentRequest {
            contents: vec![Content::user_text("facts")],
            system_instruction: Some(Content::user_text("system")),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: None,
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert!(json["generationConfig"].get("responseSchema").is_none());
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "system");
    }

    #[test]
    fn test_response_text_part() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"a\":1}"}]}}]}"#;
        let body: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let part = body.candidates.unwrap().remove(0).content.parts.remove(0);
        assert!(matches!(part, Part::Text { ref text } if text == "{\"a\":1}"));
    }

    #[test]
    fn test_builder() {
        let client = GeminiClient::new("key".to_string()).with_model("gemini-pro");
        assert_eq!(client.model(), "gemini-pro");
    }
}
