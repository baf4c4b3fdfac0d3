use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{CompletionModel, CompletionParams, ModelError};

// Provider enum to identify the wire format spoken by the endpoint
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// OpenAI-compatible `/chat/completions`
    OpenAi,
    /// Hugging Face Inference API, `/models/<model>`
    HuggingFace,
}

impl ModelProvider {
    pub fn as_str(&self) -> &str {
        match self {
            ModelProvider::OpenAi => "openai",
            ModelProvider::HuggingFace => "huggingface",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ModelProvider::OpenAi),
            "huggingface" => Some(ModelProvider::HuggingFace),
            // Fallback for case-insensitive matching
            s if s.eq_ignore_ascii_case("openai") => Some(ModelProvider::OpenAi),
            s if s.eq_ignore_ascii_case("huggingface") || s.eq_ignore_ascii_case("hf") => {
                Some(ModelProvider::HuggingFace)
            }
            _ => None,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "https://api.openai.com/v1",
            ModelProvider::HuggingFace => "https://api-inference.huggingface.co",
        }
    }
}

/// Completion client for one hosted model
pub struct HttpCompletionClient {
    client: reqwest::Client,
    provider: ModelProvider,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(
        provider: ModelProvider,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_url(&self) -> String {
        request_url(self.provider, &self.endpoint, &self.model)
    }
}

#[async_trait]
impl CompletionModel for HttpCompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        params: CompletionParams,
    ) -> Result<String, ModelError> {
        let url = self.request_url();
        let body = request_body(self.provider, &self.model, prompt, params);

        tracing::debug!(
            "Sending {} completion request to {} ({} prompt chars)",
            self.provider.as_str(),
            url,
            prompt.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let response_text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            tracing::warn!("Model API error - Status: {}, URL: {}", status, url);
            return Err(ModelError::Api {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let json: Value = serde_json::from_str(&response_text)
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse JSON: {}", e)))?;

        extract_completion(self.provider, &json)
    }
}

fn map_transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout
    } else {
        ModelError::Transport(e.to_string())
    }
}

fn request_url(provider: ModelProvider, endpoint: &str, model: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    match provider {
        ModelProvider::OpenAi => format!("{}/chat/completions", endpoint),
        ModelProvider::HuggingFace => format!("{}/models/{}", endpoint, model),
    }
}

fn request_body(
    provider: ModelProvider,
    model: &str,
    prompt: &str,
    params: CompletionParams,
) -> Value {
    match provider {
        ModelProvider::OpenAi => json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": false
        }),
        ModelProvider::HuggingFace => json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": params.max_tokens,
                "temperature": params.temperature,
                "return_full_text": false
            }
        }),
    }
}

/// Pull the generated text out of a provider response.
fn extract_completion(provider: ModelProvider, json: &Value) -> Result<String, ModelError> {
    // Both APIs can answer 200 with an error object (e.g. model loading)
    if let Some(error) = json.get("error") {
        let body = error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .unwrap_or("unknown error")
            .to_string();
        return Err(ModelError::Api { status: 200, body });
    }

    let text = match provider {
        ModelProvider::OpenAi => json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str()),
        ModelProvider::HuggingFace => match json {
            Value::Array(items) => items
                .first()
                .and_then(|item| item.get("generated_text"))
                .and_then(|t| t.as_str()),
            _ => json.get("generated_text").and_then(|t| t.as_str()),
        },
    };

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        Some(_) => Err(ModelError::EmptyCompletion),
        None => Err(ModelError::InvalidResponse(
            "No content found in response".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!(ModelProvider::from_str("openai"), Some(ModelProvider::OpenAi));
        assert_eq!(
            ModelProvider::from_str("HuggingFace"),
            Some(ModelProvider::HuggingFace)
        );
        assert_eq!(ModelProvider::from_str("gemini"), None);
        assert_eq!(ModelProvider::HuggingFace.as_str(), "huggingface");
    }

    #[test]
    fn test_request_urls() {
        assert_eq!(
            request_url(ModelProvider::OpenAi, "https://api.openai.com/v1/", "gpt-4o"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            request_url(
                ModelProvider::HuggingFace,
                "https://api-inference.huggingface.co",
                "defog/sqlcoder-7b-2"
            ),
            "https://api-inference.huggingface.co/models/defog/sqlcoder-7b-2"
        );
    }

    #[test]
    fn test_request_bodies() {
        let openai = request_body(ModelProvider::OpenAi, "gpt-4o", "hi", CompletionParams::SQL);
        assert_eq!(openai["messages"][0]["content"], "hi");
        assert_eq!(openai["max_tokens"], 256);
        assert_eq!(openai["stream"], false);

        let hf = request_body(
            ModelProvider::HuggingFace,
            "google/flan-t5-large",
            "hi",
            CompletionParams::INSIGHT,
        );
        assert_eq!(hf["inputs"], "hi");
        assert_eq!(hf["parameters"]["max_new_tokens"], 150);
        assert!(hf.get("model").is_none());
    }

    #[test]
    fn test_extract_openai_completion() {
        let json = json!({ "choices": [{ "message": { "content": "SELECT 1" } }] });
        assert_eq!(
            extract_completion(ModelProvider::OpenAi, &json).unwrap(),
            "SELECT 1"
        );
    }

    #[test]
    fn test_extract_huggingface_completion() {
        let array = json!([{ "generated_text": "SELECT 2" }]);
        let object = json!({ "generated_text": "SELECT 3" });

        assert_eq!(
            extract_completion(ModelProvider::HuggingFace, &array).unwrap(),
            "SELECT 2"
        );
        assert_eq!(
            extract_completion(ModelProvider::HuggingFace, &object).unwrap(),
            "SELECT 3"
        );
    }

    #[test]
    fn test_extract_errors() {
        let loading = json!({ "error": "Model is currently loading" });
        match extract_completion(ModelProvider::HuggingFace, &loading) {
            Err(ModelError::Api { body, .. }) => assert!(body.contains("loading")),
            other => panic!("unexpected: {:?}", other),
        }

        let blank = json!([{ "generated_text": "   " }]);
        assert!(matches!(
            extract_completion(ModelProvider::HuggingFace, &blank),
            Err(ModelError::EmptyCompletion)
        ));

        let unrelated = json!({ "foo": 1 });
        assert!(matches!(
            extract_completion(ModelProvider::OpenAi, &unrelated),
            Err(ModelError::InvalidResponse(_))
        ));
    }
}
