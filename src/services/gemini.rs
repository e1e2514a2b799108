use garde::Validate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini models this client accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, AsRefStr)]
pub enum GeminiModel {
    #[strum(serialize = "gemini-2.5-pro")]
    Gemini25Pro,
    #[default]
    #[strum(serialize = "gemini-2.5-flash")]
    Gemini25Flash,
    #[strum(serialize = "gemini-2.5-flash-lite")]
    Gemini25FlashLite,
    #[strum(serialize = "gemini-2.0-flash")]
    Gemini20Flash,
    #[strum(serialize = "gemini-2.0-flash-lite")]
    Gemini20FlashLite,
    #[strum(serialize = "gemini-1.5-pro")]
    Gemini15Pro,
    #[strum(serialize = "gemini-1.5-flash")]
    Gemini15Flash,
}

/// Generation parameters sent with every prompt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationSettings {
    #[garde(length(min = 1, max = 100))]
    pub model: String,

    #[garde(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    #[garde(length(min = 1, max = 100))]
    pub response_mime_type: String,

    #[garde(skip)]
    pub max_output_tokens: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: GeminiModel::default().to_string(),
            temperature: 0.5,
            response_mime_type: "application/json".to_string(),
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GeminiEnv {
    gemini_api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    response_mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: GeminiModel,
    settings: GenerationSettings,
}

impl GeminiClient {
    /// Create a client. Without an explicit key, `GEMINI_API_KEY` is used.
    pub fn new(api_key: Option<String>, settings: GenerationSettings) -> Result<Self, GeminiError> {
        let api_key = match api_key {
            Some(key) => key,
            None => {
                dotenvy::dotenv().ok();
                envy::from_env::<GeminiEnv>()
                    .map_err(|e| GeminiError::Config(e.to_string()))?
                    .gemini_api_key
                    .ok_or(GeminiError::MissingApiKey)?
            }
        };
        Self::with_api_key(api_key, settings)
    }

    pub fn with_api_key(api_key: String, settings: GenerationSettings) -> Result<Self, GeminiError> {
        if api_key.is_empty() {
            return Err(GeminiError::MissingApiKey);
        }
        settings.validate().map_err(|e| GeminiError::Config(e.to_string()))?;
        let model = settings
            .model
            .parse::<GeminiModel>()
            .map_err(|_| GeminiError::InvalidModel(settings.model.clone()))?;

        Ok(Self {
            http: Client::new(),
            api_key,
            model,
            settings,
        })
    }

    pub fn model(&self) -> GeminiModel {
        self.model
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Send a prompt and return the raw response document.
    pub async fn generate_content(&self, prompt: &str) -> Result<serde_json::Value, GeminiError> {
        let url = format!("{}/models/{}:generateContent", BASE_URL, self.model);

        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                response_mime_type: &self.settings.response_mime_type,
                max_output_tokens: self.settings.max_output_tokens,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(GeminiError::Http)?
            .error_for_status()
            .map_err(GeminiError::Http)?;

        response.json().await.map_err(GeminiError::Http)
    }

    /// Generate text for a prompt. Any failure is logged and yields `""`.
    pub async fn generate_output(&self, prompt: &str) -> String {
        match self.generate_content(prompt).await {
            Ok(response) => get_text(&response),
            Err(e) => {
                tracing::error!(model = %self.model, error = %e, "Error generating content");
                String::new()
            }
        }
    }
}

/// Text of the first candidate in a `generateContent` response.
///
/// Candidate content may be a plain string or a `parts` list; parts are
/// concatenated.
pub fn get_text(response: &serde_json::Value) -> String {
    let Some(candidate) = response
        .get("candidates")
        .and_then(serde_json::Value::as_array)
        .and_then(|candidates| candidates.first())
    else {
        tracing::warn!("No candidates found in the response");
        return String::new();
    };

    match candidate.get("content") {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(content) => content
            .get("parts")
            .and_then(serde_json::Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(serde_json::Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default(),
        None => {
            tracing::warn!("Candidate has no content");
            String::new()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("GEMINI_API_KEY is not set and no API key was given")]
    MissingApiKey,

    #[error("Invalid generation settings: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(settings: GenerationSettings) -> Result<GeminiClient, GeminiError> {
        GeminiClient::with_api_key("test-key".to_string(), settings)
    }

    #[test]
    fn test_defaults() {
        let client = client(GenerationSettings::default()).unwrap();
        assert_eq!(client.model(), GeminiModel::Gemini25Flash);
        assert_eq!(client.model().as_ref(), "gemini-2.5-flash");
        assert_eq!(client.settings().temperature, 0.5);
        assert_eq!(client.settings().response_mime_type, "application/json");
    }

    #[test]
    fn test_custom_settings() {
        let client = client(GenerationSettings {
            model: "gemini-2.0-flash-lite".into(),
            temperature: 0.8,
            response_mime_type: "application/xml".into(),
            max_output_tokens: Some(256),
        })
        .unwrap();
        assert_eq!(client.model(), GeminiModel::Gemini20FlashLite);
        assert_eq!(client.settings().temperature, 0.8);
        assert_eq!(client.settings().response_mime_type, "application/xml");
    }

    #[test]
    fn test_invalid_model_rejected() {
        let err = client(GenerationSettings {
            model: "invalid-model-name-123".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("Invalid model name: invalid-model-name-123"));
    }

    #[test]
    fn test_out_of_range_temperature_rejected() {
        let result = client(GenerationSettings {
            temperature: 3.5,
            ..Default::default()
        });
        assert!(matches!(result, Err(GeminiError::Config(_))));
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = GeminiClient::with_api_key(String::new(), GenerationSettings::default());
        assert!(matches!(result, Err(GeminiError::MissingApiKey)));
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: "Say hello" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                response_mime_type: "text/plain",
                max_output_tokens: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "contents": [{"role": "user", "parts": [{"text": "Say hello"}]}],
                "generationConfig": {"temperature": 0.5, "responseMimeType": "text/plain"}
            })
        );
    }

    #[test]
    fn test_get_text_plain_content() {
        let response = json!({"candidates": [{"content": "This is the generated text"}]});
        assert_eq!(get_text(&response), "This is the generated text");
    }

    #[test]
    fn test_get_text_parts_content() {
        let response = json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " World"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        });
        assert_eq!(get_text(&response), "Hello World");
    }

    #[test]
    fn test_get_text_no_candidates() {
        assert_eq!(get_text(&json!({"candidates": []})), "");
        assert_eq!(get_text(&json!({})), "");
    }
}
