use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::prompt::PromptBuilder;
use super::vision_service::VisionService;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::AnalysisRequest;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    // OpenRouter can report upstream failures inside a 200 body
    error: Option<ProviderErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
}

/// OpenAI-compatible chat completions client (OpenRouter or a relay in
/// front of it).
pub struct OpenRouterService {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenRouterService {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, request: &AnalysisRequest) -> ChatRequest {
        let image = request.image();
        let base64_image = general_purpose::STANDARD.encode(image.bytes());
        let data_url = format!("data:{};base64,{}", image.mime_type(), base64_image);

        log::debug!("📊 Image size: {} bytes ({})", image.len(), image.mime_type());
        log::debug!("🔄 Base64 encoded size: {} bytes", base64_image.len());

        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text {
                    content_type: "text".to_string(),
                    text: PromptBuilder::new(request.prompt_version()).build(),
                },
                ContentPart::ImageUrl {
                    content_type: "image_url".to_string(),
                    image_url: ImageData { url: data_url },
                },
            ],
        }];

        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: 1000,
        }
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> AnalysisError {
        if err.is_timeout() {
            log::error!("⏱️ OpenRouter did not answer within {:?}", self.timeout);
            AnalysisError::Timeout(self.timeout)
        } else {
            log::error!("❌ OpenRouter transport error: {}", err);
            AnalysisError::Transport(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl VisionService for OpenRouterService {
    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<String> {
        let chat_request = self.build_request(request);

        log::info!(
            "🤖 Sending image to OpenRouter with model: {} (prompt {})",
            self.model,
            request.prompt_version().as_str()
        );

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/medicine-scanner")
            .header("X-Title", "Medicine Scanner")
            .timeout(self.timeout)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        log::debug!("📥 OpenRouter response status: {}", status);

        let response_text = response.text().await.map_err(|e| self.map_reqwest_error(e))?;

        if !status.is_success() {
            log::error!(
                "❌ OpenRouter API error ({}): {}",
                status,
                response_text.chars().take(500).collect::<String>()
            );
            return Err(AnalysisError::Provider {
                status: status.as_u16(),
                message: response_text,
            });
        }

        log::debug!("📄 Raw OpenRouter response size: {} bytes", response_text.len());

        let chat_response: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("❌ Could not decode OpenRouter response: {}", e);
            AnalysisError::Provider {
                status: status.as_u16(),
                message: format!("undecodable response: {}", e),
            }
        })?;

        if let Some(error) = chat_response.error {
            let message = error.message.unwrap_or_else(|| "unknown provider error".to_string());
            log::error!("❌ OpenRouter reported error {:?}: {}", error.code, message);
            return Err(AnalysisError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AnalysisError::Provider {
                status: status.as_u16(),
                message: "response contained no content".to_string(),
            })?;

        log::info!("💬 OpenRouter reply received ({} chars)", content.len());
        log::debug!("💬 OpenRouter reply: {}", content);

        Ok(content)
    }
}
