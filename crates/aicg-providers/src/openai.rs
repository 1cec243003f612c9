//! OpenAI-compatible adapter.
//!
//! Covers the text, image and TTS capabilities of any endpoint that
//! speaks the OpenAI REST dialect (`/chat/completions`,
//! `/images/generations`, `/audio/speech`). Model names are passed
//! through verbatim; unknown names are the provider's problem to
//! reject.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{ImageModel, TextModel, TtsModel};
use crate::types::{
    ImageOutput, ImageRequest, TextCompletion, TextRequest, TokenUsage, TtsOutput, TtsRequest,
};

/// Per-capability call timeouts.
const TEXT_TIMEOUT: Duration = Duration::from_secs(120);
const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible provider client.
pub struct OpenAiCompatible {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ImageGenRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    image: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

impl OpenAiCompatible {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        timeout: Duration,
    ) -> ProviderResult<reqwest::Response> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(timeout.as_secs())
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }
        Ok(response)
    }
}

/// Strip Markdown code-fence markers from a model response.
///
/// Providers routinely wrap JSON in ```json ... ``` despite json_mode;
/// the contract is that callers receive bare text.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening fence.
    let rest = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl TextModel for OpenAiCompatible {
    async fn complete(&self, req: TextRequest) -> ProviderResult<TextCompletion> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = req.system.as_deref() {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: &req.prompt });

        let body = ChatRequest {
            model: &req.model,
            messages,
            temperature: req.temperature,
            response_format: req
                .json_mode
                .then_some(ResponseFormat { format_type: "json_object" }),
        };

        debug!(model = %req.model, json_mode = req.json_mode, "Text completion request");
        let response = self.post_json("chat/completions", &body, TEXT_TIMEOUT).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| ProviderError::Malformed("response carried no choices".into()))?;

        let text = if req.json_mode {
            strip_code_fences(content).to_string()
        } else {
            content.trim().to_string()
        };

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(TextCompletion { text, usage })
    }
}

#[async_trait]
impl ImageModel for OpenAiCompatible {
    async fn generate(&self, req: ImageRequest) -> ProviderResult<ImageOutput> {
        let size = req.aspect_ratio.as_deref().map(|ratio| match ratio {
            "16:9" => "1792x1024".to_string(),
            "9:16" => "1024x1792".to_string(),
            _ => "1024x1024".to_string(),
        });

        let prompt = match req.style.as_deref() {
            Some(style) => format!("{}. Style: {}", req.prompt, style),
            None => req.prompt.clone(),
        };

        let body = ImageGenRequest {
            model: &req.model,
            prompt: &prompt,
            n: 1,
            response_format: "b64_json",
            size,
            image: req.reference_images.clone(),
        };

        debug!(model = %req.model, refs = req.reference_images.len(), "Image generation request");
        let response = self.post_json("images/generations", &body, IMAGE_TIMEOUT).await?;

        let parsed: ImageGenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let b64 = parsed
            .data
            .first()
            .and_then(|d| d.b64_json.as_deref())
            .ok_or_else(|| ProviderError::Malformed("response carried no image data".into()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| ProviderError::Malformed(format!("invalid base64 image: {e}")))?;

        Ok(ImageOutput { bytes, mime: "image/png".to_string() })
    }
}

#[async_trait]
impl TtsModel for OpenAiCompatible {
    async fn synthesize(&self, req: TtsRequest) -> ProviderResult<TtsOutput> {
        let body = SpeechRequest {
            model: &req.model,
            input: &req.text,
            voice: &req.voice_id,
            speed: req.speed,
        };

        debug!(model = %req.model, voice = %req.voice_id, "Speech synthesis request");
        let response = self.post_json("audio/speech", &body, TTS_TIMEOUT).await?;

        let audio_bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?
            .to_vec();

        if audio_bytes.is_empty() {
            return Err(ProviderError::Malformed("empty audio payload".into()));
        }

        // The speech endpoint streams raw audio with no timing header;
        // the caller measures the payload before persisting.
        Ok(TtsOutput { audio_bytes, mime: "audio/mpeg".to_string(), duration_ms: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  plain text  "), "plain text");
    }

    #[test]
    fn chat_request_shape() {
        let body = ChatRequest {
            model: "gpt-x",
            messages: vec![
                ChatMessage { role: "system", content: "sys" },
                ChatMessage { role: "user", content: "hi" },
            ],
            temperature: Some(0.2),
            response_format: Some(ResponseFormat { format_type: "json_object" }),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"model\":\"gpt-x\""));
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));
    }

    #[test]
    fn base_url_is_normalized() {
        let p = OpenAiCompatible::new("k", "https://api.example.com/v1/");
        assert_eq!(p.url("chat/completions"), "https://api.example.com/v1/chat/completions");
    }
}
