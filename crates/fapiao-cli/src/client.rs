//! HTTP model clients for Ollama and OpenAI-compatible services.

use std::sync::OnceLock;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use fapiao_core::error::ModelError;
use fapiao_core::{ModelApi, ModelClient, ModelProfile, ModelRequest};

/// Calls the service described by a [`ModelProfile`].
///
/// The blocking HTTP client is built on first use, so the value can be created on the async
/// runtime and used from blocking worker threads.
pub struct HttpModelClient {
    api: ModelApi,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    http: OnceLock<reqwest::blocking::Client>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpModelClient {
    pub fn new(profile: &ModelProfile) -> Self {
        Self {
            api: profile.api,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            api_key: profile.api_key.clone().filter(|key| !key.is_empty()),
            timeout: Duration::from_secs(profile.timeout_secs.max(1)),
            http: OnceLock::new(),
        }
    }

    fn http(&self) -> Result<&reqwest::blocking::Client, ModelError> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ModelError::Request(e.to_string()))?;
        Ok(self.http.get_or_init(|| client))
    }

    fn endpoint(&self) -> String {
        match self.api {
            ModelApi::Ollama => format!("{}/api/generate", self.base_url),
            ModelApi::OpenAi => {
                let base = self.base_url.trim_end_matches("/v1");
                format!("{base}/v1/chat/completions")
            }
        }
    }
}

impl ModelClient for HttpModelClient {
    fn generate(&self, request: &ModelRequest<'_>) -> Result<String, ModelError> {
        let url = self.endpoint();
        let body = match self.api {
            ModelApi::Ollama => generate_body(request),
            ModelApi::OpenAi => chat_body(request),
        };
        debug!(%url, model = request.model, images = request.images().len(), "calling model");

        let mut call = self.http()?.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ModelError::Request(e.to_string()))?;

        match self.api {
            ModelApi::Ollama => response
                .json::<GenerateResponse>()
                .map(|r| r.response)
                .map_err(|e| ModelError::Request(e.to_string())),
            ModelApi::OpenAi => {
                let reply = response
                    .json::<ChatResponse>()
                    .map_err(|e| ModelError::Request(e.to_string()))?;
                reply
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or(ModelError::EmptyResponse)
            }
        }
    }
}

/// Ollama `/api/generate` body, asking for a JSON answer.
fn generate_body(request: &ModelRequest<'_>) -> Value {
    let mut body = json!({
        "model": request.model,
        "prompt": request.full_prompt(),
        "stream": false,
        "format": "json",
        "options": { "temperature": 0 },
    });
    let images = request.images();
    if !images.is_empty() {
        body["images"] = images
            .iter()
            .map(|image| Value::String(STANDARD.encode(&image.data)))
            .collect();
    }
    body
}

/// OpenAI chat body; images travel as data URIs after the prompt.
fn chat_body(request: &ModelRequest<'_>) -> Value {
    let images = request.images();
    let content = if images.is_empty() {
        Value::String(request.full_prompt())
    } else {
        let mut parts = vec![json!({ "type": "text", "text": request.full_prompt() })];
        parts.extend(images.iter().map(|image| {
            json!({
                "type": "image_url",
                "image_url": {
                    "url": format!(
                        "data:{};base64,{}",
                        image.encoding.mime(),
                        STANDARD.encode(&image.data)
                    ),
                },
            })
        }));
        Value::Array(parts)
    };
    json!({
        "model": request.model,
        "messages": [{ "role": "user", "content": content }],
        "temperature": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fapiao_core::EncodedImage;
    use fapiao_core::ModelInput;
    use fapiao_core::convert::ImageEncoding;

    fn image() -> EncodedImage {
        EncodedImage {
            data: vec![1, 2, 3],
            encoding: ImageEncoding::Png,
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn test_endpoints() {
        let ollama = HttpModelClient::new(&ModelProfile::default());
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/generate");

        let vllm = HttpModelClient::new(&ModelProfile {
            api: ModelApi::OpenAi,
            base_url: "http://gpu:8000/v1/".to_string(),
            ..ModelProfile::default()
        });
        assert_eq!(vllm.endpoint(), "http://gpu:8000/v1/chat/completions");
    }

    #[test]
    fn test_generate_body_with_images() {
        let page = image();
        let request = ModelRequest {
            model: "qwen2.5vl:7b",
            prompt: "extract",
            input: ModelInput::Images(vec![&page]),
        };
        let body = generate_body(&request);
        assert_eq!(body["model"], "qwen2.5vl:7b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["images"][0], "AQID");
    }

    #[test]
    fn test_generate_body_text_has_no_images() {
        let request = ModelRequest {
            model: "qwen2.5:7b",
            prompt: "extract",
            input: ModelInput::Text("发票号码：1"),
        };
        let body = generate_body(&request);
        assert!(body.get("images").is_none());
        assert!(body["prompt"].as_str().unwrap().ends_with("发票号码：1"));
    }

    #[test]
    fn test_chat_body_uses_data_uris() {
        let page = image();
        let request = ModelRequest {
            model: "vl",
            prompt: "extract",
            input: ModelInput::Images(vec![&page]),
        };
        let body = chat_body(&request);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let client = HttpModelClient::new(&ModelProfile {
            api_key: Some(String::new()),
            ..ModelProfile::default()
        });
        assert!(client.api_key.is_none());
    }
}
