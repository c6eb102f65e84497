//! Image captioning through the vision-capable chat endpoint.

use super::client::{OpenAiClient, PROVIDER};
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::providers::invalid_response;
use crate::{VisionProvider, CAPTION_INSTRUCTION, GENERATION_TEMPERATURE};
use async_trait::async_trait;
use banter_core::BanterResult;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Vision captioning backed by an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiVisionProvider {
    client: OpenAiClient,
    model: String,
}

impl OpenAiVisionProvider {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

/// Mime type for the data URL, guessed from the filename extension.
/// Unknown or absent extensions fall back to PNG.
fn image_mime(filename: Option<&str>) -> &'static str {
    let Some(name) = filename else {
        return "image/png";
    };
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/png"
    }
}

#[async_trait]
impl VisionProvider for OpenAiVisionProvider {
    async fn describe_image(
        &self,
        image: &[u8],
        filename: Option<&str>,
    ) -> BanterResult<String> {
        let data_url = format!(
            "data:{};base64,{}",
            image_mime(filename),
            STANDARD.encode(image)
        );
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user_with_image(CAPTION_INSTRUCTION, data_url)],
            temperature: Some(GENERATION_TEMPERATURE),
            stream: None,
        };

        let response: ChatCompletionResponse =
            self.client.post_json("chat/completions", &request).await?;
        let caption = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .unwrap_or_default();
        if caption.is_empty() {
            return Err(invalid_response(PROVIDER, "no caption in response"));
        }
        Ok(caption.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::{BanterError, LlmError};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_image_mime_from_extension() {
        assert_eq!(image_mime(Some("photo.jpg")), "image/jpeg");
        assert_eq!(image_mime(Some("PHOTO.JPEG")), "image/jpeg");
        assert_eq!(image_mime(Some("sticker.webp")), "image/webp");
        assert_eq!(image_mime(Some("diagram.png")), "image/png");
        assert_eq!(image_mime(Some("archive.tar.gz")), "image/png");
        assert_eq!(image_mime(None), "image/png");
    }

    #[tokio::test]
    async fn test_describe_image_returns_trimmed_caption() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "vision-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  a red square  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiVisionProvider::new(
            OpenAiClient::new(server.uri(), String::new()),
            "vision-model",
        );
        let caption = provider
            .describe_image(b"fake png bytes", Some("square.png"))
            .await
            .unwrap();
        assert_eq!(caption, "a red square");
    }

    #[tokio::test]
    async fn test_describe_image_rejects_empty_caption() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": ""}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiVisionProvider::new(
            OpenAiClient::new(server.uri(), String::new()),
            "vision-model",
        );
        let err = provider.describe_image(b"bytes", None).await.unwrap_err();
        assert!(matches!(
            err,
            BanterError::Llm(LlmError::InvalidResponse { .. })
        ));
    }
}
