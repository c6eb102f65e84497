//! Streaming chat generation against `/chat/completions`.

use super::client::{OpenAiClient, PROVIDER};
use super::types::{ChatCompletionChunk, ChatCompletionRequest, ChatMessage};
use crate::providers::stream_interrupted;
use crate::{
    compose_user_content, ChatProvider, TokenStream, GENERATION_TEMPERATURE, SYSTEM_INSTRUCTION,
};
use async_stream::try_stream;
use async_trait::async_trait;
use banter_core::BanterResult;
use futures_util::StreamExt;

/// Chat generation backed by an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatProvider {
    client: OpenAiClient,
    model: String,
}

impl OpenAiChatProvider {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    async fn stream_chat(
        &self,
        message: &str,
        context_blocks: &[String],
    ) -> BanterResult<TokenStream> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_INSTRUCTION),
                ChatMessage::user(compose_user_content(message, context_blocks)),
            ],
            temperature: Some(GENERATION_TEMPERATURE),
            stream: Some(true),
        };

        // The POST and status check happen before the stream exists, so
        // setup failures come back as a plain Err.
        let response = self
            .client
            .post_streaming("chat/completions", &request)
            .await?;
        Ok(decode_token_stream(response))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Decode the SSE body of a streaming completion into answer fragments.
///
/// Lines accumulate per event; a blank line dispatches the buffered `data:`
/// payload. `[DONE]` ends the stream. Undecodable payloads are skipped.
fn decode_token_stream(response: reqwest::Response) -> TokenStream {
    Box::pin(try_stream! {
        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut data_buf = String::new();

        'body: while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| stream_interrupted(PROVIDER, format!("stream read failed: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                if let Some(data) = line.strip_prefix("data:") {
                    let data = data.strip_prefix(' ').unwrap_or(data);
                    if !data.is_empty() {
                        if !data_buf.is_empty() {
                            data_buf.push('\n');
                        }
                        data_buf.push_str(data);
                    }
                    continue;
                }

                // Blank line terminates the pending event.
                if !line.is_empty() || data_buf.is_empty() {
                    continue;
                }

                let data = std::mem::take(&mut data_buf);
                if data.trim_end() == "[DONE]" {
                    break 'body;
                }
                match serde_json::from_str::<ChatCompletionChunk>(&data) {
                    Ok(chunk) => {
                        for choice in chunk.choices {
                            if choice.index != 0 {
                                continue;
                            }
                            if let Some(content) = choice.delta.content {
                                if !content.is_empty() {
                                    yield content;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping undecodable stream payload");
                    }
                }
            }
        }
    })
}
