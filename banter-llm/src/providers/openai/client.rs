//! HTTP client shared by the chat and vision providers.

use super::types::ApiError;
use crate::providers::{invalid_response, rate_limited, request_failed};
use banter_core::BanterResult;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) const PROVIDER: &str = "openai";

/// Client for an OpenAI-compatible endpoint. The API key may be empty;
/// self-hosted backends typically run without one, and no Authorization
/// header is sent in that case.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: SecretString::new(api_key.into()),
        }
    }

    /// POST `body` and decode a JSON response.
    pub(crate) async fn post_json<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> BanterResult<Res> {
        let response = self.send(endpoint, body).await?;
        response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("failed to parse response: {}", e)))
    }

    /// POST `body` and hand back the raw response for streaming consumption.
    /// The status is already checked; only body errors remain possible.
    pub(crate) async fn post_streaming<Req: Serialize>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> BanterResult<Response> {
        self.send(endpoint, body).await
    }

    async fn send(&self, endpoint: &str, body: &impl Serialize) -> BanterResult<Response> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut builder = self.http.post(url).json(body);
        if !self.api_key.expose_secret().is_empty() {
            builder = builder.bearer_auth(self.api_key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        let message = match serde_json::from_str::<ApiError>(&error_text) {
            Ok(api_error) => api_error.error.message,
            Err(_) => error_text,
        };

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => rate_limited(PROVIDER, retry_after_ms),
            _ => request_failed(PROVIDER, status.as_u16() as i32, message),
        })
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::{BanterError, LlmError};
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_debug_redacts_api_key() {
        let client = OpenAiClient::new("http://localhost:8000/v1", "sk-secret".to_string());
        let rendered = format!("{:?}", client);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAiClient::new("http://localhost:8000/v1/", String::new());
        let rendered = format!("{:?}", client);
        assert!(rendered.contains("/v1\""));
        assert!(!rendered.contains("/v1/\""));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after_ms(&headers), Some(2000));
        headers.insert("retry-after", HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after_ms(&headers), Some(500));
        headers.remove("retry-after");
        assert_eq!(parse_retry_after_ms(&headers), None);
    }

    #[tokio::test]
    async fn test_bearer_header_sent_when_key_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), "test-key".to_string());
        let _: serde_json::Value = client.post_json("echo", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_maps_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "3")
                    .set_body_json(json!({"error": {"message": "slow down"}})),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), String::new());
        let err = client
            .post_json::<_, serde_json::Value>("limited", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BanterError::Llm(LlmError::RateLimited {
                retry_after_ms: 3000,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_error_body_message_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/broken"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": {"message": "bad model name"}})),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), String::new());
        let err = client
            .post_json::<_, serde_json::Value>("broken", &json!({}))
            .await
            .unwrap_err();
        match err {
            BanterError::Llm(LlmError::RequestFailed {
                status, message, ..
            }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad model name");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
