//! External collaborators and their HTTP implementation
//!
//! The core only depends on the [`TokenService`], [`LogSource`] and
//! [`LocationSource`] traits. [`HoneyGuardClient`] implements all three
//! against the HoneyGuard REST API.

use crate::config::ApiConfig;
use crate::models::{decode_entries, AccessLogEntry, LocationRecord, LogFilter, Scope, TokenRecord};
use crate::submission::{CreateTokenResponse, PartValue, TokenSubmission};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the HoneyGuard API
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(u16),

    /// Message reported by the server itself
    #[error("{0}")]
    Server(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
}

impl ClientError {
    pub fn is_server_reported(&self) -> bool {
        matches!(self, ClientError::Server(_))
    }
}

#[async_trait]
pub trait TokenService: Send + Sync {
    /// Issue one create request. A `success: false` body is returned as-is
    /// so the caller can decide how to report it.
    async fn create_token(
        &self,
        submission: &TokenSubmission,
    ) -> Result<CreateTokenResponse, ClientError>;

    async fn delete_token(&self, token: &str) -> Result<(), ClientError>;

    async fn list_tokens(&self) -> Result<Vec<TokenRecord>, ClientError>;

    async fn get_token(&self, token: &str) -> Result<TokenRecord, ClientError>;
}

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current access-log collection for a scope, in the order the source
    /// returns it
    async fn fetch_logs(
        &self,
        scope: &Scope,
        filter: &LogFilter,
    ) -> Result<Vec<AccessLogEntry>, ClientError>;
}

#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn fetch_locations(&self) -> Result<Vec<LocationRecord>, ClientError>;
}

/// `{success, data, error, message}` response wrapper
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self, fallback: &str) -> Result<T, ClientError> {
        if !self.success {
            return Err(ClientError::Server(
                self.error
                    .or(self.message)
                    .unwrap_or_else(|| fallback.to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ClientError::Server("Invalid data format received from server".to_string()))
    }
}

/// Collections are served either wrapped or as a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Collection<T> {
    Bare(Vec<T>),
    Wrapped(Envelope<Vec<T>>),
}

impl<T> Collection<T> {
    fn into_vec(self, fallback: &str) -> Result<Vec<T>, ClientError> {
        match self {
            Collection::Bare(items) => Ok(items),
            Collection::Wrapped(envelope) => envelope.into_data(fallback),
        }
    }
}

/// HTTP client for the HoneyGuard API
#[derive(Clone)]
pub struct HoneyGuardClient {
    base_url: Url,
    client: Client,
}

impl HoneyGuardClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::BaseUrl(format!("{} ({})", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::BaseUrl(config.base_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HoneyGuardClient { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Read a response body, turning non-2xx statuses into errors. An error
    /// body carrying `error` (or else `message`) is reported as the server's
    /// message, the same precedence as an unsuccessful envelope.
    async fn read_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
                if let Some(message) = envelope.error.or(envelope.message) {
                    return Err(ClientError::Server(message));
                }
            }
            return Err(ClientError::Status(status.as_u16()));
        }

        Ok(serde_json::from_str(&body)?)
    }

    fn multipart_form(submission: &TokenSubmission) -> Result<Form, ClientError> {
        let mut form = Form::new();
        for part in submission.parts() {
            form = match &part.value {
                PartValue::Text(value) => form.text(part.name.clone(), value.clone()),
                PartValue::File(blob) => {
                    let mut file_part =
                        Part::bytes(blob.bytes.clone()).file_name(blob.file_name.clone());
                    if let Some(ref content_type) = blob.content_type {
                        file_part = file_part.mime_str(content_type)?;
                    }
                    form.part(part.name.clone(), file_part)
                }
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl TokenService for HoneyGuardClient {
    async fn create_token(
        &self,
        submission: &TokenSubmission,
    ) -> Result<CreateTokenResponse, ClientError> {
        let url = self.endpoint(&["generate-token"])?;
        let form = Self::multipart_form(submission)?;
        log::debug!("POST {}", url);
        let response = self.client.post(url).multipart(form).send().await?;
        Self::read_body(response).await
    }

    async fn delete_token(&self, token: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["tokens", token])?;
        log::debug!("DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        let envelope: Envelope<serde_json::Value> = Self::read_body(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(ClientError::Server(
                envelope
                    .error
                    .or(envelope.message)
                    .unwrap_or_else(|| "Failed to delete token".to_string()),
            ))
        }
    }

    async fn list_tokens(&self) -> Result<Vec<TokenRecord>, ClientError> {
        let url = self.endpoint(&["tokens"])?;
        let response = self.client.get(url).send().await?;
        let tokens: Collection<TokenRecord> = Self::read_body(response).await?;
        tokens.into_vec("Failed to fetch tokens")
    }

    async fn get_token(&self, token: &str) -> Result<TokenRecord, ClientError> {
        let url = self.endpoint(&["tokens", "id", token])?;
        let response = self.client.get(url).send().await?;
        let envelope: Envelope<TokenRecord> = Self::read_body(response).await?;
        envelope.into_data("Failed to fetch token data")
    }
}

#[async_trait]
impl LogSource for HoneyGuardClient {
    async fn fetch_logs(
        &self,
        scope: &Scope,
        filter: &LogFilter,
    ) -> Result<Vec<AccessLogEntry>, ClientError> {
        let url = match scope {
            Scope::Global => self.endpoint(&["logs"])?,
            Scope::Token(token) => self.endpoint(&["tokens", token.as_str(), "logs"])?,
        };
        let response = self
            .client
            .get(url)
            .query(&filter.query_pairs())
            .send()
            .await?;
        let rows: Collection<serde_json::Value> = Self::read_body(response).await?;
        let (logs, skipped) = decode_entries(rows.into_vec("Failed to fetch logs")?);
        if skipped > 0 {
            log::warn!("Skipped {} malformed log row(s) for {}", skipped, scope);
        }
        Ok(logs)
    }
}

#[async_trait]
impl LocationSource for HoneyGuardClient {
    async fn fetch_locations(&self) -> Result<Vec<LocationRecord>, ClientError> {
        let url = self.endpoint(&["fetch-ip"])?;
        let response = self.client.get(url).send().await?;
        let locations: Collection<LocationRecord> = Self::read_body(response).await?;
        locations.into_vec("Failed to fetch IP locations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogLevel, TimeRange, TokenCategory};
    use crate::schema::{FieldValue, FileBlob};
    use crate::submission::SubmissionBuilder;
    use crate::wizard::WizardState;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HoneyGuardClient {
        HoneyGuardClient::new(&ApiConfig {
            base_url: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = HoneyGuardClient::new(&ApiConfig {
            base_url: "https://honeyguard.example/api/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        let url = client.endpoint(&["tokens", "a b", "logs"]).unwrap();
        assert_eq!(url.as_str(), "https://honeyguard.example/api/tokens/a%20b/logs");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = HoneyGuardClient::new(&ApiConfig {
            base_url: "not a url".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(ClientError::BaseUrl(_))));
    }

    #[tokio::test]
    async fn test_create_token_sends_multipart_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-token"))
            .and(body_string_contains("awsRegion"))
            .and(body_string_contains("us-east-1"))
            .and(body_string_contains("awsService"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "token": "tok-123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut state = WizardState::new();
        state.select_category(TokenCategory::Aws).unwrap();
        state.set_token_name("Deploy key");
        state.set_description("CI secrets decoy");
        state.set_field("awsRegion", FieldValue::Choice("us-east-1".into())).unwrap();
        state.set_field("awsService", FieldValue::Choice("s3".into())).unwrap();
        let submission = SubmissionBuilder::build_payload(&state).unwrap();

        let response = client_for(&server).create_token(&submission).await.unwrap();
        assert!(response.success);
        assert_eq!(response.token.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn test_create_token_with_file_reads_image_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-token"))
            .and(body_string_contains("filename=\"bait.png\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "token": "img-1",
                "imageUrl": "https://cdn.example/image/img-1"
            })))
            .mount(&server)
            .await;

        let mut state = WizardState::new();
        state.select_category(TokenCategory::Image).unwrap();
        state.set_token_name("Badge photo");
        state.set_description("HR folder");
        state
            .set_field("file", FieldValue::File(FileBlob::new("bait.png", b"PNGDATA".to_vec())))
            .unwrap();
        let submission = SubmissionBuilder::build_payload(&state).unwrap();

        let response = client_for(&server).create_token(&submission).await.unwrap();
        assert_eq!(
            response.image_url.as_deref(),
            Some("https://cdn.example/image/img-1")
        );
    }

    #[tokio::test]
    async fn test_error_status_with_message_is_server_reported() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/tokens/tok-9"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Token not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).delete_token("tok-9").await.unwrap_err();
        assert!(err.is_server_reported());
        assert_eq!(err.to_string(), "Token not found");
    }

    #[tokio::test]
    async fn test_error_body_prefers_error_over_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokens/id/tok-3"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Bad request",
                "error": "Unknown token id"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).get_token("tok-3").await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown token id");
    }

    #[tokio::test]
    async fn test_fetch_logs_skips_malformed_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"id": 1, "timestamp": "2024-05-01T10:00:00Z", "ip_address": "198.51.100.4"},
                    {"id": 2, "timestamp": null, "ip_address": "198.51.100.5"}
                ]
            })))
            .mount(&server)
            .await;

        let logs = client_for(&server)
            .fetch_logs(&Scope::Global, &LogFilter::default())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_error_status_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokens"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).list_tokens().await.unwrap_err();
        assert!(matches!(err, ClientError::Status(503)));
    }

    #[tokio::test]
    async fn test_fetch_logs_passes_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokens/tok-1/logs"))
            .and(query_param("timeRange", "7d"))
            .and(query_param("level", "warning"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"id": 2, "timestamp": "2024-05-01T10:05:00Z", "ip_address": "203.0.113.9",
                     "level": "warning", "message": "token opened", "source": "aws"},
                    {"id": 1, "timestamp": "2024-05-01T10:00:00Z", "ip_address": "198.51.100.4",
                     "level": "warning", "message": "token opened", "source": "aws"}
                ]
            })))
            .mount(&server)
            .await;

        let filter = LogFilter {
            time_range: Some(TimeRange::LastWeek),
            level: Some(LogLevel::Warning),
        };
        let logs = client_for(&server)
            .fetch_logs(&Scope::Token("tok-1".to_string()), &filter)
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].ip_address, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_fetch_logs_accepts_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"timestamp": "2024-05-01T10:00:00Z", "ip_address": "198.51.100.4"}
            ])))
            .mount(&server)
            .await;

        let logs = client_for(&server)
            .fetch_logs(&Scope::Global, &LogFilter::default())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fetch-ip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "Geo lookup unavailable"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_locations().await.unwrap_err();
        assert_eq!(err.to_string(), "Geo lookup unavailable");
    }
}
