//! Turns a completed wizard into a create-token request
//!
//! Validation runs before anything touches the network and fails on the
//! first problem found. A submission issues exactly one request and is never
//! retried; the outcome is reported once to the notification sink.

use crate::client::{ClientError, TokenService};
use crate::models::{Token, TokenCategory};
use crate::notify::{FailureSource, Notification, NotificationSink};
use crate::schema::{FieldValue, FileBlob, ValidationError};
use crate::wizard::WizardState;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_FAILURE: &str = "Failed to generate token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartValue {
    Text(String),
    File(FileBlob),
}

/// One named part of the multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPart {
    pub name: String,
    pub value: PartValue,
}

/// Transport-neutral create-token payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubmission {
    pub category: TokenCategory,
    parts: Vec<SubmissionPart>,
}

impl TokenSubmission {
    pub fn parts(&self) -> &[SubmissionPart] {
        &self.parts
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.parts.iter().find(|p| p.name == name).and_then(|p| match &p.value {
            PartValue::Text(s) => Some(s.as_str()),
            PartValue::File(_) => None,
        })
    }

    pub fn file(&self, name: &str) -> Option<&FileBlob> {
        self.parts.iter().find(|p| p.name == name).and_then(|p| match &p.value {
            PartValue::File(blob) => Some(blob),
            PartValue::Text(_) => None,
        })
    }
}

/// Body returned by the create-token endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateTokenResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "imageUrl", alias = "image_url")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `success: false`, or an error body, reported by the token service
    #[error("{0}")]
    Server(String),

    #[error(transparent)]
    Transport(ClientError),
}

impl SubmitError {
    /// Text for the failure notification, the most specific message available:
    /// a validation message, else the server-reported message, else the
    /// transport error.
    pub fn notification_message(&self) -> String {
        match self {
            SubmitError::Validation(e) => e.to_string(),
            SubmitError::Server(message) if !message.trim().is_empty() => message.clone(),
            SubmitError::Server(_) => DEFAULT_FAILURE.to_string(),
            SubmitError::Transport(e) => e.to_string(),
        }
    }
}

impl From<ClientError> for SubmitError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Server(message) => SubmitError::Server(message),
            other => SubmitError::Transport(other),
        }
    }
}

/// Validates wizard state and submits it to the token service
pub struct SubmissionBuilder {
    service: Arc<dyn TokenService>,
    sink: Arc<dyn NotificationSink>,
}

impl SubmissionBuilder {
    pub fn new(service: Arc<dyn TokenService>, sink: Arc<dyn NotificationSink>) -> Self {
        SubmissionBuilder { service, sink }
    }

    /// Check the state in submission order: category, basic info, then each
    /// required field of the category's schema.
    pub fn validate(state: &WizardState) -> Result<TokenCategory, ValidationError> {
        let category = state.category().ok_or(ValidationError::MissingCategory)?;

        if state.token_name().trim().is_empty() || state.description().trim().is_empty() {
            return Err(ValidationError::MissingBasicInfo);
        }

        for descriptor in state.schema().iter().filter(|d| d.required) {
            match state.field(descriptor.name) {
                Some(value) if !value.is_empty() => {}
                _ => {
                    return Err(ValidationError::MissingField {
                        label: descriptor.label,
                    })
                }
            }
        }

        Ok(category)
    }

    pub fn build_payload(state: &WizardState) -> Result<TokenSubmission, ValidationError> {
        let category = Self::validate(state)?;

        let mut parts = vec![
            text_part("tokenName", state.token_name()),
            text_part("description", state.description()),
            text_part("category", category.as_str()),
        ];

        for (descriptor, value) in state.fields() {
            let value = match value {
                FieldValue::Text(s) | FieldValue::Choice(s) => PartValue::Text(s.clone()),
                FieldValue::File(blob) => PartValue::File(blob.clone()),
            };
            parts.push(SubmissionPart {
                name: descriptor.name.to_string(),
                value,
            });
        }

        Ok(TokenSubmission { category, parts })
    }

    /// Submit the wizard state; the caller discards the state on success
    pub async fn submit(&self, state: &WizardState) -> Result<Token, SubmitError> {
        let result = self.try_submit(state).await;

        match &result {
            Ok(token) => {
                log::info!("Created {} token {}", token.category, token.token);
                self.sink.notify(Notification::TokenCreated {
                    token: token.clone(),
                });
            }
            Err(e) => {
                log::warn!("Token submission failed: {}", e);
                self.sink
                    .notify(Notification::failure(FailureSource::Submission, e.notification_message()));
            }
        }

        result
    }

    async fn try_submit(&self, state: &WizardState) -> Result<Token, SubmitError> {
        let submission = Self::build_payload(state)?;
        let category = submission.category;

        log::debug!(
            "Submitting {} token with {} part(s)",
            category,
            submission.parts().len()
        );

        let response = self.service.create_token(&submission).await?;

        match response {
            CreateTokenResponse {
                success: true,
                token: Some(token),
                image_url,
                ..
            } if !token.is_empty() => Ok(Token {
                token,
                category,
                image_url,
            }),
            CreateTokenResponse { error, message, .. } => Err(SubmitError::Server(
                error
                    .or(message)
                    .unwrap_or_else(|| DEFAULT_FAILURE.to_string()),
            )),
        }
    }
}

fn text_part(name: &str, value: &str) -> SubmissionPart {
    SubmissionPart {
        name: name.to_string(),
        value: PartValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenRecord;
    use crate::notify::testing::RecordingSink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Token service stand-in that records submissions
    struct MockTokenService {
        response: Result<CreateTokenResponse, fn() -> ClientError>,
        received: Mutex<Vec<TokenSubmission>>,
    }

    impl MockTokenService {
        fn replying(response: CreateTokenResponse) -> Arc<Self> {
            Arc::new(MockTokenService {
                response: Ok(response),
                received: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: fn() -> ClientError) -> Arc<Self> {
            Arc::new(MockTokenService {
                response: Err(err),
                received: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TokenService for MockTokenService {
        async fn create_token(
            &self,
            submission: &TokenSubmission,
        ) -> Result<CreateTokenResponse, ClientError> {
            self.received.lock().unwrap().push(submission.clone());
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(make) => Err(make()),
            }
        }

        async fn delete_token(&self, _token: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn list_tokens(&self) -> Result<Vec<TokenRecord>, ClientError> {
            Ok(Vec::new())
        }

        async fn get_token(&self, token: &str) -> Result<TokenRecord, ClientError> {
            Err(ClientError::Server(format!("Token {} not found", token)))
        }
    }

    fn ok_response(token: &str) -> CreateTokenResponse {
        CreateTokenResponse {
            success: true,
            token: Some(token.to_string()),
            ..CreateTokenResponse::default()
        }
    }

    fn complete_aws() -> WizardState {
        let mut state = WizardState::new();
        state.select_category(TokenCategory::Aws).unwrap();
        state.set_token_name("Billing S3 key");
        state.set_description("Left in the finance share");
        state
            .set_field("awsRegion", FieldValue::Choice("us-east-1".into()))
            .unwrap();
        state
            .set_field("awsService", FieldValue::Choice("s3".into()))
            .unwrap();
        state
    }

    #[test]
    fn test_validation_order() {
        let mut state = WizardState::new();
        assert_eq!(
            SubmissionBuilder::validate(&state),
            Err(ValidationError::MissingCategory)
        );

        state.select_category(TokenCategory::Healthcare).unwrap();
        assert_eq!(
            SubmissionBuilder::validate(&state),
            Err(ValidationError::MissingBasicInfo)
        );

        state.set_token_name("EHR export");
        state.set_description("Fake patient list");
        assert_eq!(
            SubmissionBuilder::validate(&state),
            Err(ValidationError::MissingField { label: "Healthcare System" })
        );

        state
            .set_field("healthcareSystem", FieldValue::Choice("ehr".into()))
            .unwrap();
        state
            .set_field("patientIdFormat", FieldValue::Text("   ".into()))
            .unwrap();
        assert_eq!(
            SubmissionBuilder::validate(&state),
            Err(ValidationError::MissingField { label: "Patient ID Format" })
        );

        state
            .set_field("patientIdFormat", FieldValue::Text("MRN-####".into()))
            .unwrap();
        state
            .set_field("accessLevel", FieldValue::Choice("read".into()))
            .unwrap();
        assert_eq!(
            SubmissionBuilder::validate(&state),
            Ok(TokenCategory::Healthcare)
        );
    }

    #[test]
    fn test_payload_parts() {
        let payload = SubmissionBuilder::build_payload(&complete_aws()).unwrap();
        let names: Vec<_> = payload.parts().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["tokenName", "description", "category", "awsRegion", "awsService"]
        );
        assert_eq!(payload.text("category"), Some("aws"));
        assert_eq!(payload.text("awsRegion"), Some("us-east-1"));
        assert_eq!(payload.text("awsService"), Some("s3"));
    }

    #[test]
    fn test_payload_file_part() {
        let mut state = WizardState::new();
        state.select_category(TokenCategory::Image).unwrap();
        state.set_token_name("Floor plan");
        state.set_description("Facilities folder");
        state
            .set_field("file", FieldValue::File(FileBlob::new("plan.png", vec![7; 16])))
            .unwrap();

        let payload = SubmissionBuilder::build_payload(&state).unwrap();
        let blob = payload.file("file").unwrap();
        assert_eq!(blob.file_name, "plan.png");
        assert_eq!(blob.content_type.as_deref(), Some("image/png"));
        assert_eq!(blob.bytes.len(), 16);
        assert!(payload.text("file").is_none());
    }

    #[tokio::test]
    async fn test_submit_aws_success() {
        let service = MockTokenService::replying(ok_response("tok-aws-1"));
        let sink = RecordingSink::new();
        let builder = SubmissionBuilder::new(service.clone(), sink.clone());

        let token = builder.submit(&complete_aws()).await.unwrap();
        assert_eq!(token.category, TokenCategory::Aws);
        assert_eq!(token.token, "tok-aws-1");

        let sent = service.received.lock().unwrap()[0].clone();
        assert_eq!(sent.text("awsRegion"), Some("us-east-1"));
        assert_eq!(sent.text("awsService"), Some("s3"));

        let notes = sink.take();
        assert_eq!(notes.len(), 1);
        assert!(matches!(notes[0], Notification::TokenCreated { .. }));
    }

    #[tokio::test]
    async fn test_validation_failure_skips_network() {
        let service = MockTokenService::replying(ok_response("unused"));
        let sink = RecordingSink::new();
        let builder = SubmissionBuilder::new(service.clone(), sink.clone());

        let mut state = complete_aws();
        state.clear_field("awsService");

        let err = builder.submit(&state).await.unwrap_err();
        assert_eq!(err.to_string(), "AWS Service is required");
        assert_eq!(service.calls(), 0);

        match &sink.take()[..] {
            [Notification::Failure { message, .. }] => {
                assert_eq!(message, "AWS Service is required")
            }
            other => panic!("unexpected notifications: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_reported_failure() {
        let service = MockTokenService::replying(CreateTokenResponse {
            success: false,
            error: Some("Token quota exceeded".to_string()),
            ..CreateTokenResponse::default()
        });
        let sink = RecordingSink::new();
        let builder = SubmissionBuilder::new(service, sink.clone());

        let err = builder.submit(&complete_aws()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Server(ref m) if m == "Token quota exceeded"));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_success_flag_without_token_is_failure() {
        let service = MockTokenService::replying(CreateTokenResponse {
            success: true,
            ..CreateTokenResponse::default()
        });
        let builder = SubmissionBuilder::new(service, RecordingSink::new());

        let err = builder.submit(&complete_aws()).await.unwrap_err();
        assert_eq!(err.to_string(), DEFAULT_FAILURE);
    }

    #[tokio::test]
    async fn test_error_body_beats_transport_message() {
        let service = MockTokenService::failing(|| ClientError::Server("Invalid image".into()));
        let builder = SubmissionBuilder::new(service.clone(), RecordingSink::new());
        let err = builder.submit(&complete_aws()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Server(_)));
        assert_eq!(err.to_string(), "Invalid image");

        let service = MockTokenService::failing(|| ClientError::Status(502));
        let builder = SubmissionBuilder::new(service.clone(), RecordingSink::new());
        let err = builder.submit(&complete_aws()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Transport(_)));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_notification_message_per_source() {
        let err = SubmitError::from(ValidationError::MissingBasicInfo);
        assert_eq!(err.notification_message(), "Token name and description are required");

        let err = SubmitError::from(ClientError::Server("Invalid image".into()));
        assert_eq!(err.notification_message(), "Invalid image");

        let err = SubmitError::Server("  ".into());
        assert_eq!(err.notification_message(), DEFAULT_FAILURE);

        let err = SubmitError::from(ClientError::Status(502));
        assert_eq!(err.notification_message(), "Server returned status 502");

        let service = MockTokenService::failing(|| ClientError::Status(503));
        let sink = RecordingSink::new();
        let builder = SubmissionBuilder::new(service, sink.clone());
        let err = builder.submit(&complete_aws()).await.unwrap_err();
        match &sink.take()[..] {
            [Notification::Failure { source, message }] => {
                assert_eq!(*source, FailureSource::Submission);
                assert_eq!(*message, err.notification_message());
            }
            other => panic!("unexpected notifications: {:?}", other),
        }
    }

    #[test]
    fn test_failed_submission_can_be_retried() {
        let service = MockTokenService::failing(|| ClientError::Status(503));
        let sink = RecordingSink::new();
        let builder = SubmissionBuilder::new(service.clone(), sink.clone());
        let state = complete_aws();

        assert!(tokio_test::block_on(builder.submit(&state)).is_err());
        assert!(tokio_test::block_on(builder.submit(&state)).is_err());

        let sent = service.received.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text("tokenName"), sent[1].text("tokenName"));
        assert_eq!(sink.len(), 2);
    }
}
