//! Shared HTTP plumbing for registry calls.

use crate::error::DeleteFailure;
use crate::model::{DeletionOutcome, NETWORK_UNAVAILABLE, ResourceKind, StatusClass};
use common::config::RuntimeConfig;
use reqwest::header::HeaderMap;

/// A `reqwest` client plus the delete classification policy for the run.
#[derive(Debug, Clone)]
pub struct RegistryHttp {
    client: reqwest::Client,
    not_found_is_success: bool,
}

impl RegistryHttp {
    pub fn new(config: &RuntimeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            not_found_is_success: config.not_found_is_success,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Issue a DELETE and classify the status.
    ///
    /// Transport errors become `NETWORK_UNAVAILABLE`.
    pub async fn delete(
        &self,
        kind: ResourceKind,
        identifier: &str,
        url: &str,
        bearer: &str,
        headers: HeaderMap,
    ) -> Result<u16, DeleteFailure> {
        let response = self
            .client
            .delete(url)
            .bearer_auth(bearer)
            .headers(headers)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return Err(DeleteFailure {
                    kind,
                    identifier: identifier.to_string(),
                    status: NETWORK_UNAVAILABLE,
                    message: format!("network unavailable: {e}"),
                });
            }
        };

        let status = response.status().as_u16();
        match StatusClass::classify(status, self.not_found_is_success) {
            StatusClass::Success => Ok(status),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(DeleteFailure {
                    kind,
                    identifier: identifier.to_string(),
                    status,
                    message: error_message_from_text(&body)
                        .unwrap_or_else(|| format!("unexpected status {status}")),
                })
            }
        }
    }
}

/// Turn a channel's delete result into its terminal outcome record.
pub fn outcome(
    kind: ResourceKind,
    identifier: &str,
    result: Result<u16, DeleteFailure>,
) -> DeletionOutcome {
    match result {
        Ok(status) => DeletionOutcome::success(kind, identifier, status),
        Err(failure) => DeletionOutcome::failure(
            failure.kind,
            failure.identifier,
            failure.status,
            failure.message,
        ),
    }
}

/// Extract the message from a JSON error body.
///
/// Understands `{"message": ...}`, `{"detail": ...}` and the distribution
/// API's `{"errors": [{"message": ...}]}`.
pub fn error_message(value: &serde_json::Value) -> Option<String> {
    let object = value.as_object()?;

    if let Some(message) = ["message", "detail"].iter().find_map(|key| object.get(*key)) {
        return Some(match message {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }

    object
        .get("errors")?
        .as_array()?
        .iter()
        .find_map(|error| error.get("message")?.as_str().map(str::to_string))
}

pub fn error_message_from_text(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .as_ref()
        .and_then(error_message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(&json!({"message": "Not Found"})).as_deref(),
            Some("Not Found")
        );
        assert_eq!(
            error_message(&json!({"detail": "Object not found"})).as_deref(),
            Some("Object not found")
        );
        assert_eq!(
            error_message(&json!({"errors": [{"code": "UNSUPPORTED", "message": "unsupported"}]}))
                .as_deref(),
            Some("unsupported")
        );
        assert_eq!(error_message(&json!([{"message": "list"}])), None);
        assert_eq!(error_message(&json!({"results": []})), None);
    }

    #[test]
    fn test_outcome_from_result() {
        let ok = outcome(ResourceKind::Tag, "v1", Ok(204));
        assert!(ok.is_success());
        assert_eq!(ok.identifier, "v1");
        assert_eq!(ok.code, Some(204));

        let failed = outcome(
            ResourceKind::Manifest,
            "sha256:abc",
            Err(DeleteFailure {
                kind: ResourceKind::Manifest,
                identifier: "sha256:abc".to_string(),
                status: NETWORK_UNAVAILABLE,
                message: "network unavailable".to_string(),
            }),
        );
        assert_eq!(failed.status, StatusClass::Failure);
        assert_eq!(failed.code, Some(NETWORK_UNAVAILABLE));
    }
}
