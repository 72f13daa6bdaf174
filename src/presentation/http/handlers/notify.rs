//! Internal Notify Handler
//!
//! Entry point for the platform API to fan a group-tagged payload out to
//! the group's live connections. The gateway never interprets the
//! content; it only validates the tag and delivers the envelope.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::domain::scope::ChatScope;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Notify request body
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    /// Group tag naming the broadcast group
    #[serde(rename = "signalGroup")]
    pub signal_group: String,
    /// Dispatch event name (e.g. MESSAGE_CREATE)
    pub event: String,
    /// Opaque payload delivered verbatim to every member
    pub content: serde_json::Value,
}

/// Notify response body
#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    /// Number of connections the payload was queued for
    pub delivered: usize,
}

/// Broadcast a payload to every member of a group.
///
/// `POST /api/v1/notify`
pub async fn notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, AppError> {
    validate_group_tag(&request.signal_group)?;

    let delivered =
        state
            .gateway
            .broadcast(&request.signal_group, &request.event, request.content);

    Ok(Json(NotifyResponse { delivered }))
}

/// A tag must follow the group-tag grammar before it reaches the index.
fn validate_group_tag(tag: &str) -> Result<(), AppError> {
    ChatScope::parse_tag(tag)
        .map(|_| ())
        .ok_or_else(|| AppError::Validation(format!("malformed group tag: {}", tag)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("channel:42")]
    #[test_case("dm:7")]
    #[test_case("privateGroup:3")]
    #[test_case("server:99")]
    fn well_formed_tags_pass(tag: &str) {
        assert!(validate_group_tag(tag).is_ok());
    }

    #[test_case("voice:42")]
    #[test_case("channel:")]
    #[test_case("")]
    fn malformed_tags_are_validation_errors(tag: &str) {
        let err = validate_group_tag(tag).unwrap_err();
        assert_eq!(err.kind(), crate::shared::error::ErrorKind::Validation);
    }
}
