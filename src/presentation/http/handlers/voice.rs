//! Voice Account Handlers
//!
//! Provisioning and credential endpoints for the telephony subsystem. The
//! endpoint id is always the authenticated user's id; clients cannot
//! provision or read accounts for other users.

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::domain::telephony::{ALLOWED_CODEC, SIP_TRANSPORT};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Provision request body
#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    /// Registration password for the new account
    pub password: String,
}

/// Connection parameters a SIP user agent needs besides its credentials.
#[derive(Debug, Serialize)]
pub struct ConnectionSettings {
    pub pbx_websocket_uri: String,
    pub domain: String,
    pub stun_server: String,
    pub transport: &'static str,
    pub codec: &'static str,
}

/// Provision response body
#[derive(Debug, Serialize)]
pub struct VoiceAccountResponse {
    pub endpoint_id: String,
    pub username: String,
    pub aor: String,
    pub max_contacts: i32,
    pub connection: ConnectionSettings,
}

/// Credentials response body
#[derive(Debug, Serialize)]
pub struct CredentialsResponse {
    pub username: String,
    pub password: String,
    pub connection: ConnectionSettings,
}

fn connection_settings(state: &AppState) -> ConnectionSettings {
    ConnectionSettings {
        pbx_websocket_uri: state.settings.sip.pbx_websocket_uri.clone(),
        domain: state.settings.sip.domain.clone(),
        stun_server: state.settings.sip.stun_server.clone(),
        transport: SIP_TRANSPORT,
        codec: ALLOWED_CODEC,
    }
}

/// Create the telephony account for the authenticated user.
///
/// `POST /api/v1/voice/account`
pub async fn provision_account(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<VoiceAccountResponse>), AppError> {
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let endpoint_id = auth_user.user_id.to_string();
    let account = state
        .provisioner
        .provision(&endpoint_id, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(VoiceAccountResponse {
            endpoint_id: account.endpoint_id,
            username: account.username,
            aor: account.aor,
            max_contacts: account.max_contacts,
            connection: connection_settings(&state),
        }),
    ))
}

/// Registration credentials for the authenticated user's account.
///
/// `GET /api/v1/voice/credentials`
pub async fn get_credentials(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<CredentialsResponse>, AppError> {
    let endpoint_id = auth_user.user_id.to_string();
    let credentials = state.provisioner.credentials(&endpoint_id).await?;

    Ok(Json(CredentialsResponse {
        username: credentials.username,
        password: credentials.password,
        connection: connection_settings(&state),
    }))
}
