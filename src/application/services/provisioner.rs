//! SIP Provisioning Service
//!
//! Ensures a user has a usable telephony account before placing or
//! receiving calls, and returns the registration credentials a client
//! needs. Account creation is atomic (one transaction behind the
//! repository); provisioning the same endpoint twice surfaces a conflict
//! instead of partial state. Credential reads retry transient database
//! failures with bounded backoff; writes are never retried automatically.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::repositories::TelephonyRepository;
use crate::domain::telephony::{SipAccount, SipCredentials};
use crate::shared::error::AppError;

/// Retries for transient failures on credential reads.
const READ_RETRIES: u32 = 2;
/// Base backoff between read retries; doubles per attempt.
const READ_BACKOFF: Duration = Duration::from_millis(50);

/// Telephony account provisioning service.
#[derive(Clone)]
pub struct SipProvisioner {
    repository: Arc<dyn TelephonyRepository>,
    max_contacts: i32,
}

impl SipProvisioner {
    pub fn new(repository: Arc<dyn TelephonyRepository>, max_contacts: i32) -> Self {
        Self {
            repository,
            max_contacts,
        }
    }

    /// Create the telephony account for `endpoint_id`.
    ///
    /// Writes the address-of-record, the auth credential (username equals
    /// the endpoint id), and the endpoint definition atomically. An already
    /// provisioned endpoint yields `AppError::Conflict`.
    pub async fn provision(
        &self,
        endpoint_id: &str,
        password: &str,
    ) -> Result<SipAccount, AppError> {
        let account = self
            .repository
            .create_account(endpoint_id, password, self.max_contacts)
            .await
            .inspect_err(|e| {
                tracing::error!(endpoint_id, severity = ?e.severity(), error = %e, "provisioning failed")
            })?;

        tracing::info!(endpoint_id, "SIP account provisioned");
        Ok(account)
    }

    /// Registration credentials for `endpoint_id`.
    ///
    /// Returns the same `{username, password}` pair supplied at
    /// provisioning time. Transient database failures are retried with
    /// bounded backoff before being surfaced.
    pub async fn credentials(&self, endpoint_id: &str) -> Result<SipCredentials, AppError> {
        let mut backoff = READ_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.repository.fetch_credentials(endpoint_id).await {
                Ok(credentials) => return Ok(credentials),
                Err(e) if e.is_transient() && attempt < READ_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        endpoint_id,
                        attempt,
                        error = %e,
                        "credential lookup failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    tracing::error!(endpoint_id, severity = ?e.severity(), error = %e, "credential lookup failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockTelephonyRepository;
    use crate::shared::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn provision_then_credentials_round_trips() {
        let mut repo = MockTelephonyRepository::new();
        repo.expect_create_account()
            .withf(|id, pw, max| id == "42" && pw == "secret" && *max == 5)
            .returning(|id, pw, max| {
                Ok(SipAccount {
                    endpoint_id: id.to_string(),
                    username: id.to_string(),
                    password: pw.to_string(),
                    aor: id.to_string(),
                    max_contacts: max,
                })
            });
        repo.expect_fetch_credentials().returning(|_| {
            Ok(SipCredentials {
                username: "42".into(),
                password: "secret".into(),
            })
        });

        let provisioner = SipProvisioner::new(Arc::new(repo), 5);
        let account = provisioner.provision("42", "secret").await.unwrap();
        assert_eq!(account.username, "42");
        assert_eq!(account.password, "secret");

        let creds = provisioner.credentials("42").await.unwrap();
        assert_eq!(creds, account.credentials());
    }

    #[tokio::test]
    async fn double_provision_surfaces_conflict() {
        let mut repo = MockTelephonyRepository::new();
        repo.expect_create_account()
            .returning(|_, _, _| Err(AppError::Conflict("endpoint 42 is already provisioned".into())));

        let provisioner = SipProvisioner::new(Arc::new(repo), 5);
        let err = provisioner.provision("42", "secret").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn credentials_retry_transient_failures() {
        let mut repo = MockTelephonyRepository::new();
        let mut calls = 0;
        repo.expect_fetch_credentials().returning_st(move |_| {
            calls += 1;
            if calls < 3 {
                Err(AppError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(SipCredentials {
                    username: "42".into(),
                    password: "secret".into(),
                })
            }
        });

        let provisioner = SipProvisioner::new(Arc::new(repo), 5);
        let creds = provisioner.credentials("42").await.unwrap();
        assert_eq!(creds.username, "42");
    }

    #[tokio::test]
    async fn missing_account_is_not_retried() {
        let mut repo = MockTelephonyRepository::new();
        repo.expect_fetch_credentials()
            .times(1)
            .returning(|id| Err(AppError::NotFound(format!("sip account {} not found", id))));

        let provisioner = SipProvisioner::new(Arc::new(repo), 5);
        let err = provisioner.credentials("42").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataProcess);
    }
}
