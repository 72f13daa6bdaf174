//! Repository and Collaborator Traits
//!
//! Data-access contracts implemented by the infrastructure layer. The
//! gateway core depends only on these traits; tests substitute mocks.

use async_trait::async_trait;

use super::scope::ChatScope;
use super::telephony::{SipAccount, SipCredentials};
use crate::shared::error::AppError;

/// Authorization collaborator consulted before any group join.
///
/// The group router re-validates authorization on every join and rejoin;
/// it does not trust that the client only asks for scopes it already has
/// access to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScopeAuthorizer: Send + Sync {
    /// Check that `user_id` may subscribe to `scope`.
    ///
    /// Returns `Ok(())` when authorized, `AppError::Forbidden` when not,
    /// `AppError::NotFound` when the scope does not exist, and a system
    /// error when the check itself could not be performed. Callers must
    /// fail closed on every error.
    async fn authorize(&self, user_id: i64, scope: ChatScope) -> Result<(), AppError>;
}

/// Persistence contract for the three telephony tables.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelephonyRepository: Send + Sync {
    /// Create the AOR, auth, and endpoint rows for `endpoint_id` atomically.
    ///
    /// Either all three rows exist afterwards or none do. An already
    /// provisioned endpoint is reported as `AppError::Conflict`.
    async fn create_account(
        &self,
        endpoint_id: &str,
        password: &str,
        max_contacts: i32,
    ) -> Result<SipAccount, AppError>;

    /// Join the endpoint and auth rows into registration credentials.
    async fn fetch_credentials(&self, endpoint_id: &str) -> Result<SipCredentials, AppError>;
}
