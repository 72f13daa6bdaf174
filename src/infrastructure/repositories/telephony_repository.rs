//! Telephony Repository Implementation
//!
//! PostgreSQL implementation of the TelephonyRepository trait. The three
//! account rows (AOR, auth credential, endpoint definition) are written in
//! one transaction: either the whole account exists afterwards or none of
//! it does. A duplicate endpoint is detected inside the same transaction
//! and reported as a conflict, so callers can tell "already provisioned"
//! apart from a transient failure.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::repositories::TelephonyRepository;
use crate::domain::telephony::{SipAccount, SipCredentials, ALLOWED_CODEC, SIP_TRANSPORT};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Database row for the endpoint/auth credential join.
#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    username: String,
    password: String,
}

/// PostgreSQL telephony repository.
#[derive(Clone)]
pub struct PgTelephonyRepository {
    pool: PgPool,
}

impl PgTelephonyRepository {
    /// Create a new PgTelephonyRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Concurrent provisioning races are settled by the primary keys: the
/// loser's insert reports a unique violation, which is the same conflict
/// as an already provisioned endpoint.
fn map_insert_error(error: sqlx::Error, endpoint_id: &str) -> AppError {
    if let sqlx::Error::Database(db) = &error {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return AppError::Conflict(format!(
                "endpoint {} is already provisioned",
                endpoint_id
            ));
        }
    }
    AppError::Database(error)
}

#[async_trait]
impl TelephonyRepository for PgTelephonyRepository {
    async fn create_account(
        &self,
        endpoint_id: &str,
        password: &str,
        max_contacts: i32,
    ) -> Result<SipAccount, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar(r#"SELECT id FROM sip_endpoints WHERE id = $1 FOR UPDATE"#)
                .bind(endpoint_id)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "endpoint {} is already provisioned",
                endpoint_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO sip_aors (id, max_contacts, support_path)
            VALUES ($1, $2, TRUE)
            "#,
        )
        .bind(endpoint_id)
        .bind(max_contacts)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, endpoint_id))?;

        sqlx::query(
            r#"
            INSERT INTO sip_auths (id, username, password)
            VALUES ($1, $1, $2)
            "#,
        )
        .bind(endpoint_id)
        .bind(password)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, endpoint_id))?;

        sqlx::query(
            r#"
            INSERT INTO sip_endpoints (id, transport, allow_codec, aor_id, auth_id)
            VALUES ($1, $2, $3, $1, $1)
            "#,
        )
        .bind(endpoint_id)
        .bind(SIP_TRANSPORT)
        .bind(ALLOWED_CODEC)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, endpoint_id))?;

        tx.commit().await?;

        Ok(SipAccount {
            endpoint_id: endpoint_id.to_string(),
            username: endpoint_id.to_string(),
            password: password.to_string(),
            aor: endpoint_id.to_string(),
            max_contacts,
        })
    }

    async fn fetch_credentials(&self, endpoint_id: &str) -> Result<SipCredentials, AppError> {
        let timer = metrics::DB_QUERY_DURATION_SECONDS
            .with_label_values(&["select", "sip_endpoints"])
            .start_timer();
        let row = sqlx::query_as::<_, CredentialsRow>(
            r#"
            SELECT a.username, a.password
            FROM sip_endpoints e
            JOIN sip_auths a ON a.id = e.auth_id
            WHERE e.id = $1
            "#,
        )
        .bind(endpoint_id)
        .fetch_optional(&self.pool)
        .await;
        timer.observe_duration();

        let row = row?
            .ok_or_else(|| AppError::NotFound(format!("sip account {} not found", endpoint_id)))?;

        Ok(SipCredentials {
            username: row.username,
            password: row.password,
        })
    }
}
