//! Membership Authorization Queries
//!
//! PostgreSQL implementation of the ScopeAuthorizer trait. The membership
//! tables (server subscriptions, channel ownership, conversation
//! participants) belong to the platform API; this service reads them only
//! to gate group joins. Server-scope checks consult the roster cache first
//! and fall back to the table on a miss.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::repositories::ScopeAuthorizer;
use crate::domain::scope::ChatScope;
use crate::infrastructure::cache::RosterCache;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// PostgreSQL scope authorizer.
#[derive(Clone)]
pub struct PgScopeAuthorizer {
    pool: PgPool,
    roster: RosterCache,
}

impl PgScopeAuthorizer {
    pub fn new(pool: PgPool, roster: RosterCache) -> Self {
        Self { pool, roster }
    }

    /// Server-subscription check, cache first.
    async fn is_server_subscriber(&self, server_id: i64, user_id: i64) -> Result<bool, AppError> {
        match self.roster.is_subscriber(server_id, user_id).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            // A cache outage must not block authorization; fall through
            // to the membership table.
            Err(e) => tracing::warn!(server_id, error = %e, "roster cache unavailable"),
        }

        let timer = metrics::DB_QUERY_DURATION_SECONDS
            .with_label_values(&["select", "server_subscriptions"])
            .start_timer();
        let subscribers = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id FROM server_subscriptions
            WHERE server_id = $1
            "#,
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;
        timer.observe_duration();

        let is_member = subscribers.contains(&user_id);

        if let Err(e) = self.roster.set_subscribers(server_id, &subscribers).await {
            tracing::warn!(server_id, error = %e, "failed to refresh roster cache");
        }

        Ok(is_member)
    }

    /// A channel join requires subscription to the channel's owning server.
    async fn authorize_channel(&self, channel_id: i64, user_id: i64) -> Result<(), AppError> {
        let server_id: Option<i64> =
            sqlx::query_scalar(r#"SELECT server_id FROM channels WHERE id = $1"#)
                .bind(channel_id)
                .fetch_optional(&self.pool)
                .await?;

        let server_id = server_id
            .ok_or_else(|| AppError::NotFound(format!("channel {} not found", channel_id)))?;

        if self.is_server_subscriber(server_id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "user {} is not subscribed to the server owning channel {}",
                user_id, channel_id
            )))
        }
    }

    /// A conversation join requires being a participant.
    async fn authorize_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> Result<(), AppError> {
        let participant: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM conversation_participants
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if participant.is_some() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "user {} is not a participant of conversation {}",
                user_id, conversation_id
            )))
        }
    }
}

#[async_trait]
impl ScopeAuthorizer for PgScopeAuthorizer {
    async fn authorize(&self, user_id: i64, scope: ChatScope) -> Result<(), AppError> {
        match scope {
            ChatScope::Channel(channel_id) => self.authorize_channel(channel_id, user_id).await,
            ChatScope::Direct(conversation_id) | ChatScope::PrivateGroup(conversation_id) => {
                self.authorize_conversation(conversation_id, user_id).await
            }
            ChatScope::Server(server_id) => {
                if self.is_server_subscriber(server_id, user_id).await? {
                    Ok(())
                } else {
                    Err(AppError::Forbidden(format!(
                        "user {} is not subscribed to server {}",
                        user_id, server_id
                    )))
                }
            }
        }
    }
}
