//! Group Router
//!
//! Translates chat scopes into group tags and gates membership changes
//! behind the authorization collaborator. Joins fail closed: on any
//! authorization or system error the membership index is left untouched
//! and the caller must not assume delivery. Leaves are unconditional and
//! never fail.

use std::sync::Arc;

use uuid::Uuid;

use super::gateway::Gateway;
use crate::domain::repositories::ScopeAuthorizer;
use crate::domain::scope::ChatScope;
use crate::shared::error::AppError;

pub struct GroupRouter {
    gateway: Arc<Gateway>,
    authorizer: Arc<dyn ScopeAuthorizer>,
}

impl GroupRouter {
    pub fn new(gateway: Arc<Gateway>, authorizer: Arc<dyn ScopeAuthorizer>) -> Self {
        Self { gateway, authorizer }
    }

    /// The group tag for a scope. Pure string construction.
    pub fn resolve_group(scope: ChatScope) -> String {
        scope.group_tag()
    }

    /// Authorize `user_id` for `scope`, then record the membership.
    ///
    /// The authorization check may suspend on database I/O; no gateway
    /// lock is held while it runs.
    pub async fn join(
        &self,
        connection_id: Uuid,
        user_id: i64,
        scope: ChatScope,
    ) -> Result<String, AppError> {
        self.authorizer.authorize(user_id, scope).await.map_err(|e| {
            tracing::info!(
                user_id,
                scope = %scope,
                severity = ?e.severity(),
                error = %e,
                "Join refused"
            );
            e
        })?;

        let group_tag = Self::resolve_group(scope);
        self.gateway.join_group(connection_id, &group_tag);
        tracing::debug!(user_id, group = %group_tag, %connection_id, "Joined group");
        Ok(group_tag)
    }

    /// Remove the membership entry. Unconditional, never fails.
    pub fn leave(&self, connection_id: Uuid, group_tag: &str) {
        self.gateway.leave_group(connection_id, group_tag);
        tracing::debug!(group = group_tag, %connection_id, "Left group");
    }

    /// Re-establish membership after a transport drop.
    ///
    /// Each previously held tag is re-authorized and rejoined; tags that
    /// fail authorization or no longer parse are skipped. Returns the
    /// recovered group set, deduplicated by the membership index.
    pub async fn rejoin(
        &self,
        connection_id: Uuid,
        user_id: i64,
        previous_groups: &[String],
    ) -> Vec<String> {
        let mut recovered = Vec::with_capacity(previous_groups.len());
        for tag in previous_groups {
            let Some(scope) = ChatScope::parse_tag(tag) else {
                tracing::warn!(user_id, tag = %tag, "Unparseable group tag in resume, skipped");
                continue;
            };
            match self.join(connection_id, user_id, scope).await {
                Ok(group_tag) => recovered.push(group_tag),
                Err(e) => {
                    tracing::warn!(user_id, tag = %tag, error = %e, "Group not recovered on resume");
                }
            }
        }
        recovered
    }
}
