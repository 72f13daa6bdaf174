//! Gateway-Mediated Call Transport
//!
//! The production signaling leg between two users' call bridges. A dial on
//! one bridge becomes an incoming session on the remote user's bridge;
//! answer/reject/hangup intents become transport updates on the other
//! side. Each bridge's lifecycle events are forwarded to that user's live
//! connections by the socket handler.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::gateway::Gateway;
use crate::application::services::call_bridge::{CallBridge, CallTransport};
use crate::domain::call::{CallDirection, TransportUpdate};
use crate::shared::error::AppError;

/// Registry of per-user call bridges, created lazily on first use.
pub struct CallRegistry {
    bridges: DashMap<i64, Arc<CallBridge>>,
    gateway: Arc<Gateway>,
    negotiation_timeout: Duration,
}

impl CallRegistry {
    pub fn new(gateway: Arc<Gateway>, negotiation_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            bridges: DashMap::new(),
            gateway,
            negotiation_timeout,
        })
    }

    /// The bridge for `user_id`, creating it on first access.
    pub fn bridge_for(self: &Arc<Self>, user_id: i64) -> Arc<CallBridge> {
        self.bridges
            .entry(user_id)
            .or_insert_with(|| {
                let transport = Arc::new(GatewayCallTransport {
                    local_user: user_id,
                    registry: Arc::downgrade(self),
                });
                CallBridge::new(user_id, transport, self.negotiation_timeout)
            })
            .clone()
    }

    /// The bridge for `user_id` if one exists.
    pub fn existing_bridge(&self, user_id: i64) -> Option<Arc<CallBridge>> {
        self.bridges.get(&user_id).map(|b| b.clone())
    }

    /// Tear down a user's bridge when their last connection closes,
    /// terminating whatever negotiation was still in flight.
    pub async fn shutdown_user(&self, user_id: i64) {
        let Some((_, bridge)) = self.bridges.remove(&user_id) else {
            return;
        };
        if let Err(e) = bridge.reject().await {
            tracing::warn!(user_id, error = %e, "reject on shutdown failed");
        }
        if let Err(e) = bridge.hangup().await {
            tracing::warn!(user_id, error = %e, "hangup on shutdown failed");
        }
        tracing::debug!(user_id, "Call bridge shut down");
    }
}

/// `CallTransport` that mirrors signaling legs onto the remote user's
/// bridge through the registry.
struct GatewayCallTransport {
    local_user: i64,
    registry: Weak<CallRegistry>,
}

impl GatewayCallTransport {
    fn registry(&self) -> Result<Arc<CallRegistry>, AppError> {
        self.registry
            .upgrade()
            .ok_or_else(|| AppError::Internal("call registry has shut down".into()))
    }
}

#[async_trait]
impl CallTransport for GatewayCallTransport {
    async fn dial(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError> {
        let registry = self.registry()?;
        if !registry.gateway.is_user_online(remote_id) {
            return Err(AppError::NotFound(format!(
                "user {} is not connected",
                remote_id
            )));
        }
        let remote = registry.bridge_for(remote_id);
        remote
            .on_new_session(CallDirection::Incoming, self.local_user, call_id)
            .await?;
        Ok(())
    }

    async fn answer(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError> {
        let registry = self.registry()?;
        if let Some(remote) = registry.existing_bridge(remote_id) {
            remote.on_transport_event(call_id, TransportUpdate::Confirmed);
        }
        Ok(())
    }

    async fn reject(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError> {
        let registry = self.registry()?;
        if let Some(remote) = registry.existing_bridge(remote_id) {
            remote.on_transport_event(
                call_id,
                TransportUpdate::Failed {
                    reason: "call rejected".into(),
                },
            );
        }
        Ok(())
    }

    async fn hangup(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError> {
        let registry = self.registry()?;
        if let Some(remote) = registry.existing_bridge(remote_id) {
            remote.on_transport_event(call_id, TransportUpdate::Ended);
        }
        Ok(())
    }
}
