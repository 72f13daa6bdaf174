//! Common Test Utilities
//!
//! In-memory fakes and fixtures shared by the integration tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use signal_gateway::domain::repositories::ScopeAuthorizer;
use signal_gateway::domain::scope::ChatScope;
use signal_gateway::presentation::websocket::gateway::Connection;
use signal_gateway::presentation::websocket::messages::GatewaySend;
use signal_gateway::presentation::websocket::Gateway;
use signal_gateway::shared::error::AppError;

/// Authorizer backed by an explicit deny list; everything else passes.
#[derive(Default)]
pub struct StubAuthorizer {
    denied: Mutex<HashSet<(i64, String)>>,
}

impl StubAuthorizer {
    pub fn allow_all() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny(self: &Arc<Self>, user_id: i64, scope: ChatScope) -> Arc<Self> {
        self.denied.lock().insert((user_id, scope.group_tag()));
        self.clone()
    }
}

#[async_trait]
impl ScopeAuthorizer for StubAuthorizer {
    async fn authorize(&self, user_id: i64, scope: ChatScope) -> Result<(), AppError> {
        if self.denied.lock().contains(&(user_id, scope.group_tag())) {
            Err(AppError::Forbidden(format!(
                "user {} is not a member of {}",
                user_id, scope
            )))
        } else {
            Ok(())
        }
    }
}

/// A registered test connection and the receiving end of its frame queue.
pub struct TestClient {
    pub connection: Arc<Connection>,
    rx: mpsc::UnboundedReceiver<GatewaySend>,
}

impl TestClient {
    /// Register a connection for `user_id` on the gateway.
    pub fn connect(gateway: &Gateway, user_id: i64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = gateway.register(user_id, tx);
        Self { connection, rx }
    }

    /// Drain every frame queued so far.
    pub fn frames(&mut self) -> Vec<GatewaySend> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            out.push(frame);
        }
        out
    }

    /// Dispatch frames queued so far with event name `event`.
    pub fn dispatches(&mut self, event: &str) -> Vec<GatewaySend> {
        self.frames()
            .into_iter()
            .filter(|f| f.t.as_deref() == Some(event))
            .collect()
    }
}
