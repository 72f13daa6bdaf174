//! WebSocket Session State

use std::time::Instant;

/// Per-socket handshake and liveness state
#[derive(Debug)]
pub struct SessionState {
    pub user_id: i64,
    pub last_heartbeat: Instant,
    pub identified: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            user_id: 0,
            last_heartbeat: Instant::now(),
            identified: false,
        }
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn is_alive(&self, timeout_ms: u64) -> bool {
        self.last_heartbeat.elapsed().as_millis() < timeout_ms as u128
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
