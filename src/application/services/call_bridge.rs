//! Call Signaling Bridge
//!
//! Tracks one user's telephony negotiations as small state machines. A
//! bridge owns two independent slots: at most one incoming session that has
//! not been answered yet, and at most one active session. A new incoming
//! call can therefore arrive while another call is in progress.
//!
//! Transitions into `Ended`/`Failed` are compare-and-set: the first
//! terminal transition wins and every later event for that session is
//! discarded, so a stray `confirmed` racing a local hangup can never
//! resurrect a terminated session. Reaching a terminal state releases the
//! session's slot.
//!
//! Signaling intents (dial/answer/reject/hangup) go out through the
//! [`CallTransport`] trait; updates from the remote side come back through
//! [`CallBridge::on_transport_event`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::call::{CallDirection, CallEvent, CallState, TransportUpdate};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Outbound signaling leg toward the remote party.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Open a new negotiation toward `remote_id`.
    async fn dial(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError>;
    /// Accept the incoming negotiation `call_id`.
    async fn answer(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError>;
    /// Decline the incoming negotiation `call_id`.
    async fn reject(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError>;
    /// Terminate the negotiation or call `call_id`.
    async fn hangup(&self, call_id: Uuid, remote_id: i64) -> Result<(), AppError>;
}

// CallState encoded into an atomic for lock-free compare-and-set.
const STATE_CONNECTING: u8 = 0;
const STATE_PROGRESS: u8 = 1;
const STATE_CONFIRMED: u8 = 2;
const STATE_ENDED: u8 = 3;
const STATE_FAILED: u8 = 4;

fn encode(state: CallState) -> u8 {
    match state {
        CallState::Connecting => STATE_CONNECTING,
        CallState::Progress => STATE_PROGRESS,
        CallState::Confirmed => STATE_CONFIRMED,
        CallState::Ended => STATE_ENDED,
        CallState::Failed => STATE_FAILED,
    }
}

fn decode(raw: u8) -> CallState {
    match raw {
        STATE_CONNECTING => CallState::Connecting,
        STATE_PROGRESS => CallState::Progress,
        STATE_CONFIRMED => CallState::Confirmed,
        STATE_ENDED => CallState::Ended,
        _ => CallState::Failed,
    }
}

/// Whether `from -> to` is a legal state machine edge.
fn transition_allowed(from: CallState, to: CallState) -> bool {
    if from.is_terminal() {
        return false;
    }
    match to {
        // Provisional updates only while negotiating.
        CallState::Progress => from.is_pending(),
        CallState::Confirmed => from.is_pending(),
        CallState::Ended | CallState::Failed => true,
        CallState::Connecting => false,
    }
}

/// One telephony negotiation tracked by the bridge.
pub struct CallSession {
    pub id: Uuid,
    pub direction: CallDirection,
    pub remote_id: i64,
    state: AtomicU8,
    events: broadcast::Sender<CallEvent>,
}

impl CallSession {
    fn new(
        direction: CallDirection,
        remote_id: i64,
        events: broadcast::Sender<CallEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            direction,
            remote_id,
            state: AtomicU8::new(STATE_CONNECTING),
            events,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CallState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Subscribe to this session's lifecycle events.
    ///
    /// Events for a session are delivered FIFO; no ordering is guaranteed
    /// across sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Whether this session belongs to the direct conversation between
    /// `participant_a` and `participant_b`.
    ///
    /// A call notification is attached to a chat context only when the
    /// remote party is one of the conversation's two participants.
    pub fn is_relevant_to(&self, participant_a: i64, participant_b: i64) -> bool {
        self.remote_id == participant_a || self.remote_id == participant_b
    }

    /// Compare-and-set transition. Returns false when the edge is illegal
    /// or another transition (in particular a terminal one) won the race.
    fn try_transition(&self, to: CallState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if !transition_allowed(decode(current), to) {
                return false;
            }
            match self.state.compare_exchange(
                current,
                encode(to),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    fn emit(&self, event: CallEvent) {
        // No receivers is fine; the stream is observational.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("remote_id", &self.remote_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Per-user signaling bridge with an incoming and an active slot.
pub struct CallBridge {
    user_id: i64,
    transport: Arc<dyn CallTransport>,
    incoming: Mutex<Option<Arc<CallSession>>>,
    active: Mutex<Option<Arc<CallSession>>>,
    events: broadcast::Sender<CallEvent>,
    negotiation_timeout: Duration,
}

impl CallBridge {
    pub fn new(
        user_id: i64,
        transport: Arc<dyn CallTransport>,
        negotiation_timeout: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            user_id,
            transport,
            incoming: Mutex::new(None),
            active: Mutex::new(None),
            events,
            negotiation_timeout,
        })
    }

    /// Subscribe to lifecycle events of every session on this bridge.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// The session currently occupying the incoming slot, if any.
    pub fn incoming_session(&self) -> Option<Arc<CallSession>> {
        self.incoming.lock().clone()
    }

    /// The session currently occupying the active slot, if any.
    pub fn active_session(&self) -> Option<Arc<CallSession>> {
        self.active.lock().clone()
    }

    /// Place an outgoing call to `remote_id`.
    ///
    /// Occupies the active slot; dialing while another call is active is a
    /// conflict.
    pub async fn dial(self: &Arc<Self>, remote_id: i64) -> Result<Arc<CallSession>, AppError> {
        let session = CallSession::new(CallDirection::Outgoing, remote_id, self.events.clone());
        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|s| !s.state().is_terminal()) {
                return Err(AppError::Conflict("another call is already active".into()));
            }
            *active = Some(session.clone());
        }

        metrics::CALL_SESSIONS_ACTIVE
            .with_label_values(&["outgoing"])
            .inc();
        tracing::info!(
            user_id = self.user_id,
            call_id = %session.id,
            remote_id,
            "Dialing"
        );
        session.emit(CallEvent::Connecting {
            call_id: session.id,
            remote_id,
        });
        self.arm_negotiation_timeout(&session);

        if let Err(e) = self.transport.dial(session.id, remote_id).await {
            self.fail_session(&session, format!("dial failed: {}", e));
            return Err(e);
        }

        Ok(session)
    }

    /// Attach a new session announced by the transport layer.
    ///
    /// Incoming sessions occupy the incoming slot; a second unanswered
    /// incoming call is refused busy. Outgoing announcements (a dial placed
    /// on another device of the same user) occupy the active slot.
    pub async fn on_new_session(
        self: &Arc<Self>,
        direction: CallDirection,
        remote_id: i64,
        call_id: Uuid,
    ) -> Result<Arc<CallSession>, AppError> {
        let session = Arc::new(CallSession {
            id: call_id,
            direction,
            remote_id,
            state: AtomicU8::new(STATE_CONNECTING),
            events: self.events.clone(),
        });

        let slot = match direction {
            CallDirection::Incoming => &self.incoming,
            CallDirection::Outgoing => &self.active,
        };
        // Decide under the lock, signal outside it. The reject leg may
        // re-enter this bridge, so the guard must be gone before it runs.
        let busy = {
            let mut guard = slot.lock();
            if guard.as_ref().is_some_and(|s| !s.state().is_terminal()) {
                true
            } else {
                *guard = Some(session.clone());
                false
            }
        };
        if busy {
            // Refuse the new negotiation, keep the existing one.
            if direction == CallDirection::Incoming {
                let _ = self.transport.reject(call_id, remote_id).await;
            }
            return Err(AppError::Conflict("call slot is occupied".into()));
        }

        metrics::CALL_SESSIONS_ACTIVE
            .with_label_values(&[direction_label(direction)])
            .inc();
        tracing::info!(
            user_id = self.user_id,
            call_id = %session.id,
            remote_id,
            direction = ?direction,
            "New call session"
        );
        session.emit(CallEvent::Connecting {
            call_id: session.id,
            remote_id,
        });
        self.arm_negotiation_timeout(&session);

        Ok(session)
    }

    /// Answer the pending incoming call.
    ///
    /// No-op when the incoming slot is empty or already terminal.
    pub async fn answer(self: &Arc<Self>) -> Result<(), AppError> {
        let session = match self.incoming_session() {
            Some(s) if !s.state().is_terminal() => s,
            _ => return Ok(()),
        };

        if self
            .active_session()
            .is_some_and(|s| !s.state().is_terminal())
        {
            return Err(AppError::Conflict("another call is already active".into()));
        }

        self.transport.answer(session.id, session.remote_id).await?;

        if session.try_transition(CallState::Confirmed) {
            session.emit(CallEvent::Confirmed {
                call_id: session.id,
            });
            // Promote from the incoming slot to the active slot.
            *self.incoming.lock() = None;
            *self.active.lock() = Some(session.clone());
            tracing::info!(
                user_id = self.user_id,
                call_id = %session.id,
                "Call answered"
            );
        }
        Ok(())
    }

    /// Decline the pending incoming call. User cancellation point: the slot
    /// clears immediately regardless of what the transport later reports.
    pub async fn reject(self: &Arc<Self>) -> Result<(), AppError> {
        let session = match self.incoming_session() {
            Some(s) if !s.state().is_terminal() => s,
            _ => return Ok(()),
        };

        self.fail_session(&session, "call rejected".into());
        // Best effort: local termination already happened.
        if let Err(e) = self.transport.reject(session.id, session.remote_id).await {
            tracing::warn!(call_id = %session.id, error = %e, "reject leg failed");
        }
        Ok(())
    }

    /// Terminate the active (or still-dialing) call. User cancellation
    /// point, idempotent on terminal sessions.
    pub async fn hangup(self: &Arc<Self>) -> Result<(), AppError> {
        let session = match self.active_session() {
            Some(s) if !s.state().is_terminal() => s,
            _ => return Ok(()),
        };

        if session.try_transition(CallState::Ended) {
            session.emit(CallEvent::Ended {
                call_id: session.id,
            });
            self.release(&session);
            tracing::info!(
                user_id = self.user_id,
                call_id = %session.id,
                "Call hung up"
            );
        }
        if let Err(e) = self.transport.hangup(session.id, session.remote_id).await {
            tracing::warn!(call_id = %session.id, error = %e, "hangup leg failed");
        }
        Ok(())
    }

    /// Apply a signaling update from the transport layer.
    ///
    /// Updates for unknown or already-terminated sessions are discarded.
    pub fn on_transport_event(self: &Arc<Self>, call_id: Uuid, update: TransportUpdate) {
        let Some(session) = self.find_session(call_id) else {
            tracing::debug!(%call_id, ?update, "update for unknown session discarded");
            return;
        };

        match update {
            TransportUpdate::Progress => {
                if session.try_transition(CallState::Progress) {
                    session.emit(CallEvent::Progress { call_id });
                }
            }
            TransportUpdate::Confirmed => {
                if session.try_transition(CallState::Confirmed) {
                    session.emit(CallEvent::Confirmed { call_id });
                }
            }
            TransportUpdate::Failed { reason } => {
                self.fail_session(&session, reason);
            }
            TransportUpdate::Ended => {
                if session.try_transition(CallState::Ended) {
                    session.emit(CallEvent::Ended { call_id });
                    self.release(&session);
                }
            }
        }
    }

    /// Look a session up in either slot.
    pub fn find_session(&self, call_id: Uuid) -> Option<Arc<CallSession>> {
        self.incoming_session()
            .filter(|s| s.id == call_id)
            .or_else(|| self.active_session().filter(|s| s.id == call_id))
    }

    /// Fail a session (first terminal transition wins) and release its slot.
    fn fail_session(self: &Arc<Self>, session: &Arc<CallSession>, reason: String) {
        if session.try_transition(CallState::Failed) {
            tracing::info!(
                user_id = self.user_id,
                call_id = %session.id,
                reason = %reason,
                "Call failed"
            );
            session.emit(CallEvent::Failed {
                call_id: session.id,
                reason,
            });
            self.release(session);
        }
    }

    /// Return a terminated session's slot to empty.
    fn release(self: &Arc<Self>, session: &Arc<CallSession>) {
        for slot in [&self.incoming, &self.active] {
            let mut guard = slot.lock();
            if guard.as_ref().is_some_and(|s| s.id == session.id) {
                *guard = None;
                metrics::CALL_SESSIONS_ACTIVE
                    .with_label_values(&[direction_label(session.direction)])
                    .dec();
            }
        }
    }

    /// Bound how long a session may sit in negotiation.
    fn arm_negotiation_timeout(self: &Arc<Self>, session: &Arc<CallSession>) {
        let bridge = Arc::downgrade(self);
        let session = session.clone();
        let timeout = self.negotiation_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if session.state().is_pending() {
                if let Some(bridge) = bridge.upgrade() {
                    bridge.fail_session(&session, "negotiation timed out".into());
                }
            }
        });
    }
}

fn direction_label(direction: CallDirection) -> &'static str {
    match direction {
        CallDirection::Incoming => "incoming",
        CallDirection::Outgoing => "outgoing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn permissive_transport() -> Arc<MockCallTransport> {
        let mut transport = MockCallTransport::new();
        transport.expect_dial().returning(|_, _| Ok(()));
        transport.expect_answer().returning(|_, _| Ok(()));
        transport.expect_reject().returning(|_, _| Ok(()));
        transport.expect_hangup().returning(|_, _| Ok(()));
        Arc::new(transport)
    }

    fn bridge(user_id: i64) -> Arc<CallBridge> {
        CallBridge::new(user_id, permissive_transport(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn dial_occupies_active_slot_in_connecting() {
        let bridge = bridge(1);
        let session = bridge.dial(2).await.unwrap();

        assert_eq!(session.state(), CallState::Connecting);
        assert_eq!(session.direction, CallDirection::Outgoing);
        assert_eq!(bridge.active_session().unwrap().id, session.id);
        assert!(bridge.incoming_session().is_none());
    }

    #[tokio::test]
    async fn second_dial_while_active_is_refused() {
        let bridge = bridge(1);
        bridge.dial(2).await.unwrap();
        let err = bridge.dial(3).await.unwrap_err();
        assert_eq!(err.kind(), crate::shared::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn confirmed_event_moves_outgoing_call_to_confirmed() {
        let bridge = bridge(1);
        let session = bridge.dial(2).await.unwrap();

        bridge.on_transport_event(session.id, TransportUpdate::Progress);
        assert_eq!(session.state(), CallState::Progress);

        bridge.on_transport_event(session.id, TransportUpdate::Confirmed);
        assert_eq!(session.state(), CallState::Confirmed);
    }

    #[tokio::test]
    async fn hangup_ends_call_and_releases_slot() {
        let bridge = bridge(1);
        let session = bridge.dial(2).await.unwrap();
        bridge.on_transport_event(session.id, TransportUpdate::Confirmed);

        bridge.hangup().await.unwrap();

        assert_eq!(session.state(), CallState::Ended);
        assert!(bridge.active_session().is_none());
    }

    #[tokio::test]
    async fn events_after_terminal_state_are_discarded() {
        let bridge = bridge(1);
        let session = bridge.dial(2).await.unwrap();

        bridge.hangup().await.unwrap();
        assert_eq!(session.state(), CallState::Ended);

        // A stray confirmed racing the hangup must not resurrect the call.
        bridge.on_transport_event(session.id, TransportUpdate::Confirmed);
        assert_eq!(session.state(), CallState::Ended);

        bridge.on_transport_event(
            session.id,
            TransportUpdate::Failed {
                reason: "late".into(),
            },
        );
        assert_eq!(session.state(), CallState::Ended);
    }

    #[tokio::test]
    async fn repeated_hangup_is_a_no_op() {
        let bridge = bridge(1);
        bridge.dial(2).await.unwrap();
        bridge.hangup().await.unwrap();
        bridge.hangup().await.unwrap();
        assert!(bridge.active_session().is_none());
    }

    #[tokio::test]
    async fn incoming_call_can_be_answered() {
        let bridge = bridge(2);
        let call_id = Uuid::new_v4();
        let session = bridge
            .on_new_session(CallDirection::Incoming, 1, call_id)
            .await
            .unwrap();
        assert_eq!(session.state(), CallState::Connecting);

        bridge.answer().await.unwrap();

        assert_eq!(session.state(), CallState::Confirmed);
        assert!(bridge.incoming_session().is_none());
        assert_eq!(bridge.active_session().unwrap().id, call_id);
    }

    #[tokio::test]
    async fn reject_fails_session_and_clears_incoming_slot() {
        let bridge = bridge(2);
        let session = bridge
            .on_new_session(CallDirection::Incoming, 1, Uuid::new_v4())
            .await
            .unwrap();

        bridge.reject().await.unwrap();

        assert_eq!(session.state(), CallState::Failed);
        assert!(bridge.incoming_session().is_none());
    }

    #[tokio::test]
    async fn second_incoming_call_is_refused_busy() {
        let bridge = bridge(2);
        bridge
            .on_new_session(CallDirection::Incoming, 1, Uuid::new_v4())
            .await
            .unwrap();
        let err = bridge
            .on_new_session(CallDirection::Incoming, 3, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::shared::error::ErrorKind::Validation);
    }

    /// Transport whose reject leg re-enters the bridge it belongs to,
    /// the way the gateway transport does for a self-directed call.
    struct ReentrantRejectTransport {
        bridge: Mutex<Option<std::sync::Weak<CallBridge>>>,
    }

    #[async_trait]
    impl CallTransport for ReentrantRejectTransport {
        async fn dial(&self, _call_id: Uuid, _remote_id: i64) -> Result<(), AppError> {
            Ok(())
        }
        async fn answer(&self, _call_id: Uuid, _remote_id: i64) -> Result<(), AppError> {
            Ok(())
        }
        async fn reject(&self, call_id: Uuid, _remote_id: i64) -> Result<(), AppError> {
            let bridge = self.bridge.lock().clone().and_then(|w| w.upgrade());
            if let Some(bridge) = bridge {
                bridge.on_transport_event(
                    call_id,
                    TransportUpdate::Failed {
                        reason: "rejected".into(),
                    },
                );
            }
            Ok(())
        }
        async fn hangup(&self, _call_id: Uuid, _remote_id: i64) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn busy_reject_leg_may_reenter_the_bridge() {
        let transport = Arc::new(ReentrantRejectTransport {
            bridge: Mutex::new(None),
        });
        let bridge = CallBridge::new(2, transport.clone(), Duration::from_secs(60));
        *transport.bridge.lock() = Some(Arc::downgrade(&bridge));

        let first = bridge
            .on_new_session(CallDirection::Incoming, 1, Uuid::new_v4())
            .await
            .unwrap();

        // The refusal's reject leg calls back into this same bridge; no
        // slot lock may still be held when it does.
        let err = bridge
            .on_new_session(CallDirection::Incoming, 3, Uuid::new_v4())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::shared::error::ErrorKind::Validation);
        assert_eq!(first.state(), CallState::Connecting);
        assert_eq!(bridge.incoming_session().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn incoming_call_can_arrive_while_another_is_active() {
        let bridge = bridge(1);
        let active = bridge.dial(2).await.unwrap();
        bridge.on_transport_event(active.id, TransportUpdate::Confirmed);

        let incoming = bridge
            .on_new_session(CallDirection::Incoming, 3, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(active.state(), CallState::Confirmed);
        assert_eq!(incoming.state(), CallState::Connecting);
        assert_eq!(bridge.incoming_session().unwrap().id, incoming.id);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_negotiation_times_out_to_failed() {
        let bridge = CallBridge::new(1, permissive_transport(), Duration::from_secs(60));
        let session = bridge.dial(2).await.unwrap();

        // Let the timeout task arm its timer before the clock jumps.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        // Let the timeout task run.
        tokio::task::yield_now().await;

        assert_eq!(session.state(), CallState::Failed);
        assert!(bridge.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_call_is_not_timed_out() {
        let bridge = CallBridge::new(1, permissive_transport(), Duration::from_secs(60));
        let session = bridge.dial(2).await.unwrap();
        bridge.on_transport_event(session.id, TransportUpdate::Confirmed);

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(session.state(), CallState::Confirmed);
    }

    #[tokio::test]
    async fn relevance_requires_remote_to_be_a_participant() {
        let bridge = bridge(1);
        let session = bridge.dial(2).await.unwrap();
        assert!(session.is_relevant_to(1, 2));
        assert!(session.is_relevant_to(2, 9));
        assert!(!session.is_relevant_to(7, 9));
    }

    #[tokio::test]
    async fn session_events_are_emitted_in_order() {
        let bridge = bridge(1);
        let mut events = bridge.subscribe();
        let session = bridge.dial(2).await.unwrap();
        bridge.on_transport_event(session.id, TransportUpdate::Progress);
        bridge.on_transport_event(session.id, TransportUpdate::Confirmed);
        bridge.hangup().await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            CallEvent::Connecting { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CallEvent::Progress { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CallEvent::Confirmed { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CallEvent::Ended { .. }
        ));
    }
}
