//! End-to-end call signaling tests through the gateway-mediated transport.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use signal_gateway::domain::call::{CallDirection, CallState};
use signal_gateway::presentation::websocket::{CallRegistry, Gateway};
use signal_gateway::shared::error::ErrorKind;

use crate::common::TestClient;

const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(60);

fn registry() -> (Arc<Gateway>, Arc<CallRegistry>) {
    let gateway = Arc::new(Gateway::new());
    let registry = CallRegistry::new(gateway.clone(), NEGOTIATION_TIMEOUT);
    (gateway, registry)
}

#[tokio::test]
async fn dialing_an_offline_user_fails_the_session() {
    let (gateway, registry) = registry();
    let _alice = TestClient::connect(&gateway, 1);

    let alice_bridge = registry.bridge_for(1);
    let err = alice_bridge.dial(2).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DataProcess);
    assert!(alice_bridge.active_session().is_none());
}

#[tokio::test]
async fn dial_and_answer_confirm_both_sides() {
    let (gateway, registry) = registry();
    let _alice = TestClient::connect(&gateway, 1);
    let _bob = TestClient::connect(&gateway, 2);

    let alice_bridge = registry.bridge_for(1);
    let outgoing = alice_bridge.dial(2).await.unwrap();
    assert_eq!(outgoing.state(), CallState::Connecting);
    assert_eq!(outgoing.direction, CallDirection::Outgoing);

    // The dial surfaced as an incoming session on Bob's bridge, sharing
    // the same call id.
    let bob_bridge = registry.bridge_for(2);
    let incoming = bob_bridge.incoming_session().unwrap();
    assert_eq!(incoming.id, outgoing.id);
    assert_eq!(incoming.direction, CallDirection::Incoming);
    assert_eq!(incoming.remote_id, 1);

    bob_bridge.answer().await.unwrap();

    assert_eq!(incoming.state(), CallState::Confirmed);
    assert_eq!(outgoing.state(), CallState::Confirmed);
    assert_eq!(bob_bridge.active_session().unwrap().id, incoming.id);
}

#[tokio::test]
async fn reject_fails_the_caller_and_clears_the_callee() {
    let (gateway, registry) = registry();
    let _alice = TestClient::connect(&gateway, 1);
    let _bob = TestClient::connect(&gateway, 2);

    let alice_bridge = registry.bridge_for(1);
    let outgoing = alice_bridge.dial(2).await.unwrap();

    let bob_bridge = registry.bridge_for(2);
    bob_bridge.reject().await.unwrap();

    assert_eq!(outgoing.state(), CallState::Failed);
    assert!(alice_bridge.active_session().is_none());
    assert!(bob_bridge.incoming_session().is_none());
}

#[tokio::test]
async fn hangup_ends_the_call_on_both_sides() {
    let (gateway, registry) = registry();
    let _alice = TestClient::connect(&gateway, 1);
    let _bob = TestClient::connect(&gateway, 2);

    let alice_bridge = registry.bridge_for(1);
    let outgoing = alice_bridge.dial(2).await.unwrap();
    let bob_bridge = registry.bridge_for(2);
    let incoming = bob_bridge.incoming_session().unwrap();
    bob_bridge.answer().await.unwrap();

    alice_bridge.hangup().await.unwrap();

    assert_eq!(outgoing.state(), CallState::Ended);
    assert_eq!(incoming.state(), CallState::Ended);
    assert!(alice_bridge.active_session().is_none());
    assert!(bob_bridge.active_session().is_none());
}

#[tokio::test]
async fn busy_callee_refuses_a_second_caller() {
    let (gateway, registry) = registry();
    let _alice = TestClient::connect(&gateway, 1);
    let _bob = TestClient::connect(&gateway, 2);
    let _carol = TestClient::connect(&gateway, 3);

    let carol_bridge = registry.bridge_for(3);
    let first = carol_bridge.dial(2).await.unwrap();

    let alice_bridge = registry.bridge_for(1);
    let err = alice_bridge.dial(2).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(alice_bridge.active_session().is_none());
    // Carol's negotiation is untouched by the refused second call.
    assert_eq!(first.state(), CallState::Connecting);
    let bob_bridge = registry.bridge_for(2);
    assert_eq!(bob_bridge.incoming_session().unwrap().id, first.id);
}

#[tokio::test]
async fn shutdown_terminates_in_flight_negotiations() {
    let (gateway, registry) = registry();
    let _alice = TestClient::connect(&gateway, 1);
    let _bob = TestClient::connect(&gateway, 2);

    let alice_bridge = registry.bridge_for(1);
    let outgoing = alice_bridge.dial(2).await.unwrap();
    let bob_bridge = registry.bridge_for(2);
    let incoming = bob_bridge.incoming_session().unwrap();

    // Bob's last connection drops before he answers.
    registry.shutdown_user(2).await;

    assert!(incoming.state().is_terminal());
    assert_eq!(outgoing.state(), CallState::Failed);
}
