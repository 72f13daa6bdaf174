//! Gateway fan-out and group routing tests.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use signal_gateway::domain::scope::ChatScope;
use signal_gateway::presentation::websocket::{Gateway, GroupRouter};

use crate::common::{StubAuthorizer, TestClient};

#[tokio::test]
async fn broadcast_reaches_members_and_only_members() {
    let gateway = Arc::new(Gateway::new());
    let router = GroupRouter::new(gateway.clone(), StubAuthorizer::allow_all());

    let mut alice = TestClient::connect(&gateway, 1);
    let mut bob = TestClient::connect(&gateway, 2);
    let mut carol = TestClient::connect(&gateway, 3);

    let scope = ChatScope::Channel(42);
    router
        .join(alice.connection.id, 1, scope)
        .await
        .unwrap();
    router.join(bob.connection.id, 2, scope).await.unwrap();
    // Carol never joins.

    let delivered = gateway.broadcast("channel:42", "MESSAGE_CREATE", json!({"id": 7}));
    assert_eq!(delivered, 2);

    for client in [&mut alice, &mut bob] {
        let frames = client.dispatches("MESSAGE_CREATE");
        assert_eq!(frames.len(), 1);
        let d = frames[0].d.as_ref().unwrap();
        assert_eq!(d["signalGroup"], "channel:42");
        assert_eq!(d["content"], json!({"id": 7}));
    }
    assert!(carol.dispatches("MESSAGE_CREATE").is_empty());
}

#[tokio::test]
async fn denied_join_leaves_membership_untouched() {
    let gateway = Arc::new(Gateway::new());
    let authorizer = StubAuthorizer::allow_all().deny(2, ChatScope::Server(9));
    let router = GroupRouter::new(gateway.clone(), authorizer);

    let mut intruder = TestClient::connect(&gateway, 2);
    let err = router
        .join(intruder.connection.id, 2, ChatScope::Server(9))
        .await
        .unwrap_err();
    assert_eq!(
        err.kind(),
        signal_gateway::shared::error::ErrorKind::Validation
    );

    assert_eq!(gateway.group_size("server:9"), 0);
    gateway.broadcast("server:9", "SERVER_UPDATE", json!({}));
    assert!(intruder.dispatches("SERVER_UPDATE").is_empty());
}

#[tokio::test]
async fn duplicate_join_delivers_once() {
    let gateway = Arc::new(Gateway::new());
    let router = GroupRouter::new(gateway.clone(), StubAuthorizer::allow_all());

    let mut alice = TestClient::connect(&gateway, 1);
    let scope = ChatScope::PrivateGroup(5);
    router.join(alice.connection.id, 1, scope).await.unwrap();
    router.join(alice.connection.id, 1, scope).await.unwrap();

    assert_eq!(gateway.group_size("privateGroup:5"), 1);
    let delivered = gateway.broadcast("privateGroup:5", "MESSAGE_CREATE", json!({"id": 1}));
    assert_eq!(delivered, 1);
    assert_eq!(alice.dispatches("MESSAGE_CREATE").len(), 1);
}

#[tokio::test]
async fn unregister_removes_all_memberships_and_is_idempotent() {
    let gateway = Arc::new(Gateway::new());
    let router = GroupRouter::new(gateway.clone(), StubAuthorizer::allow_all());

    let alice = TestClient::connect(&gateway, 1);
    router
        .join(alice.connection.id, 1, ChatScope::Channel(1))
        .await
        .unwrap();
    router
        .join(alice.connection.id, 1, ChatScope::Direct(2))
        .await
        .unwrap();

    gateway.unregister(alice.connection.id);
    gateway.unregister(alice.connection.id);

    assert_eq!(gateway.connection_count(), 0);
    assert_eq!(gateway.group_size("channel:1"), 0);
    assert_eq!(gateway.group_size("dm:2"), 0);
    assert!(!gateway.is_user_online(1));
    assert_eq!(gateway.broadcast("channel:1", "MESSAGE_CREATE", json!({})), 0);
}

#[tokio::test]
async fn resume_recovers_only_still_authorized_groups() {
    let gateway = Arc::new(Gateway::new());
    let authorizer = StubAuthorizer::allow_all().deny(1, ChatScope::Server(9));
    let router = GroupRouter::new(gateway.clone(), authorizer);

    // Fresh connection after a transport drop; the client replays the
    // groups it held, one of which it has since lost access to.
    let alice = TestClient::connect(&gateway, 1);
    let previous = vec![
        "channel:42".to_string(),
        "server:9".to_string(),
        "not-a-tag".to_string(),
    ];

    let recovered = router.rejoin(alice.connection.id, 1, &previous).await;

    assert_eq!(recovered, vec!["channel:42".to_string()]);
    assert_eq!(gateway.group_size("channel:42"), 1);
    assert_eq!(gateway.group_size("server:9"), 0);
}

#[tokio::test]
async fn emptied_groups_leave_no_trace_in_the_index() {
    let gateway = Arc::new(Gateway::new());
    let router = GroupRouter::new(gateway.clone(), StubAuthorizer::allow_all());

    let alice = TestClient::connect(&gateway, 1);
    let bob = TestClient::connect(&gateway, 2);
    router
        .join(alice.connection.id, 1, ChatScope::Channel(1))
        .await
        .unwrap();
    router
        .join(bob.connection.id, 2, ChatScope::Channel(1))
        .await
        .unwrap();
    router
        .join(alice.connection.id, 1, ChatScope::Direct(2))
        .await
        .unwrap();
    assert_eq!(gateway.group_count(), 2);

    // Explicit leave empties one group, disconnect empties the other.
    router.leave(alice.connection.id, "channel:1");
    router.leave(bob.connection.id, "channel:1");
    gateway.unregister(alice.connection.id);

    assert_eq!(gateway.group_count(), 0);
}

#[tokio::test]
async fn every_device_of_a_user_receives_the_broadcast() {
    let gateway = Arc::new(Gateway::new());
    let router = GroupRouter::new(gateway.clone(), StubAuthorizer::allow_all());

    // Same user on two devices, both joined to the channel.
    let mut phone = TestClient::connect(&gateway, 1);
    let mut desktop = TestClient::connect(&gateway, 1);
    let scope = ChatScope::Channel(42);
    router.join(phone.connection.id, 1, scope).await.unwrap();
    router.join(desktop.connection.id, 1, scope).await.unwrap();

    let delivered = gateway.broadcast("channel:42", "MESSAGE_CREATE", json!({"id": 7}));

    assert_eq!(delivered, 2);
    assert_eq!(phone.dispatches("MESSAGE_CREATE").len(), 1);
    assert_eq!(desktop.dispatches("MESSAGE_CREATE").len(), 1);
}

#[tokio::test]
async fn broadcast_to_unknown_group_is_a_silent_no_op() {
    let gateway = Gateway::new();
    assert_eq!(gateway.broadcast("channel:404", "MESSAGE_CREATE", json!({})), 0);
}
