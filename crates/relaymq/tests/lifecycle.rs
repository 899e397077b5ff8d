mod common;

use common::{DuplexConnector, ScriptedBroker, TIMEOUT};
use relaymq::packet::{AuthPacket, ConnAckPacket, PubAckPacket};
use relaymq::{
    ConnectionEvent, ConnectionState, DisconnectReason, MemoryPersistence, MqttClient,
    MqttError, Packet, Properties, QoS, ReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn record_events(client: &MqttClient) -> mpsc::UnboundedReceiver<ConnectionEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_connection_event(move |event| {
        let _ = tx.send(event);
    });
    rx
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("no connection event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_connect_and_disconnect() {
    let (client, _connector, mut rx) = common::client("lifecycle").await;
    let mut events = record_events(&client);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let token = client.connect().unwrap();
    let (mut broker, connect) = ScriptedBroker::accept_session(&mut rx, false).await;
    assert_eq!(connect.client_id, "lifecycle");
    assert!(connect.clean_start);

    let connack = token.wait_timeout(TIMEOUT).await.unwrap();
    assert!(matches!(connack, Some(Packet::ConnAck(_))));
    assert!(client.is_connected());
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { reconnect: false, .. }
    ));

    let token = client.disconnect().unwrap();
    match broker.recv().await {
        Packet::Disconnect(disconnect) => assert_eq!(disconnect.reason_code, ReasonCode::Success),
        other => panic!("expected DISCONNECT, got {other:?}"),
    }
    assert!(token.wait_timeout(TIMEOUT).await.is_ok());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
}

#[tokio::test]
async fn test_refused_connack_fails_connect() {
    let options = common::test_options().with_server_uris([
        "tcp://primary.test:1883",
        "tcp://secondary.test:1883",
    ]);
    let (client, connector, mut rx) =
        common::client_with("refused", options, Arc::new(MemoryPersistence::new())).await;

    let token = client.connect().unwrap();
    let mut broker = ScriptedBroker::accept(&mut rx).await;
    broker.expect_connect().await;
    broker
        .send(Packet::ConnAck(ConnAckPacket::new(
            false,
            ReasonCode::NotAuthorized,
        )))
        .await;

    assert!(matches!(
        token.wait_timeout(TIMEOUT).await,
        Err(MqttError::ConnectionRefused(ReasonCode::NotAuthorized))
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    // A refusal is an answer; the secondary is not tried.
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_failover_to_next_server_uri() {
    let options = common::test_options().with_server_uris([
        "tcp://down-a.test:1883",
        "tcp://standby.test:1883",
    ]);
    let (client, connector, mut rx) =
        common::client_with("failover", options, Arc::new(MemoryPersistence::new())).await;
    let mut events = record_events(&client);

    let token = client.connect().unwrap();
    let (broker, _) = ScriptedBroker::accept_session(&mut rx, false).await;
    assert!(broker.uri.contains("standby.test"));
    token.wait_timeout(TIMEOUT).await.unwrap();

    assert_eq!(connector.attempts(), 2);
    match next_event(&mut events).await {
        ConnectionEvent::Connected { server_uri, .. } => {
            assert!(server_uri.contains("standby.test"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_fails_when_every_server_is_down() {
    let options =
        common::test_options().with_server_uris(["tcp://down-a.test", "tcp://down-b.test"]);
    let (client, connector, _rx) =
        common::client_with("unreachable", options, Arc::new(MemoryPersistence::new())).await;

    let token = client.connect().unwrap();
    assert!(matches!(
        token.wait_timeout(TIMEOUT).await,
        Err(MqttError::ConnectionError(_))
    ));
    assert_eq!(connector.attempts(), 2);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_succeeds_after_network_failure() {
    let (client, _connector, mut rx) = common::client("dropped").await;
    let broker = common::connect(&client, &mut rx).await;
    broker.drop_connection();

    let token = client.disconnect().unwrap();
    assert!(token.wait_timeout(TIMEOUT).await.is_ok());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_completes_when_write_fails() {
    let (client, connector, mut rx) = common::client("write-fault").await;
    let mut events = record_events(&client);
    let mut broker = common::connect(&client, &mut rx).await;
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { .. }
    ));

    connector.break_writes();
    let token = client.disconnect().unwrap();
    assert!(token.wait_timeout(TIMEOUT).await.unwrap().is_none());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert!(broker.try_recv().await.is_none());
}

#[tokio::test]
async fn test_disconnect_waits_for_outstanding_acks() {
    let (client, _connector, mut rx) = common::client("quiesce").await;
    let mut broker = common::connect(&client, &mut rx).await;

    let publish = client.publish("a/b", "x", QoS::AtLeastOnce, false).unwrap();
    let Packet::Publish(sent) = broker.recv().await else {
        panic!("expected PUBLISH");
    };

    let disconnect = client
        .disconnect_with(Duration::from_secs(5), ReasonCode::Success, Properties::new())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!disconnect.is_complete());
    assert_eq!(client.state(), ConnectionState::Disconnecting);

    broker
        .send(Packet::PubAck(PubAckPacket::new(sent.packet_id.unwrap())))
        .await;
    assert!(matches!(broker.recv().await, Packet::Disconnect(_)));
    assert!(publish.wait_timeout(TIMEOUT).await.is_ok());
    assert!(disconnect.wait_timeout(TIMEOUT).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_doubles() {
    let options = common::test_options()
        .with_automatic_reconnect(true)
        .with_reconnect_delay(Duration::from_secs(1), Duration::from_secs(8));
    let (client, connector, mut rx) =
        common::client_with("backoff", options, Arc::new(MemoryPersistence::new())).await;
    let mut events = record_events(&client);

    let broker = common::connect(&client, &mut rx).await;
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Connected { reconnect: false, .. })
    ));

    connector.refuse_next(2);
    broker.drop_connection();
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::ConnectionLost { .. })
    ));

    let mut scheduled = Vec::new();
    while scheduled.len() < 3 {
        match events.recv().await {
            Some(ConnectionEvent::ReconnectScheduled { attempt, delay }) => {
                scheduled.push((attempt, delay));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(
        scheduled,
        vec![
            (1, Duration::from_secs(1)),
            (2, Duration::from_secs(2)),
            (3, Duration::from_secs(4)),
        ]
    );

    let (_broker, _) = ScriptedBroker::accept_session(&mut rx, true).await;
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Connected {
            reconnect: true,
            session_present: true,
            ..
        })
    ));
    assert_eq!(connector.attempts(), 4);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_no_automatic_reconnect_before_first_connect() {
    let options = common::test_options().with_automatic_reconnect(true);
    let (client, connector, _rx) =
        common::client_with("first", options, Arc::new(MemoryPersistence::new())).await;
    let mut events = record_events(&client);
    connector.refuse_next(1);

    let token = client.connect().unwrap();
    assert!(token.wait_timeout(TIMEOUT).await.is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_timeout_drops_connection() {
    let options = common::test_options().with_keep_alive(Duration::from_secs(2));
    let (client, _connector, mut rx) =
        common::client_with("keepalive", options, Arc::new(MemoryPersistence::new())).await;
    let mut events = record_events(&client);
    let mut broker = common::connect(&client, &mut rx).await;
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Connected { .. })
    ));

    assert!(matches!(broker.recv().await, Packet::PingReq));
    broker.send(Packet::PingResp).await;
    assert!(matches!(broker.recv().await, Packet::PingReq));

    // Second ping left unanswered.
    assert_eq!(
        events.recv().await,
        Some(ConnectionEvent::ConnectionLost {
            reason: DisconnectReason::KeepAliveTimeout
        })
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_operations_rejected_in_wrong_state() {
    let (client, _connector, mut rx) = common::client("usage").await;

    assert!(matches!(
        client.publish("a/b", "x", QoS::AtLeastOnce, false),
        Err(MqttError::NotConnected)
    ));
    assert!(matches!(
        client.subscribe("a/#", QoS::AtMostOnce),
        Err(MqttError::NotConnected)
    ));

    let _broker = common::connect(&client, &mut rx).await;
    assert!(matches!(client.connect(), Err(MqttError::AlreadyConnected)));
    assert!(matches!(client.close(), Err(MqttError::InvalidState(_))));
    assert!(matches!(
        client.publish("a/+", "x", QoS::AtMostOnce, false),
        Err(MqttError::InvalidTopicName(_))
    ));

    client
        .disconnect_with(Duration::ZERO, ReasonCode::Success, Properties::new())
        .unwrap()
        .wait_timeout(TIMEOUT)
        .await
        .unwrap();
    client.close().unwrap().wait_timeout(TIMEOUT).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.close().unwrap().is_complete());
    assert!(matches!(client.connect(), Err(MqttError::ClientClosed)));
    assert!(matches!(
        client.publish("a/b", "x", QoS::AtMostOnce, false),
        Err(MqttError::ClientClosed)
    ));
}

#[tokio::test]
async fn test_empty_client_id_requires_clean_start() {
    let (connector, _rx) = DuplexConnector::new();
    let client = MqttClient::builder("tcp://broker.test:1883", "")
        .with_options(common::test_options().with_clean_start(false))
        .with_connector(connector)
        .build()
        .await
        .unwrap();

    assert!(matches!(
        client.connect(),
        Err(MqttError::InvalidClientId(_))
    ));
}

#[tokio::test]
async fn test_assigned_client_id_is_adopted() {
    let (client, _connector, mut rx) = common::client("").await;

    let token = client.connect().unwrap();
    let mut broker = ScriptedBroker::accept(&mut rx).await;
    assert_eq!(broker.expect_connect().await.client_id, "");
    let mut connack = ConnAckPacket::new(false, ReasonCode::Success);
    connack
        .properties
        .set_assigned_client_identifier("auto-4f2a");
    broker.send(Packet::ConnAck(connack)).await;
    token.wait_timeout(TIMEOUT).await.unwrap();

    assert_eq!(client.client_id(), "auto-4f2a");
}

#[tokio::test]
async fn test_manual_reconnect_after_connection_loss() {
    let (client, _connector, mut rx) = common::client("manual").await;
    let mut events = record_events(&client);
    let broker = common::connect(&client, &mut rx).await;
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { reconnect: false, .. }
    ));

    broker.drop_connection();
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::ConnectionLost { .. }
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.reconnect().unwrap();
    let (_broker, connect) = ScriptedBroker::accept_session(&mut rx, false).await;
    assert_eq!(connect.client_id, "manual");
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { reconnect: true, .. }
    ));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_reauthentication_completes_with_server_auth() {
    let (client, _connector, mut rx) = common::client("reauth").await;
    assert!(matches!(
        client.authenticate(ReasonCode::ReAuthenticate, Properties::new()),
        Err(MqttError::NotConnected)
    ));
    let mut broker = common::connect(&client, &mut rx).await;

    assert!(matches!(
        client.authenticate(ReasonCode::Success, Properties::new()),
        Err(MqttError::InvalidReasonCode(_))
    ));

    let mut properties = Properties::new();
    properties.set_authentication_method("SCRAM-SHA-256");
    let token = client
        .authenticate(ReasonCode::ReAuthenticate, properties)
        .unwrap();
    match broker.recv().await {
        Packet::Auth(auth) => {
            assert_eq!(auth.reason_code, ReasonCode::ReAuthenticate);
            assert_eq!(
                auth.properties.get_authentication_method(),
                Some("SCRAM-SHA-256")
            );
        }
        other => panic!("expected AUTH, got {other:?}"),
    }

    broker
        .send(Packet::Auth(AuthPacket::new(ReasonCode::Success)))
        .await;
    assert!(matches!(
        token.wait_timeout(TIMEOUT).await.unwrap(),
        Some(Packet::Auth(_))
    ));
}
