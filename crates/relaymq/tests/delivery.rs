mod common;

use common::{FlakyStore, ScriptedBroker, TIMEOUT};
use relaymq::packet::{
    PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket, SubAckPacket,
    UnsubAckPacket,
};
use relaymq::{
    MemoryPersistence, Message, MqttError, Packet, Persistence, QoS, ReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn expect_publish(packet: Packet) -> PublishPacket {
    match packet {
        Packet::Publish(publish) => publish,
        other => panic!("expected PUBLISH, got {other:?}"),
    }
}

#[tokio::test]
async fn test_qos1_publish_completes_on_puback() {
    let store = Arc::new(MemoryPersistence::new());
    let (client, _connector, mut rx) = common::client_with(
        "qos1",
        common::test_options(),
        Arc::clone(&store) as Arc<dyn Persistence>,
    )
    .await;
    let mut broker = common::connect(&client, &mut rx).await;

    let token = client
        .publish("sensors/roof/temp", "21.5", QoS::AtLeastOnce, false)
        .unwrap();
    let packet_id = token.message_id().unwrap();

    let publish = expect_publish(broker.recv().await);
    assert_eq!(publish.packet_id, Some(packet_id));
    assert_eq!(publish.qos, QoS::AtLeastOnce);
    assert!(!publish.dup);
    assert_eq!(&publish.payload[..], b"21.5");
    assert!(!token.is_complete());
    assert!(store
        .contains_key(&format!("sent-{packet_id}"))
        .await
        .unwrap());

    broker
        .send(Packet::PubAck(PubAckPacket::new(packet_id)))
        .await;
    let response = token.wait_timeout(TIMEOUT).await.unwrap();
    assert!(matches!(response, Some(Packet::PubAck(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_qos1_rejection_fails_token() {
    let (client, _connector, mut rx) = common::client("qos1-reject").await;
    let mut broker = common::connect(&client, &mut rx).await;

    let token = client.publish("a/b", "x", QoS::AtLeastOnce, false).unwrap();
    let publish = expect_publish(broker.recv().await);
    broker
        .send(Packet::PubAck(PubAckPacket::new_with_reason(
            publish.packet_id.unwrap(),
            ReasonCode::QuotaExceeded,
        )))
        .await;

    assert!(matches!(
        token.wait_timeout(TIMEOUT).await,
        Err(MqttError::PublishFailed(ReasonCode::QuotaExceeded))
    ));
}

#[tokio::test]
async fn test_qos2_publish_runs_full_exchange() {
    let store = Arc::new(MemoryPersistence::new());
    let (client, _connector, mut rx) = common::client_with(
        "qos2",
        common::test_options(),
        Arc::clone(&store) as Arc<dyn Persistence>,
    )
    .await;
    let mut broker = common::connect(&client, &mut rx).await;

    let token = client
        .publish("meters/17", "1234", QoS::ExactlyOnce, false)
        .unwrap();
    let publish = expect_publish(broker.recv().await);
    let packet_id = publish.packet_id.unwrap();
    assert_eq!(publish.qos, QoS::ExactlyOnce);

    broker
        .send(Packet::PubRec(PubRecPacket::new(packet_id)))
        .await;
    match broker.recv().await {
        Packet::PubRel(rel) => assert_eq!(rel.packet_id, packet_id),
        other => panic!("expected PUBREL, got {other:?}"),
    }
    assert!(!token.is_complete());
    assert!(store
        .contains_key(&format!("confirmed-{packet_id}"))
        .await
        .unwrap());

    broker
        .send(Packet::PubComp(PubCompPacket::new(packet_id)))
        .await;
    let response = token.wait_timeout(TIMEOUT).await.unwrap();
    assert!(matches!(response, Some(Packet::PubComp(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_qos0_publish_completes_once_written() {
    let (client, _connector, mut rx) = common::client("qos0").await;
    let mut broker = common::connect(&client, &mut rx).await;

    let token = client.publish("a/b", "x", QoS::AtMostOnce, false).unwrap();
    assert_eq!(token.message_id(), None);
    let publish = expect_publish(broker.recv().await);
    assert_eq!(publish.packet_id, None);
    assert!(token.wait_timeout(TIMEOUT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pubrel_resent_after_reconnect() {
    let options = common::test_options()
        .with_clean_start(false)
        .with_automatic_reconnect(true)
        .with_reconnect_delay(Duration::from_millis(10), Duration::from_millis(50));
    let (client, _connector, mut rx) =
        common::client_with("resume", options, Arc::new(MemoryPersistence::new())).await;
    let mut broker = common::connect(&client, &mut rx).await;

    let first = client.publish("a/1", "one", QoS::ExactlyOnce, false).unwrap();
    let second = client.publish("a/2", "two", QoS::AtLeastOnce, false).unwrap();
    let first_id = expect_publish(broker.recv().await).packet_id.unwrap();
    let second_id = expect_publish(broker.recv().await).packet_id.unwrap();

    broker.send(Packet::PubRec(PubRecPacket::new(first_id))).await;
    assert!(matches!(broker.recv().await, Packet::PubRel(_)));
    broker.drop_connection();

    let (mut broker, connect) = ScriptedBroker::accept_session(&mut rx, true).await;
    assert!(!connect.clean_start);

    // Queue order survives the PUBLISH to PUBREL replacement.
    match broker.recv().await {
        Packet::PubRel(rel) => assert_eq!(rel.packet_id, first_id),
        other => panic!("expected PUBREL, got {other:?}"),
    }
    let resent = expect_publish(broker.recv().await);
    assert_eq!(resent.packet_id, Some(second_id));
    assert!(resent.dup);

    broker.send(Packet::PubComp(PubCompPacket::new(first_id))).await;
    broker.send(Packet::PubAck(PubAckPacket::new(second_id))).await;
    assert!(first.wait_timeout(TIMEOUT).await.is_ok());
    assert!(second.wait_timeout(TIMEOUT).await.is_ok());
}

#[tokio::test]
async fn test_receive_maximum_limits_in_flight_publishes() {
    let (client, _connector, mut rx) = common::client("flow").await;
    let token = client.connect().unwrap();
    let mut broker = ScriptedBroker::accept(&mut rx).await;
    broker.expect_connect().await;
    let mut connack = relaymq::packet::ConnAckPacket::new(false, ReasonCode::Success);
    connack.properties.set_receive_maximum(1);
    broker.send(Packet::ConnAck(connack)).await;
    token.wait_timeout(TIMEOUT).await.unwrap();

    let first = client.publish("q/1", "1", QoS::AtLeastOnce, false).unwrap();
    let second = client.publish("q/2", "2", QoS::AtLeastOnce, false).unwrap();
    let sent = expect_publish(broker.recv().await);
    assert_eq!(sent.topic_name, "q/1");

    // The second publish is only written once the first slot frees up.
    broker
        .send(Packet::PubAck(PubAckPacket::new(sent.packet_id.unwrap())))
        .await;
    first.wait_timeout(TIMEOUT).await.unwrap();
    let sent = expect_publish(broker.recv().await);
    assert_eq!(sent.topic_name, "q/2");
    broker
        .send(Packet::PubAck(PubAckPacket::new(sent.packet_id.unwrap())))
        .await;
    second.wait_timeout(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_inbound_qos1_is_delivered_and_acknowledged() {
    let (client, _connector, mut rx) = common::client("inbound-qos1").await;
    let (tx, mut messages) = mpsc::unbounded_channel::<Message>();
    client.on_message(move |msg| {
        let _ = tx.send(msg);
    });
    let mut broker = common::connect(&client, &mut rx).await;

    broker
        .send(Packet::Publish(
            PublishPacket::new("cmd/reboot", b"now".to_vec(), QoS::AtLeastOnce).with_packet_id(9),
        ))
        .await;

    match broker.recv().await {
        Packet::PubAck(ack) => assert_eq!(ack.packet_id, 9),
        other => panic!("expected PUBACK, got {other:?}"),
    }
    let message = messages.recv().await.unwrap();
    assert_eq!(message.topic, "cmd/reboot");
    assert_eq!(&message.payload[..], b"now");
}

#[tokio::test]
async fn test_inbound_qos2_delivered_once() {
    let store = Arc::new(MemoryPersistence::new());
    let (client, _connector, mut rx) = common::client_with(
        "inbound-qos2",
        common::test_options(),
        Arc::clone(&store) as Arc<dyn Persistence>,
    )
    .await;
    let (tx, mut messages) = mpsc::unbounded_channel::<Message>();
    client.on_message(move |msg| {
        let _ = tx.send(msg);
    });
    let mut broker = common::connect(&client, &mut rx).await;

    let publish = PublishPacket::new("billing/events", b"e1".to_vec(), QoS::ExactlyOnce)
        .with_packet_id(7);
    broker.send(Packet::Publish(publish.clone())).await;
    match broker.recv().await {
        Packet::PubRec(rec) => assert_eq!(rec.packet_id, 7),
        other => panic!("expected PUBREC, got {other:?}"),
    }
    assert!(store.contains_key("received-7").await.unwrap());

    let mut duplicate = publish;
    duplicate.dup = true;
    broker.send(Packet::Publish(duplicate)).await;
    assert!(matches!(broker.recv().await, Packet::PubRec(_)));

    broker.send(Packet::PubRel(PubRelPacket::new(7))).await;
    match broker.recv().await {
        Packet::PubComp(comp) => {
            assert_eq!(comp.packet_id, 7);
            assert_eq!(comp.reason_code, ReasonCode::Success);
        }
        other => panic!("expected PUBCOMP, got {other:?}"),
    }

    assert_eq!(messages.recv().await.unwrap().topic, "billing/events");
    assert!(messages.try_recv().is_err());
    assert!(!store.contains_key("received-7").await.unwrap());
}

#[tokio::test]
async fn test_inbound_qos2_refused_when_receipt_cannot_be_stored() {
    let store = Arc::new(FlakyStore::new("received-", 1));
    let (client, _connector, mut rx) = common::client_with(
        "inbound-store-fault",
        common::test_options(),
        Arc::clone(&store) as Arc<dyn Persistence>,
    )
    .await;
    let (tx, mut messages) = mpsc::unbounded_channel::<Message>();
    client.on_message(move |msg| {
        let _ = tx.send(msg);
    });
    let mut broker = common::connect(&client, &mut rx).await;

    let publish =
        PublishPacket::new("billing/events", b"e9".to_vec(), QoS::ExactlyOnce).with_packet_id(9);
    broker.send(Packet::Publish(publish.clone())).await;
    match broker.recv().await {
        Packet::PubRec(rec) => {
            assert_eq!(rec.packet_id, 9);
            assert_eq!(rec.reason_code, ReasonCode::ImplementationSpecificError);
        }
        other => panic!("expected PUBREC, got {other:?}"),
    }
    assert!(messages.try_recv().is_err());
    assert!(store.records().is_empty());

    let mut retry = publish;
    retry.dup = true;
    broker.send(Packet::Publish(retry.clone())).await;
    match broker.recv().await {
        Packet::PubRec(rec) => assert_eq!(rec.reason_code, ReasonCode::Success),
        other => panic!("expected PUBREC, got {other:?}"),
    }
    broker.send(Packet::Publish(retry)).await;
    assert!(matches!(broker.recv().await, Packet::PubRec(_)));
    broker.send(Packet::PubRel(PubRelPacket::new(9))).await;
    assert!(matches!(broker.recv().await, Packet::PubComp(_)));

    assert_eq!(&messages.recv().await.unwrap().payload[..], b"e9");
    assert!(messages.try_recv().is_err());
}

#[tokio::test]
async fn test_pubrel_withheld_until_release_is_stored() {
    let store = Arc::new(FlakyStore::new("confirmed-", 1));
    let options = common::test_options()
        .with_clean_start(false)
        .with_automatic_reconnect(true)
        .with_reconnect_delay(Duration::from_millis(10), Duration::from_millis(50));
    let (client, _connector, mut rx) = common::client_with(
        "release-store-fault",
        options,
        Arc::clone(&store) as Arc<dyn Persistence>,
    )
    .await;
    let mut broker = common::connect(&client, &mut rx).await;

    let token = client.publish("a/1", "one", QoS::ExactlyOnce, false).unwrap();
    let packet_id = expect_publish(broker.recv().await).packet_id.unwrap();
    broker.send(Packet::PubRec(PubRecPacket::new(packet_id))).await;

    match broker.recv().await {
        Packet::Disconnect(disconnect) => {
            assert_eq!(disconnect.reason_code, ReasonCode::ImplementationSpecificError);
        }
        other => panic!("expected DISCONNECT, got {other:?}"),
    }
    assert!(broker.try_recv().await.is_none());
    let records = store.records();
    assert!(records
        .contains_key(&format!("sent-{packet_id}"))
        .await
        .unwrap());
    assert!(!records
        .contains_key(&format!("confirmed-{packet_id}"))
        .await
        .unwrap());
    assert!(!token.is_complete());

    // The flow resumes from the PUBLISH stage on the next connection.
    let (mut broker, _) = ScriptedBroker::accept_session(&mut rx, true).await;
    let resent = expect_publish(broker.recv().await);
    assert_eq!(resent.packet_id, Some(packet_id));
    assert!(resent.dup);
    broker.send(Packet::PubRec(PubRecPacket::new(packet_id))).await;
    match broker.recv().await {
        Packet::PubRel(rel) => assert_eq!(rel.packet_id, packet_id),
        other => panic!("expected PUBREL, got {other:?}"),
    }
    broker.send(Packet::PubComp(PubCompPacket::new(packet_id))).await;
    assert!(token.wait_timeout(TIMEOUT).await.is_ok());
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_subscribe_routes_to_listener() {
    let (client, _connector, mut rx) = common::client("listener").await;
    let (default_tx, mut default_messages) = mpsc::unbounded_channel::<Message>();
    client.on_message(move |msg| {
        let _ = default_tx.send(msg);
    });
    let mut broker = common::connect(&client, &mut rx).await;

    let (tx, mut listened) = mpsc::unbounded_channel::<Message>();
    let token = client
        .subscribe_with_listener("sensors/+/temp", QoS::AtLeastOnce, move |msg| {
            let _ = tx.send(msg);
        })
        .unwrap();
    let subscribe = match broker.recv().await {
        Packet::Subscribe(subscribe) => subscribe,
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };
    assert_eq!(subscribe.filters[0].filter, "sensors/+/temp");
    let subscription_id = subscribe.subscription_identifier().unwrap();

    broker
        .send(Packet::SubAck(SubAckPacket::new(
            subscribe.packet_id,
            vec![ReasonCode::GrantedQoS1],
        )))
        .await;
    assert!(matches!(
        token.wait_timeout(TIMEOUT).await.unwrap(),
        Some(Packet::SubAck(_))
    ));

    let mut matching = PublishPacket::new("sensors/roof/temp", b"20".to_vec(), QoS::AtMostOnce);
    matching
        .properties
        .add_subscription_identifier(subscription_id);
    broker.send(Packet::Publish(matching)).await;
    broker
        .send(Packet::Publish(PublishPacket::new(
            "alarms/door",
            b"open".to_vec(),
            QoS::AtMostOnce,
        )))
        .await;

    assert_eq!(listened.recv().await.unwrap().topic, "sensors/roof/temp");
    assert_eq!(default_messages.recv().await.unwrap().topic, "alarms/door");
}

#[tokio::test]
async fn test_subscription_fails_only_when_every_filter_is_rejected() {
    let (client, _connector, mut rx) = common::client("suback").await;
    let mut broker = common::connect(&client, &mut rx).await;

    let partial = client.subscribe("a/#", QoS::AtLeastOnce).unwrap();
    let Packet::Subscribe(subscribe) = broker.recv().await else {
        panic!("expected SUBSCRIBE");
    };
    broker
        .send(Packet::SubAck(SubAckPacket::new(
            subscribe.packet_id,
            vec![ReasonCode::GrantedQoS1],
        )))
        .await;
    assert!(partial.wait_timeout(TIMEOUT).await.is_ok());

    let rejected = client.subscribe("secret/#", QoS::AtLeastOnce).unwrap();
    let Packet::Subscribe(subscribe) = broker.recv().await else {
        panic!("expected SUBSCRIBE");
    };
    broker
        .send(Packet::SubAck(SubAckPacket::new(
            subscribe.packet_id,
            vec![ReasonCode::NotAuthorized],
        )))
        .await;
    assert!(matches!(
        rejected.wait_timeout(TIMEOUT).await,
        Err(MqttError::SubscriptionFailed(ReasonCode::NotAuthorized))
    ));

    let unsubscribe = client.unsubscribe("a/#").unwrap();
    let Packet::Unsubscribe(packet) = broker.recv().await else {
        panic!("expected UNSUBSCRIBE");
    };
    assert_eq!(packet.filters, vec!["a/#".to_string()]);
    broker
        .send(Packet::UnsubAck(UnsubAckPacket::new(
            packet.packet_id,
            vec![ReasonCode::Success],
        )))
        .await;
    assert!(unsubscribe.wait_timeout(TIMEOUT).await.is_ok());
}

#[tokio::test]
async fn test_unknown_topic_alias_drops_connection() {
    let (client, _connector, mut rx) = common::client("alias").await;
    let mut broker = common::connect(&client, &mut rx).await;

    let mut publish = PublishPacket::new("", b"x".to_vec(), QoS::AtMostOnce);
    publish.properties.set_topic_alias(3);
    broker.send(Packet::Publish(publish)).await;

    match broker.recv().await {
        Packet::Disconnect(disconnect) => {
            assert_eq!(disconnect.reason_code, ReasonCode::TopicAliasInvalid);
        }
        other => panic!("expected DISCONNECT, got {other:?}"),
    }
    assert!(broker.try_recv().await.is_none());
}
