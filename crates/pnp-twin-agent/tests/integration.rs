use pnp_twin_core::{
    extract_version, ComponentRegistry, DocumentCursor, JsonReader, PropertyFilter, ResponseKind,
    TokenStream,
};
use pnp_twin_proto::{RequestKind, TopicScheme};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use uuid::Uuid;

fn parse_mqtt_url(url: &str) -> (String, u16) {
    let url = url
        .strip_prefix("tcp://")
        .or_else(|| url.strip_prefix("mqtt://"))
        .unwrap_or(url);

    let parts: Vec<&str> = url.split(':').collect();

    let host = parts.first().copied().unwrap_or("localhost").to_string();
    let port = parts.get(1).and_then(|p| p.parse().ok()).unwrap_or(1883);

    (host, port)
}

async fn spawn_eventloop(mut eventloop: EventLoop) {
    loop {
        if eventloop.poll().await.is_err() {
            break;
        }
    }
}

fn client(prefix: &str, host: &str, port: u16) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(format!("{prefix}-{}", Uuid::new_v4()), host, port);
    opts.set_keep_alive(Duration::from_secs(5));
    AsyncClient::new(opts, 10)
}

async fn first_publish(mut eventloop: EventLoop, tx: oneshot::Sender<(String, Vec<u8>)>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let _ = tx.send((publish.topic, publish.payload.to_vec()));
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

fn broker() -> Option<(String, u16)> {
    if std::env::var("PNP_TWIN_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set PNP_TWIN_INTEGRATION=1 to run");
        return None;
    }

    let broker = std::env::var("PNP_TWIN_MQTT_BROKER")
        .unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    Some(parse_mqtt_url(&broker))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn desired_patch_roundtrip() {
    let Some((host, port)) = broker() else {
        return;
    };

    // Brokers reserve `$` topics, so the test runs under its own prefix.
    let scheme = TopicScheme::new(format!("it-{}", Uuid::new_v4().simple()));

    let (sub_client, sub_eventloop) = client("sub", &host, port);
    sub_client
        .subscribe(scheme.desired_patch_filter(), QoS::AtLeastOnce)
        .await
        .unwrap();

    let (tx, rx) = oneshot::channel();
    tokio::spawn(first_publish(sub_eventloop, tx));

    let (pub_client, pub_eventloop) = client("pub", &host, port);
    tokio::spawn(spawn_eventloop(pub_eventloop));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let topic = format!(
        "{}/twin/PATCH/properties/desired/?$version=4",
        scheme.prefix
    );
    let payload = r#"{"thermostat1":{"__t":"c","targetTemperature":23},"$version":4}"#;
    pub_client
        .publish(&topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
        .await
        .unwrap();

    let (received_topic, received) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("timeout waiting for MQTT message")
        .expect("subscriber dropped");

    let descriptor = scheme.classify(&received_topic).unwrap().unwrap();
    assert_eq!(descriptor.kind, ResponseKind::DesiredPatch);
    assert_eq!(descriptor.version, Some(4));

    let mut versions = JsonReader::from_slice(&received).unwrap();
    versions.advance().unwrap();
    assert_eq!(extract_version(&mut versions, descriptor.kind).unwrap(), 4);

    let registry = ComponentRegistry::new(["thermostat1"]);
    let mut stream = JsonReader::from_slice(&received).unwrap();
    stream.advance().unwrap();
    let mut cursor = DocumentCursor::new(
        stream,
        &registry,
        descriptor.kind,
        PropertyFilter::WriteableOnly,
    )
    .unwrap();

    let property = cursor.next_property().unwrap().unwrap();
    assert_eq!(property.component.as_deref(), Some("thermostat1"));
    assert_eq!(property.name, "targetTemperature");
    assert_eq!(cursor.read_value().unwrap(), 23);
    assert!(cursor.next_property().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reported_patch_reaches_subscriber() {
    let Some((host, port)) = broker() else {
        return;
    };

    let scheme = TopicScheme::new(format!("it-{}", Uuid::new_v4().simple()));
    let topic = scheme.topic(RequestKind::ReportedPatch, "17").unwrap();

    let (sub_client, sub_eventloop) = client("sub", &host, port);
    sub_client
        .subscribe(format!("{}/twin/PATCH/#", scheme.prefix), QoS::AtLeastOnce)
        .await
        .unwrap();

    let (tx, rx) = oneshot::channel();
    tokio::spawn(first_publish(sub_eventloop, tx));

    let (pub_client, pub_eventloop) = client("pub", &host, port);
    tokio::spawn(spawn_eventloop(pub_eventloop));

    tokio::time::sleep(Duration::from_millis(200)).await;

    pub_client
        .publish(&topic, QoS::AtLeastOnce, false, br#"{"serialNumber":"A-1"}"#.to_vec())
        .await
        .unwrap();

    let (received_topic, received) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("timeout waiting for MQTT message")
        .expect("subscriber dropped");

    assert_eq!(received_topic, topic);
    assert_eq!(received, br#"{"serialNumber":"A-1"}"#);
}
