//! Listener tests over real loopback sockets.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use voxwatch_core::{ListenerConfig, VoxError};
use voxwatch_ingest::{ListenerEvent, MessageDecoder, TelemetryListener, Transport};

fn loopback_config() -> ListenerConfig {
    ListenerConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..ListenerConfig::default()
    }
}

async fn next_event(rx: &mut mpsc::Receiver<ListenerEvent>) -> ListenerEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for listener event")
        .expect("listener channel closed")
}

async fn next_record(rx: &mut mpsc::Receiver<ListenerEvent>) -> (Transport, Vec<u8>) {
    loop {
        if let ListenerEvent::Record(record) = next_event(rx).await {
            return (record.transport, record.bytes);
        }
    }
}

#[tokio::test]
async fn test_stream_records_and_connection_events() {
    let (listener, mut rx) = TelemetryListener::bind(&loopback_config()).await.unwrap();

    let mut client = TcpStream::connect(listener.stream_addr()).await.unwrap();
    assert!(matches!(next_event(&mut rx).await, ListenerEvent::ClientConnected { .. }));
    assert_eq!(listener.active_connections(), 1);

    client
        .write_all(b"{\"component_id\":\"A1\",\"color\":\"red\",\"size\":12}\n")
        .await
        .unwrap();
    let (transport, bytes) = next_record(&mut rx).await;
    assert_eq!(transport, Transport::Stream);

    let mut decoder = MessageDecoder::new();
    let events = decoder.decode(&bytes);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entity_id, "A1");

    drop(client);
    assert!(matches!(next_event(&mut rx).await, ListenerEvent::ClientDisconnected { .. }));
    assert_eq!(listener.active_connections(), 0);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_bad_client_does_not_affect_others() {
    let (listener, mut rx) = TelemetryListener::bind(&loopback_config()).await.unwrap();

    let mut bad = TcpStream::connect(listener.stream_addr()).await.unwrap();
    let mut good = TcpStream::connect(listener.stream_addr()).await.unwrap();

    bad.write_all(b"garbage without newline").await.unwrap();
    drop(bad);

    good.write_all(b"{\"component_id\":\"B2\"}\n").await.unwrap();
    let (_, bytes) = next_record(&mut rx).await;
    assert_eq!(bytes, b"{\"component_id\":\"B2\"}".to_vec());

    listener.shutdown().await;
}

#[tokio::test]
async fn test_datagram_record() {
    let (listener, mut rx) = TelemetryListener::bind(&loopback_config()).await.unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"{\"component_id\":\"C3\",\"color\":\"#808080\",\"size\":0}", listener.datagram_addr())
        .await
        .unwrap();

    let (transport, bytes) = next_record(&mut rx).await;
    assert_eq!(transport, Transport::Datagram);
    assert!(bytes.starts_with(b"{\"component_id\":\"C3\""));

    listener.shutdown().await;
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let (first, _rx) = TelemetryListener::bind(&loopback_config()).await.unwrap();

    let taken = ListenerConfig {
        port: first.stream_addr().port(),
        ..loopback_config()
    };
    let err = match TelemetryListener::bind(&taken).await {
        Ok(_) => panic!("second bind on the same port should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, VoxError::ListenerBind { .. }));
    assert!(err.is_fatal());

    first.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let (listener, mut rx) = TelemetryListener::bind(&loopback_config()).await.unwrap();
    let _client = TcpStream::connect(listener.stream_addr()).await.unwrap();
    assert!(matches!(next_event(&mut rx).await, ListenerEvent::ClientConnected { .. }));

    timeout(Duration::from_secs(5), listener.shutdown())
        .await
        .expect("shutdown should not hang");
}
