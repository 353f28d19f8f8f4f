//! Integration tests for the reconnecting channel client
//!
//! These tests drive the client against the in-memory transport with the
//! tokio clock paused, so reconnect delays and heartbeat deadlines are exact.

use std::time::Duration;

use gong::channel::testing::{DialPolicy, MemoryConnector, MemoryServer, ServerConnection};
use gong::channel::{BackoffConfig, Client, ClientConfig, ConnectionState, Frame, Payload};
use gong::error::{ClientError, TransportError};
use tokio::sync::mpsc::error::TryRecvError;

const ENDPOINT: &str = "ws://localhost:4000/socket/websocket?vsn=1.0.0";

/// Defaults everywhere except jitter, which would make delays random
fn test_config(topics: &[&str]) -> ClientConfig {
    ClientConfig::new(ENDPOINT, topics.iter().map(|t| t.to_string()).collect()).with_backoff(
        BackoffConfig {
            min: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: false,
        },
    )
}

fn ack() -> Frame {
    Frame::new("phoenix", "heartbeat", Payload::empty(), "")
}

fn event(n: usize) -> Frame {
    Frame::new(
        "private:contracts",
        "resale_contract",
        Payload::from_json(format!(r#"{{"n":{}}}"#, n)).unwrap(),
        "",
    )
}

fn new_client(topics: &[&str]) -> (Client, MemoryConnector, MemoryServer) {
    let (connector, server) = MemoryConnector::new();
    let client = Client::new(test_config(topics), connector.clone()).unwrap();
    (client, connector, server)
}

/// Accept the next connection and consume its join frames
async fn accept_joined(server: &mut MemoryServer, topics: usize) -> (ServerConnection, Vec<Frame>) {
    let mut conn = server.accept().await.expect("client never dialed");
    let mut joins = Vec::new();
    for _ in 0..topics {
        joins.push(conn.recv().await.expect("join not sent"));
    }
    (conn, joins)
}

fn dial_gaps(connector: &MemoryConnector) -> Vec<Duration> {
    connector
        .attempts()
        .windows(2)
        .map(|w| w[1].1 - w[0].1)
        .collect()
}

/// Repeated refusals back off 100, 200, 400, 800 ms and then hold at the cap
#[tokio::test(start_paused = true)]
async fn test_backoff_between_refused_dials() {
    let (client, connector, mut server) = new_client(&["room:a"]);
    connector.set_policy(DialPolicy::RefuseAll);

    let _events = client.start().unwrap();
    tokio::time::sleep(Duration::from_millis(3_600)).await;

    let gaps = dial_gaps(&connector);
    let expected: Vec<Duration> = [100, 200, 400, 800, 1_000, 1_000]
        .into_iter()
        .map(Duration::from_millis)
        .collect();
    assert_eq!(gaps, expected);
    assert!(server.try_accept().is_none());
    assert_ne!(*client.state().borrow(), ConnectionState::Active);

    client.close().await;
    assert_eq!(*client.state().borrow(), ConnectionState::Closed);
}

/// Every dial goes to the configured endpoint, query string included
#[tokio::test(start_paused = true)]
async fn test_dials_configured_endpoint() {
    let (client, connector, mut server) = new_client(&["room:a"]);
    connector.set_policy(DialPolicy::RefuseNext(2));

    let _events = client.start().unwrap();
    let (_conn, joins) = accept_joined(&mut server, 1).await;

    assert_eq!(joins[0].event, "phx_join");
    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|(url, _)| url == ENDPOINT));

    client.close().await;
}

/// A joined session resets the backoff, so the next failure waits the minimum again
#[tokio::test(start_paused = true)]
async fn test_backoff_resets_after_join() {
    let (client, connector, mut server) = new_client(&["room:a"]);
    connector.set_policy(DialPolicy::RefuseNext(3));

    let _events = client.start().unwrap();
    let (conn, _) = accept_joined(&mut server, 1).await;
    conn.fail_read(TransportError::Receive("connection reset".into()));

    let (_conn, _) = accept_joined(&mut server, 1).await;
    let gaps = dial_gaps(&connector);
    assert_eq!(gaps[..3], [100, 200, 400].map(Duration::from_millis));
    assert_eq!(gaps[3], Duration::from_millis(100));

    client.close().await;
}

/// Without acknowledgments the session dies one timeout after it joined
#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_triggers_reconnect() {
    let (client, connector, mut server) = new_client(&["room:a"]);
    let _events = client.start().unwrap();

    let (_first, _) = accept_joined(&mut server, 1).await;
    let (_second, _) = accept_joined(&mut server, 1).await;

    assert_eq!(dial_gaps(&connector), vec![Duration::from_millis(60_100)]);
    client.close().await;
}

/// An acknowledgment at 50s pushes the deadline to 110s
#[tokio::test(start_paused = true)]
async fn test_ack_extends_heartbeat_deadline() {
    let (client, connector, mut server) = new_client(&["room:a"]);
    let _events = client.start().unwrap();

    let (first, _) = accept_joined(&mut server, 1).await;
    tokio::time::sleep(Duration::from_secs(50)).await;
    assert!(first.push(ack()));

    let (_second, _) = accept_joined(&mut server, 1).await;
    assert_eq!(dial_gaps(&connector), vec![Duration::from_millis(110_100)]);
    client.close().await;
}

/// A server that acknowledges every 25s keeps one connection alive indefinitely
#[tokio::test(start_paused = true)]
async fn test_steady_heartbeats_keep_connection() {
    let (client, connector, mut server) = new_client(&["private:contracts"]);
    let mut state = client.state();
    let _events = client.start().unwrap();

    let (mut conn, joins) = accept_joined(&mut server, 1).await;
    assert_eq!(joins[0].reference, "1");
    state
        .wait_for(|s| *s == ConnectionState::Active)
        .await
        .unwrap();

    for _ in 0..12 {
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(conn.push(ack()));
    }

    let mut heartbeats = Vec::new();
    while let Some(frame) = conn.try_recv() {
        assert_eq!(frame.topic, "phoenix");
        assert_eq!(frame.event, "heartbeat");
        heartbeats.push(frame.reference.parse::<i64>().unwrap());
    }

    assert!(heartbeats.len() >= 9, "only {} heartbeats", heartbeats.len());
    assert!(heartbeats.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(*client.state().borrow(), ConnectionState::Active);

    client.close().await;
}

/// A consumer that never reads loses events, not the connection
#[tokio::test(start_paused = true)]
async fn test_slow_consumer_drops_events() {
    let (client, connector, mut server) = new_client(&["private:contracts"]);
    let mut events = client.start().unwrap();

    let (mut conn, _) = accept_joined(&mut server, 1).await;
    for n in 0..10 {
        assert!(conn.push(event(n)));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.dropped_events(), 9);

    // Heartbeats keep flowing while the queue is full
    tokio::time::sleep(Duration::from_secs(30)).await;
    let heartbeat = conn.recv().await.unwrap();
    assert_eq!(heartbeat.event, "heartbeat");
    assert_eq!(connector.attempt_count(), 1);

    let retained = events.recv().await.unwrap();
    assert_eq!(retained.payload.as_str(), r#"{"n":0}"#);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    client.close().await;
}

/// Events are delivered in arrival order with payload bytes untouched
#[tokio::test]
async fn test_events_delivered_in_order() {
    let (connector, mut server) = MemoryConnector::new();
    let client = Client::new(test_config(&["room:a"]).with_event_buffer(16), connector).unwrap();
    let mut events = client.start().unwrap();

    let (conn, _) = accept_joined(&mut server, 1).await;
    conn.push(Frame::new(
        "room:a",
        "phx_reply",
        Payload::from_json(r#"{"status":"ok","response":{}}"#).unwrap(),
        "1",
    ));
    for n in 0..5 {
        conn.push(event(n));
    }

    for n in 0..5 {
        let frame = events.recv().await.unwrap();
        assert_eq!(frame.payload.as_str(), format!(r#"{{"n":{}}}"#, n));
    }
    assert_eq!(client.dropped_events(), 0);

    client.close().await;
}

/// Refs keep increasing across reconnects
#[tokio::test(start_paused = true)]
async fn test_read_failure_reconnects_with_fresh_refs() {
    let (client, connector, mut server) = new_client(&["room:a", "room:b"]);
    let _events = client.start().unwrap();

    let (first, joins) = accept_joined(&mut server, 2).await;
    assert_eq!(joins[0].topic, "room:a");
    assert_eq!(joins[1].topic, "room:b");
    assert_eq!(joins[0].reference, "1");
    assert_eq!(joins[1].reference, "2");

    first.fail_read(TransportError::Receive("connection reset".into()));

    let (_second, joins) = accept_joined(&mut server, 2).await;
    assert_eq!(joins[0].reference, "3");
    assert_eq!(joins[1].reference, "4");
    assert_eq!(dial_gaps(&connector), vec![Duration::from_millis(100)]);

    client.close().await;
}

/// A connection whose sends fail is replaced
#[tokio::test(start_paused = true)]
async fn test_send_failure_reconnects() {
    let (client, connector, mut server) = new_client(&["room:a"]);
    connector.fail_sends_on_dial(true);
    let _events = client.start().unwrap();

    // The join itself fails, so nothing arrives on this connection
    let _broken = server.accept().await.unwrap();
    connector.fail_sends_on_dial(false);

    let (_conn, joins) = accept_joined(&mut server, 1).await;
    assert_eq!(joins[0].event, "phx_join");
    assert_eq!(connector.attempt_count(), 2);

    client.close().await;
}

#[tokio::test]
async fn test_close_before_start() {
    let (client, connector, _server) = new_client(&["room:a"]);

    client.close().await;
    assert_eq!(*client.state().borrow(), ConnectionState::Closed);
    assert_eq!(client.start().unwrap_err(), ClientError::Closed);
    assert_eq!(connector.attempt_count(), 0);
}

#[tokio::test]
async fn test_close_ends_event_stream() {
    let (client, _connector, mut server) = new_client(&["room:a"]);
    let mut events = client.start().unwrap();
    let (mut conn, _) = accept_joined(&mut server, 1).await;

    client.close().await;
    client.close().await;

    assert!(events.recv().await.is_none());
    assert!(conn.recv().await.is_none());
    assert!(conn.is_closed_by_client());
    assert_eq!(*client.state().borrow(), ConnectionState::Closed);
}

/// Closing while waiting out a backoff does not wait for the delay
#[tokio::test(start_paused = true)]
async fn test_close_during_backoff() {
    let (client, connector, _server) = new_client(&["room:a"]);
    connector.set_policy(DialPolicy::RefuseAll);
    let mut events = client.start().unwrap();

    let mut state = client.state();
    state
        .wait_for(|s| *s == ConnectionState::Backoff)
        .await
        .unwrap();

    let before = tokio::time::Instant::now();
    client.close().await;
    assert!(before.elapsed() < Duration::from_millis(100));
    assert!(events.recv().await.is_none());
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test]
async fn test_start_twice() {
    let (client, _connector, _server) = new_client(&["room:a"]);
    let _events = client.start().unwrap();

    assert_eq!(client.start().unwrap_err(), ClientError::AlreadyStarted);
    client.close().await;
    assert_eq!(client.start().unwrap_err(), ClientError::Closed);
}
