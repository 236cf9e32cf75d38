//! Publish round trips against the mock relay: positive OK, negative OK,
//! and a connection that dies before the ack arrives.

use std::time::{Duration, Instant};

use nostr_relay_client::{
    DefaultSigner, Event, Kind, Relay, RelayOptions, Signer, Tag, Tags, Timestamp,
};
use nrc_test_utils::{MockRelay, MockRelayConfig, OkBehavior};

fn signed_event(content: &str) -> Event {
    let mut signer = DefaultSigner::default();
    signer.generate().unwrap();
    let mut event = Event::unsigned(
        Timestamp::now(),
        Kind::TEXT_NOTE,
        Tags::new([Tag::new(["t", "test"])]),
        content,
    );
    event.sign(&signer).unwrap();
    event
}

#[tokio::test]
async fn publish_returns_ok_on_positive_ack() {
    let mut server = MockRelay::start(MockRelayConfig::default()).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let event = signed_event("hello");
    relay.publish(&event).await.unwrap();

    // the relay saw exactly one EVENT frame carrying our event
    let frame = server.next_frame().await.unwrap();
    assert!(frame.starts_with(r#"["EVENT","#));
    assert!(frame.contains(&event.id.to_hex()));

    relay.close().unwrap();
}

#[tokio::test]
async fn publish_surfaces_the_rejection_reason() {
    let config = MockRelayConfig {
        ok: OkBehavior::Reject("blocked: no reason".into()),
        ..Default::default()
    };
    let mut server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let err = relay.publish(&signed_event("nope")).await.unwrap_err();
    assert!(
        err.to_string().contains("blocked: no reason"),
        "unexpected error: {err}"
    );

    let _ = server.next_frame().await;
    relay.close().unwrap();
}

#[tokio::test]
async fn publish_fails_fast_when_the_server_hangs_up() {
    let config = MockRelayConfig {
        drop_after_handshake: true,
        ..Default::default()
    };
    let server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let started = Instant::now();
    let result = relay.publish(&signed_event("void")).await;
    assert!(result.is_err(), "publish must not report success: {result:?}");
    // well inside the 7 second deadline
    assert!(started.elapsed() < Duration::from_secs(7));
}

#[tokio::test]
async fn publish_times_out_when_no_ok_arrives() {
    let config = MockRelayConfig {
        ok: OkBehavior::Ignore,
        ..Default::default()
    };
    let server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let err = relay
        .publish_with_timeout(&signed_event("silence"), Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("given up waiting for an OK"),
        "unexpected error: {err}"
    );

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn interleaved_publishes_correlate_by_event_id() {
    let mut server = MockRelay::start(MockRelayConfig::default()).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let events: Vec<Event> = (0..4)
        .map(|i| signed_event(&format!("event number {i}")))
        .collect();

    let mut handles = Vec::new();
    for event in &events {
        let relay = relay.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move { relay.publish(&event).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // the writer serialized all frames; each event went out exactly once
    let mut seen = Vec::new();
    for _ in 0..events.len() {
        seen.push(server.next_frame().await.unwrap());
    }
    for event in &events {
        let hex = event.id.to_hex();
        assert_eq!(
            seen.iter().filter(|f| f.contains(&hex)).count(),
            1,
            "event {hex} should appear exactly once"
        );
    }

    relay.close().unwrap();
}
