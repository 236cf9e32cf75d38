//! Subscription lifecycle against the mock relay: REQ on the wire, events
//! in order, a single EOSE, CLOSE on unsub, CLOSED from the server, and the
//! client-side gating of non-matching or badly signed results.

use nostr_relay_client::{
    ClientMessage, DefaultSigner, Event, Filter, Filters, Kind, Relay, RelayOptions, Signer,
    SubscribeOptions, Tags, Timestamp,
};
use nrc_test_utils::{MockRelay, MockRelayConfig};

/// Opt into wire-level logs with RUST_LOG=nrc_client=debug.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn signed_note(signer: &DefaultSigner, content: &str) -> Event {
    let mut event = Event::unsigned(Timestamp::now(), Kind::TEXT_NOTE, Tags::default(), content);
    event.sign(signer).unwrap();
    event
}

fn kind_filter(limit: u32) -> Filter {
    let mut filter = Filter::new();
    filter.kinds = vec![Kind::TEXT_NOTE];
    filter.limit = Some(limit);
    filter
}

#[tokio::test]
async fn subscribe_delivers_events_then_eose_then_close_on_unsub() {
    init_tracing();
    let mut signer = DefaultSigner::default();
    signer.generate().unwrap();
    let first = signed_note(&signer, "first");
    let second = signed_note(&signer, "second");

    let config = MockRelayConfig {
        stored_events: vec![first.clone(), second.clone()],
        ..Default::default()
    };
    let mut server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let mut sub = relay
        .subscribe(Filters::single(kind_filter(2)), SubscribeOptions::default())
        .await
        .unwrap();

    // the wire carried exactly the canonical REQ
    let req = server.next_frame().await.unwrap();
    assert_eq!(
        req,
        format!(r#"["REQ","{}",{{"kinds":[1],"limit":2}}]"#, sub.id)
    );

    // both events, in the server's transmission order, then one EOSE
    assert_eq!(sub.events.recv().await.unwrap().id, first.id);
    assert_eq!(sub.events.recv().await.unwrap().id, second.id);
    (&mut sub.end_of_stored_events).await.unwrap();

    // unsub emits CLOSE and closes the events channel
    sub.unsub().await;
    let close = server.next_frame().await.unwrap();
    assert_eq!(close, format!(r#"["CLOSE","{}"]"#, sub.id));
    assert!(sub.events.recv().await.is_none());

    relay.close().unwrap();
}

#[tokio::test]
async fn closed_from_the_server_fires_the_reason_channel() {
    let config = MockRelayConfig {
        closed_reason: Some("auth-required: subscribe later".into()),
        ..Default::default()
    };
    let server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let mut sub = relay
        .subscribe(Filters::single(kind_filter(1)), SubscribeOptions::default())
        .await
        .unwrap();

    let reason = (&mut sub.closed_reason).await.unwrap();
    assert_eq!(reason, "auth-required: subscribe later");

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn results_not_matching_the_filter_are_dropped() {
    let mut signer = DefaultSigner::default();
    signer.generate().unwrap();
    let matching = signed_note(&signer, "kept");
    let mut wrong_kind = Event::unsigned(Timestamp::now(), Kind::new(2), Tags::default(), "off");
    wrong_kind.sign(&signer).unwrap();

    // server replays both against a kinds:[1] subscription
    let config = MockRelayConfig {
        stored_events: vec![wrong_kind, matching.clone()],
        ..Default::default()
    };
    let server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let mut sub = relay
        .subscribe(Filters::single(kind_filter(10)), SubscribeOptions::default())
        .await
        .unwrap();

    assert_eq!(sub.events.recv().await.unwrap().id, matching.id);
    (&mut sub.end_of_stored_events).await.unwrap();
    assert!(sub.events.try_recv().is_err(), "wrong-kind event leaked");

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn results_with_bad_signatures_are_dropped_unless_assumed_valid() {
    let mut signer = DefaultSigner::default();
    signer.generate().unwrap();
    let good = signed_note(&signer, "signed");
    let mut forged = signed_note(&signer, "forged");
    // corrupt the signature so verification fails outright
    forged.sig.0[10] ^= 0xff;

    let config = MockRelayConfig {
        stored_events: vec![forged.clone(), good.clone()],
        ..Default::default()
    };
    let server = MockRelay::start(config.clone()).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let mut sub = relay
        .subscribe(Filters::single(kind_filter(10)), SubscribeOptions::default())
        .await
        .unwrap();
    assert_eq!(sub.events.recv().await.unwrap().id, good.id);
    (&mut sub.end_of_stored_events).await.unwrap();
    assert!(sub.events.try_recv().is_err(), "forged event leaked");
    relay.close().unwrap();

    // with AssumeValid the forged event passes through
    let server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new().assume_valid(true))
        .await
        .unwrap();
    let mut sub = relay
        .subscribe(Filters::single(kind_filter(10)), SubscribeOptions::default())
        .await
        .unwrap();
    assert_eq!(sub.events.recv().await.unwrap().id, forged.id);
    assert_eq!(sub.events.recv().await.unwrap().id, good.id);
    relay.close().unwrap();
}

#[tokio::test]
async fn subscription_ids_carry_the_label() {
    let server = MockRelay::start(MockRelayConfig::default()).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let opts = SubscribeOptions {
        label: "inbox".into(),
    };
    let sub = relay
        .subscribe(Filters::single(kind_filter(1)), opts)
        .await
        .unwrap();
    assert!(sub.id.as_str().starts_with("inbox:"));

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn dropping_the_relay_scope_cancels_subscriptions() {
    let server = MockRelay::start(MockRelayConfig::default()).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let mut sub = relay
        .subscribe(Filters::single(kind_filter(1)), SubscribeOptions::default())
        .await
        .unwrap();

    relay.close().unwrap();
    // the supervisor unsubs every registered subscription on shutdown
    assert!(sub.events.recv().await.is_none());

    drop(server);
}

#[tokio::test]
async fn notices_reach_the_installed_handler() {
    let config = MockRelayConfig {
        notices: vec!["rate limited: slow down".into()],
        ..Default::default()
    };
    let server = MockRelay::start(config).await.unwrap();

    let (notice_tx, mut notice_rx) = tokio::sync::mpsc::unbounded_channel();
    let opts = RelayOptions::new().notice_handler(move |notice| {
        let _ = notice_tx.send(notice);
    });
    let relay = Relay::connect_to(&server.url(), opts).await.unwrap();

    assert_eq!(
        notice_rx.recv().await.unwrap(),
        "rate limited: slow down"
    );

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn req_with_multiple_filters_is_flat_on_the_wire() {
    let mut server = MockRelay::start(MockRelayConfig::default()).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let mut other = Filter::new();
    other.kinds = vec![Kind::new(7)];
    let sub = relay
        .subscribe(
            Filters::new([kind_filter(5), other]),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

    let frame = server.next_frame().await.unwrap();
    let decoded: ClientMessage = serde_json::from_str(&frame).unwrap();
    match decoded {
        ClientMessage::Req { id, filters } => {
            assert_eq!(id, sub.id);
            assert_eq!(filters.len(), 2);
        }
        other => panic!("expected REQ, got {other:?}"),
    }

    relay.close().unwrap();
}
