//! COUNT round trips and query_sync draining.

use std::time::Duration;

use nostr_relay_client::{
    DefaultSigner, Event, Filter, Filters, Kind, Relay, RelayOptions, Signer, Tags, Timestamp,
};
use nrc_test_utils::{MockRelay, MockRelayConfig};

fn kind_filter() -> Filter {
    let mut filter = Filter::new();
    filter.kinds = vec![Kind::TEXT_NOTE];
    filter
}

#[tokio::test]
async fn count_returns_the_server_total() {
    let config = MockRelayConfig {
        count: Some((42, false)),
        ..Default::default()
    };
    let mut server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let count = relay
        .count(Filters::single(kind_filter()), None)
        .await
        .unwrap();
    assert_eq!(count, 42);

    // the request went out as a COUNT envelope, not a REQ
    let frame = server.next_frame().await.unwrap();
    assert!(frame.starts_with(r#"["COUNT","#), "got {frame}");

    relay.close().unwrap();
}

#[tokio::test]
async fn count_honors_approximate_responses() {
    let config = MockRelayConfig {
        count: Some((1_000_000, true)),
        ..Default::default()
    };
    let server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let count = relay
        .count(Filters::single(kind_filter()), None)
        .await
        .unwrap();
    assert_eq!(count, 1_000_000);

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn count_times_out_without_a_response() {
    let server = MockRelay::start(MockRelayConfig::default()).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    // the mock has no count script, so nothing comes back
    let result = relay
        .count(
            Filters::single(kind_filter()),
            Some(Duration::from_millis(200)),
        )
        .await;
    assert!(result.is_err());

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn query_sync_collects_until_eose() {
    let mut signer = DefaultSigner::default();
    signer.generate().unwrap();
    let events: Vec<Event> = (0..3)
        .map(|i| {
            let mut event = Event::unsigned(
                Timestamp::now(),
                Kind::TEXT_NOTE,
                Tags::default(),
                format!("stored {i}"),
            );
            event.sign(&signer).unwrap();
            event
        })
        .collect();

    let config = MockRelayConfig {
        stored_events: events.clone(),
        ..Default::default()
    };
    let mut server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    let got = relay.query_sync(kind_filter(), None).await.unwrap();
    assert_eq!(
        got.iter().map(|e| e.id).collect::<Vec<_>>(),
        events.iter().map(|e| e.id).collect::<Vec<_>>()
    );

    // query_sync unsubs after EOSE: REQ then CLOSE on the wire
    let req = server.next_frame().await.unwrap();
    assert!(req.starts_with(r#"["REQ","#));
    let close = server.next_frame().await.unwrap();
    assert!(close.starts_with(r#"["CLOSE","#));

    relay.close().unwrap();
}
