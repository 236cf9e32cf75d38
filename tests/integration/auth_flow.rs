//! NIP-42 flow: the relay challenges, the client answers with a signed
//! kind-22242 event, the server validates it.

use std::time::Duration;

use nostr_relay_client::{auth, ClientMessage, DefaultSigner, Kind, Relay, RelayOptions, Signer};
use nrc_test_utils::{MockRelay, MockRelayConfig};

/// Poll until the client has stored the relay's challenge.
async fn wait_for_challenge(relay: &Relay) -> String {
    for _ in 0..100 {
        if let Some(challenge) = relay.challenge() {
            return challenge;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("relay never delivered the AUTH challenge");
}

#[tokio::test]
async fn auth_round_trip_produces_a_valid_kind_22242_event() {
    let challenge = auth::generate_challenge().unwrap();
    let config = MockRelayConfig {
        auth_challenge: Some(challenge.clone()),
        ..Default::default()
    };
    let mut server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    assert_eq!(wait_for_challenge(&relay).await, challenge);

    let mut signer = DefaultSigner::default();
    signer.generate().unwrap();
    relay.auth(&signer).await.unwrap();

    // the server received an AUTH envelope with a signed kind-22242 event
    // carrying the matching challenge and relay tags
    let frame = server.next_frame().await.unwrap();
    assert!(frame.starts_with(r#"["AUTH","#));
    let decoded: ClientMessage = serde_json::from_str(&frame).unwrap();
    let ClientMessage::Auth(event) = decoded else {
        panic!("expected an AUTH envelope, got {frame}");
    };
    assert_eq!(event.kind, Kind::CLIENT_AUTHENTICATION);
    assert_eq!(event.pubkey.0, signer.pub_key().unwrap());
    auth::validate(&event, &challenge, relay.url()).unwrap();

    relay.close().unwrap();
}

#[tokio::test]
async fn later_challenges_replace_earlier_ones() {
    let first = auth::generate_challenge().unwrap();
    let config = MockRelayConfig {
        auth_challenge: Some(first.clone()),
        ..Default::default()
    };
    let server = MockRelay::start(config).await.unwrap();
    let relay = Relay::connect_to(&server.url(), RelayOptions::new())
        .await
        .unwrap();

    assert_eq!(wait_for_challenge(&relay).await, first);

    drop(server);
    relay.close().unwrap();
}

#[tokio::test]
async fn validate_rejects_a_response_for_another_relay() {
    let challenge = auth::generate_challenge().unwrap();
    let mut signer = DefaultSigner::default();
    signer.generate().unwrap();

    let mut event = auth::create_unsigned("wss://relay.example.com", &challenge);
    event.sign(&signer).unwrap();

    auth::validate(&event, &challenge, "wss://relay.example.com").unwrap();
    assert!(auth::validate(&event, &challenge, "wss://other.example.com").is_err());
}
