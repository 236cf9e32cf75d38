//! Test doubles for the relay client.

mod mock_relay;

pub use mock_relay::{MockRelay, MockRelayConfig, OkBehavior};
