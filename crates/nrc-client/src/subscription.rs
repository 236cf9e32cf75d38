//! Subscription state and the caller-facing handle.
//!
//! The relay's reader dispatches into [`SubState`]; the caller drains the
//! [`Subscription`] handle.  EOSE and CLOSED are single-shot: an atomic
//! compare-and-set guards each signal so only the first wins, no matter how
//! the relay misbehaves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use nrc_protocol::{Event, Filters, SubscriptionId};
use tokio::sync::{mpsc, oneshot, watch};

use crate::relay::Relay;

pub(crate) struct SubState {
    pub(crate) id: SubscriptionId,
    pub(crate) filters: Filters,
    event_tx: Mutex<Option<mpsc::Sender<Event>>>,
    eose_tx: Mutex<Option<oneshot::Sender<()>>>,
    closed_tx: Mutex<Option<oneshot::Sender<String>>>,
    count_tx: Mutex<Option<oneshot::Sender<(u64, bool)>>>,
    /// True between Fire and Unsub; gates both dispatch and the CLOSE frame.
    pub(crate) live: AtomicBool,
    eosed: AtomicBool,
    closed: AtomicBool,
    cancel: watch::Sender<bool>,
}

pub(crate) struct SubChannels {
    pub events: mpsc::Receiver<Event>,
    pub eose: oneshot::Receiver<()>,
    pub closed: oneshot::Receiver<String>,
    pub count: Option<oneshot::Receiver<(u64, bool)>>,
}

impl SubState {
    pub(crate) fn new(
        id: SubscriptionId,
        filters: Filters,
        event_capacity: usize,
        with_count: bool,
    ) -> (Self, SubChannels) {
        let (event_tx, events) = mpsc::channel(event_capacity);
        let (eose_tx, eose) = oneshot::channel();
        let (closed_tx, closed) = oneshot::channel();
        let (count_tx, count) = if with_count {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (cancel, _) = watch::channel(false);
        let state = Self {
            id,
            filters,
            event_tx: Mutex::new(Some(event_tx)),
            eose_tx: Mutex::new(Some(eose_tx)),
            closed_tx: Mutex::new(Some(closed_tx)),
            count_tx: Mutex::new(count_tx),
            live: AtomicBool::new(false),
            eosed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel,
        };
        let channels = SubChannels {
            events,
            eose,
            closed,
            count,
        };
        (state, channels)
    }

    pub(crate) fn is_count(&self) -> bool {
        self.count_tx.lock().expect("lock poisoned").is_some()
    }

    /// Deliver one event, suspending on the bounded channel until the caller
    /// drains it or the subscription scope is cancelled.
    pub(crate) async fn dispatch_event(&self, event: Event) {
        if !self.live.load(Ordering::SeqCst) {
            return;
        }
        let Some(tx) = self.event_tx.lock().expect("lock poisoned").clone() else {
            return;
        };
        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow() {
            return;
        }
        tokio::select! {
            _ = tx.send(event) => {}
            _ = cancelled.changed() => {}
        }
    }

    /// Signal end-of-stored-events; only the first call wins.
    pub(crate) fn dispatch_eose(&self) {
        if self
            .eosed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Some(tx) = self.eose_tx.lock().expect("lock poisoned").take() {
                let _ = tx.send(());
            }
        }
    }

    /// Signal server-side closure; only the first call wins.
    pub(crate) fn dispatch_closed(&self, reason: String) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Some(tx) = self.closed_tx.lock().expect("lock poisoned").take() {
                let _ = tx.send(reason);
            }
        }
    }

    pub(crate) fn dispatch_count(&self, count: u64, approximate: bool) {
        if let Some(tx) = self.count_tx.lock().expect("lock poisoned").take() {
            let _ = tx.send((count, approximate));
        }
    }

    pub(crate) fn trigger_cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub(crate) fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Drop the event sender so the caller's channel closes once drained.
    pub(crate) fn close_events(&self) {
        self.event_tx.lock().expect("lock poisoned").take();
    }
}

/// A live subscription: drain [`Subscription::events`] and watch
/// [`Subscription::end_of_stored_events`] / [`Subscription::closed_reason`].
///
/// Dropping the handle cancels the subscription scope, which sends CLOSE and
/// removes it from the relay's registry; call [`Subscription::unsub`] to do
/// that explicitly and wait for the teardown.
pub struct Subscription {
    pub id: SubscriptionId,
    /// Matching events in the relay's transmission order.
    pub events: mpsc::Receiver<Event>,
    /// Fires once when the stored-event backlog is exhausted.
    pub end_of_stored_events: oneshot::Receiver<()>,
    /// Fires once with the reason when the relay terminates the subscription.
    pub closed_reason: oneshot::Receiver<String>,
    pub(crate) count_result: Option<oneshot::Receiver<(u64, bool)>>,
    pub(crate) state: std::sync::Arc<SubState>,
    pub(crate) relay: Relay,
}

impl Subscription {
    pub fn filters(&self) -> &Filters {
        &self.state.filters
    }

    /// Cancel the subscription: send CLOSE (best effort), remove it from the
    /// registry and close the events channel.
    pub async fn unsub(&self) {
        self.relay.unsub_state(&self.state).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.trigger_cancel();
    }
}
