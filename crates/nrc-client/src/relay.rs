//! The concurrent relay client.
//!
//! One websocket, three workers bound to the connection scope:
//!
//! - the **supervisor** waits for scope shutdown, closes the notice channel
//!   and cancels every live subscription;
//! - the **writer** owns the sink and drains the write queue, interleaving a
//!   29-second keepalive ping (three-way select: queue / ticker / scope);
//! - the **reader** owns the stream, identifies each frame's envelope tag
//!   and dispatches it (notice sink, challenge slot, subscription channels,
//!   OK-ack callbacks, count results).
//!
//! The socket is written only by the writer and read only by the reader, so
//! no socket-level locking exists.  Wire order equals the order of
//! successful enqueues.  Per-operation waiters watch the connection scope
//! and return as soon as it is cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use nrc_protocol::{ClientMessage, Event, Filter, Filters, Kind, RelayMessage, SubscriptionId};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info};

use crate::subscription::{SubState, Subscription};
use crate::{Error, Result, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_READ_LIMIT, DEFAULT_ROUND_TRIP};

const PING_INTERVAL: Duration = Duration::from_secs(29);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type NoticeHandler = Arc<dyn Fn(String) + Send + Sync>;
type SignatureChecker = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Normalize a relay URL: scheme must be `ws` or `wss`, host is lowercased,
/// the trailing `/` is trimmed.
pub fn normalize_relay_url(input: &str) -> Result<String> {
    let parsed = url::Url::parse(input.trim()).map_err(|e| Error::Url {
        url: input.to_owned(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(Error::Url {
                url: input.to_owned(),
                reason: format!("scheme must be ws or wss, got {other:?}"),
            })
        }
    }
    let mut out = parsed.to_string();
    while out.ends_with('/') {
        out.pop();
    }
    Ok(out)
}

/// Construction options for [`Relay`].
#[derive(Default, Clone)]
pub struct RelayOptions {
    notice_handler: Option<NoticeHandler>,
    signature_checker: Option<SignatureChecker>,
    assume_valid: bool,
    request_headers: Vec<(String, String)>,
    connector: Option<Connector>,
    read_limit: Option<usize>,
    event_channel_capacity: Option<usize>,
    round_trip: Option<Duration>,
}

impl RelayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a sink for NIP-01 NOTICE messages.  Without one, notices are
    /// logged and dropped.
    pub fn notice_handler(mut self, handler: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.notice_handler = Some(Arc::new(handler));
        self
    }

    /// Replace the default signature check (full BIP-340 verify) applied to
    /// every received event.
    pub fn signature_checker(
        mut self,
        checker: impl Fn(&Event) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.signature_checker = Some(Arc::new(checker));
        self
    }

    /// Skip signature verification entirely (trusted relay).
    pub fn assume_valid(mut self, assume: bool) -> Self {
        self.assume_valid = assume;
        self
    }

    /// Extra headers for the websocket handshake (e.g. Origin).
    pub fn request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    /// Custom TLS connector (CA bundles etc.).
    pub fn connector(mut self, connector: Connector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Inbound frame size limit; exceeding it closes the connection.
    pub fn read_limit(mut self, bytes: usize) -> Self {
        self.read_limit = Some(bytes);
        self
    }

    /// Capacity of each subscription's event channel.
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = Some(capacity);
        self
    }

    /// Deadline applied to dials and round trips when a call supplies none.
    pub fn round_trip(mut self, timeout: Duration) -> Self {
        self.round_trip = Some(timeout);
        self
    }
}

/// Options for [`Relay::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Prepended to the generated subscription id (`label:counter`).
    pub label: String,
}

struct WriteRequest {
    frame: String,
    done: oneshot::Sender<std::result::Result<(), String>>,
}

struct RelayInner {
    url: String,
    opts: RelayOptions,
    shutdown: watch::Sender<bool>,
    connected: AtomicBool,
    closed: Mutex<bool>,
    write_tx: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    subscriptions: Mutex<HashMap<String, Arc<SubState>>>,
    ok_callbacks: Mutex<HashMap<String, oneshot::Sender<(bool, String)>>>,
    notice_tx: Mutex<Option<mpsc::Sender<String>>>,
    /// Last NIP-42 challenge received; last-wins.
    challenge: Mutex<Option<String>>,
    /// First fatal transport error, recorded once by the reader or writer.
    connection_error: Mutex<Option<String>>,
}

/// A client for one relay.  Cheap to clone; all clones share the
/// connection.  Closed is terminal; reconnecting means a new `Relay`.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    /// Create an unconnected client.  The URL is normalized here; dial with
    /// [`Relay::connect`].
    pub fn new(url: &str, opts: RelayOptions) -> Result<Self> {
        let url = normalize_relay_url(url)?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(RelayInner {
                url,
                opts,
                shutdown,
                connected: AtomicBool::new(false),
                closed: Mutex::new(false),
                write_tx: Mutex::new(None),
                subscriptions: Mutex::new(HashMap::new()),
                ok_callbacks: Mutex::new(HashMap::new()),
                notice_tx: Mutex::new(None),
                challenge: Mutex::new(None),
                connection_error: Mutex::new(None),
            }),
        })
    }

    /// Create and connect in one call.
    pub async fn connect_to(url: &str, opts: RelayOptions) -> Result<Self> {
        let relay = Self::new(url, opts)?;
        relay.connect(None).await?;
        Ok(relay)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// True while the connection scope is alive.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst) && !*self.inner.shutdown.borrow()
    }

    /// The first fatal transport error, if the connection has failed.
    pub fn connection_error(&self) -> Option<String> {
        self.inner.connection_error.lock().expect("poisoned").clone()
    }

    /// The last NIP-42 challenge the relay sent, if any.
    pub fn challenge(&self) -> Option<String> {
        self.inner.challenge.lock().expect("poisoned").clone()
    }

    fn round_trip(&self) -> Duration {
        self.inner.opts.round_trip.unwrap_or(DEFAULT_ROUND_TRIP)
    }

    /// Dial the relay and spawn the supervisor, writer and reader workers.
    ///
    /// `timeout` defaults to the 7-second round-trip deadline.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<()> {
        if *self.inner.closed.lock().expect("poisoned") {
            return Err(Error::AlreadyClosed);
        }
        if self
            .inner
            .connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyConnected);
        }

        let stream = match self.dial(timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.connected.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let (sink, stream) = stream.split();

        let (write_tx, write_rx) = mpsc::channel(1);
        *self.inner.write_tx.lock().expect("poisoned") = Some(write_tx);

        if let Some(handler) = self.inner.opts.notice_handler.clone() {
            let (notice_tx, mut notice_rx) = mpsc::channel::<String>(16);
            *self.inner.notice_tx.lock().expect("poisoned") = Some(notice_tx);
            tokio::spawn(async move {
                while let Some(notice) = notice_rx.recv().await {
                    handler(notice);
                }
            });
        }

        tokio::spawn(self.clone().supervisor_task());
        tokio::spawn(self.clone().writer_task(sink, write_rx));
        tokio::spawn(self.clone().reader_task(stream));
        Ok(())
    }

    async fn dial(&self, timeout: Option<Duration>) -> Result<WsStream> {
        let mut request = self
            .inner
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Url {
                url: self.inner.url.clone(),
                reason: e.to_string(),
            })?;
        for (name, value) in &self.inner.opts.request_headers {
            let name: tokio_tungstenite::tungstenite::http::header::HeaderName =
                name.parse().map_err(|_| Error::Url {
                    url: self.inner.url.clone(),
                    reason: format!("invalid header name {name:?}"),
                })?;
            let value = value.parse().map_err(|_| Error::Url {
                url: self.inner.url.clone(),
                reason: format!("invalid header value for {name}"),
            })?;
            request.headers_mut().insert(name, value);
        }

        let read_limit = self.inner.opts.read_limit.unwrap_or(DEFAULT_READ_LIMIT);
        let config = WebSocketConfig::default()
            .max_message_size(Some(read_limit))
            .max_frame_size(Some(read_limit));

        let dial = tokio_tungstenite::connect_async_tls_with_config(
            request,
            Some(config),
            false,
            self.inner.opts.connector.clone(),
        );
        let (stream, _response) = tokio::time::timeout(timeout.unwrap_or(self.round_trip()), dial)
            .await
            .map_err(|_| Error::DialTimeout)?
            .map_err(|e| Error::Transport(e.to_string()))?;
        info!(url = %self.inner.url, "connected");
        Ok(stream)
    }

    // -----------------------------------------------------------------------
    // Workers
    // -----------------------------------------------------------------------

    /// Awaits scope shutdown, then releases everything the connection held.
    async fn supervisor_task(self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        if !*shutdown.borrow_and_update() {
            let _ = shutdown.changed().await;
        }
        // close the notice channel
        self.inner.notice_tx.lock().expect("poisoned").take();
        self.inner.write_tx.lock().expect("poisoned").take();
        // cancel every subscription; each teardown runs in its own task
        let subs: Vec<_> = self
            .inner
            .subscriptions
            .lock()
            .expect("poisoned")
            .values()
            .cloned()
            .collect();
        for sub in subs {
            let relay = self.clone();
            tokio::spawn(async move { relay.unsub_state(&sub).await });
        }
        // wake any publisher blocked on an OK that will never come
        self.inner.ok_callbacks.lock().expect("poisoned").clear();
        self.inner.connected.store(false, Ordering::SeqCst);
        debug!(url = %self.inner.url, "connection scope closed");
    }

    /// Single-threaded drain of the write queue plus the keepalive ticker.
    async fn writer_task(
        self,
        mut sink: SplitSink<WsStream, Message>,
        mut write_rx: mpsc::Receiver<WriteRequest>,
    ) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let start = tokio::time::Instant::now() + PING_INTERVAL;
        let mut ping = tokio::time::interval_at(start, PING_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                _ = ping.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                        debug!(url = %self.inner.url, error = %e, "ping failed; closing websocket");
                        self.record_error_and_close(&format!("ping write failed: {e}"));
                        break;
                    }
                }
                request = write_rx.recv() => {
                    let Some(WriteRequest { frame, done }) = request else { break };
                    let result = sink
                        .send(Message::Text(frame.into()))
                        .await
                        .map_err(|e| e.to_string());
                    let _ = done.send(result);
                }
            }
        }
    }

    /// Demultiplexes every inbound frame until the socket or scope dies.
    async fn reader_task(self, mut stream: SplitStream<WsStream>) {
        let mut shutdown = self.inner.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                frame = stream.next() => match frame {
                    None => {
                        self.record_error_and_close("connection closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        self.record_error_and_close(&e.to_string());
                        break;
                    }
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()).await,
                    Some(Ok(Message::Close(_))) => {
                        self.record_error_and_close("close frame received");
                        break;
                    }
                    // pings are answered by the protocol layer
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// Record the first fatal transport error and cancel the scope.
    fn record_error_and_close(&self, error: &str) {
        {
            let mut slot = self.inner.connection_error.lock().expect("poisoned");
            if slot.is_none() {
                *slot = Some(error.to_owned());
            }
        }
        if self.close().is_ok() {
            debug!(url = %self.inner.url, error, "connection failed");
        }
    }

    /// Route one inbound envelope.  Malformed or unknown frames are dropped;
    /// they are never fatal.
    async fn dispatch(&self, text: &str) {
        let message = match serde_json::from_str::<RelayMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(url = %self.inner.url, error = %e, "dropping undecodable frame");
                return;
            }
        };
        match message {
            RelayMessage::Notice(notice) => {
                let tx = self.inner.notice_tx.lock().expect("poisoned").clone();
                match tx {
                    Some(tx) => {
                        let _ = tx.send(notice).await;
                    }
                    None => error!(url = %self.inner.url, %notice, "NOTICE"),
                }
            }
            RelayMessage::Auth { challenge } => {
                if !challenge.is_empty() {
                    *self.inner.challenge.lock().expect("poisoned") = Some(challenge);
                }
            }
            RelayMessage::Event {
                subscription,
                event,
            } => {
                let sub = self
                    .inner
                    .subscriptions
                    .lock()
                    .expect("poisoned")
                    .get(subscription.as_str())
                    .cloned();
                let Some(sub) = sub else {
                    debug!(url = %self.inner.url, id = %subscription, "no subscription with this id");
                    return;
                };
                // the relay is not trusted to filter correctly
                if !sub.filters.matches(&event) {
                    debug!(url = %self.inner.url, id = %subscription, event = %event.id, "event does not match the subscription filters");
                    return;
                }
                if !self.inner.opts.assume_valid && !self.check_signature(&event) {
                    error!(url = %self.inner.url, event = %event.id, "bad signature");
                    return;
                }
                sub.dispatch_event(event).await;
            }
            RelayMessage::Eose(subscription) => {
                if let Some(sub) = self
                    .inner
                    .subscriptions
                    .lock()
                    .expect("poisoned")
                    .get(subscription.as_str())
                {
                    sub.dispatch_eose();
                }
            }
            RelayMessage::Closed {
                subscription,
                reason,
            } => {
                if let Some(sub) = self
                    .inner
                    .subscriptions
                    .lock()
                    .expect("poisoned")
                    .get(subscription.as_str())
                {
                    sub.dispatch_closed(reason);
                }
            }
            RelayMessage::Count {
                subscription,
                count,
                approximate,
            } => {
                if let Some(sub) = self
                    .inner
                    .subscriptions
                    .lock()
                    .expect("poisoned")
                    .get(subscription.as_str())
                {
                    sub.dispatch_count(count, approximate);
                }
            }
            RelayMessage::Ok {
                id,
                accepted,
                reason,
            } => {
                let callback = self
                    .inner
                    .ok_callbacks
                    .lock()
                    .expect("poisoned")
                    .remove(&id.to_hex());
                match callback {
                    Some(tx) => {
                        let _ = tx.send((accepted, reason));
                    }
                    None => {
                        info!(url = %self.inner.url, event = %id, "unexpected OK");
                    }
                }
            }
        }
    }

    fn check_signature(&self, event: &Event) -> bool {
        match &self.inner.opts.signature_checker {
            Some(checker) => checker(event),
            None => event.verify().map(|v| v.is_valid()).unwrap_or(false),
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Enqueue one frame; the returned channel resolves when the writer has
    /// sent it (or the connection died first).
    async fn write(&self, frame: String) -> oneshot::Receiver<std::result::Result<(), String>> {
        let (done_tx, done_rx) = oneshot::channel();
        let write_tx = self.inner.write_tx.lock().expect("poisoned").clone();
        match write_tx {
            None => {
                let _ = done_tx.send(Err("not connected".to_owned()));
            }
            Some(tx) => {
                let request = WriteRequest {
                    frame,
                    done: done_tx,
                };
                if let Err(failed) = tx.send(request).await {
                    let _ = failed.0.done.send(Err("connection closed".to_owned()));
                }
            }
        }
        done_rx
    }

    // -----------------------------------------------------------------------
    // Publish / Auth
    // -----------------------------------------------------------------------

    /// Send an EVENT submission and wait for the matching OK.
    ///
    /// A negative ack surfaces as [`Error::NegativeAck`] with the relay's
    /// reason.  With no `timeout` the 7-second deadline applies.
    pub async fn publish(&self, event: &Event) -> Result<()> {
        self.publish_with_timeout(event, None).await
    }

    pub async fn publish_with_timeout(
        &self,
        event: &Event,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let id_hex = event.id.to_hex();
        let (ok_tx, ok_rx) = oneshot::channel();
        self.inner
            .ok_callbacks
            .lock()
            .expect("poisoned")
            .insert(id_hex.clone(), ok_tx);
        let result = self.await_ok(event, ok_rx, timeout).await;
        // leak-free: the callback is deleted on every return path
        self.inner
            .ok_callbacks
            .lock()
            .expect("poisoned")
            .remove(&id_hex);
        result
    }

    /// Build, sign and publish a NIP-42 AUTH response for the last
    /// challenge, over the same OK-ack path as [`Relay::publish`].
    pub async fn auth<S: nrc_crypto::Signer>(&self, signer: &S) -> Result<()> {
        let challenge = self.challenge().unwrap_or_default();
        let mut event = crate::auth::create_unsigned(&self.inner.url, &challenge);
        event.sign(signer)?;
        self.publish(&event).await
    }

    async fn await_ok(
        &self,
        event: &Event,
        ok_rx: oneshot::Receiver<(bool, String)>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        // an AUTH response rides its own envelope; everything else is EVENT
        let message = if event.kind == Kind::CLIENT_AUTHENTICATION {
            ClientMessage::Auth(event.clone())
        } else {
            ClientMessage::Event(event.clone())
        };
        let frame = serde_json::to_string(&message)?;
        let answer = self.write(frame).await;

        let mut shutdown = self.inner.shutdown.subscribe();
        let wait = async {
            match answer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(Error::Transport(e)),
                Err(_) => return Err(Error::ConnectionClosed(self.connection_error())),
            }
            if *shutdown.borrow_and_update() {
                return self.result_at_disconnect();
            }
            tokio::select! {
                biased;
                // an ack that raced the shutdown still wins
                outcome = ok_rx => match outcome {
                    Ok((true, _)) => Ok(()),
                    Ok((false, reason)) => Err(Error::NegativeAck(reason)),
                    Err(_) => Err(Error::ConnectionClosed(self.connection_error())),
                },
                _ = shutdown.changed() => self.result_at_disconnect(),
            }
        };
        tokio::time::timeout(timeout.unwrap_or(self.round_trip()), wait)
            .await
            .map_err(|_| Error::OkTimeout)?
    }

    /// A publish interrupted by connection loss reports the recorded
    /// transport error, or success-so-far when none was recorded.
    fn result_at_disconnect(&self) -> Result<()> {
        match self.connection_error() {
            Some(e) => Err(Error::ConnectionClosed(Some(e))),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Open a subscription: registers it, fires the REQ and returns the
    /// handle.  Cancel it with [`Subscription::unsub`] or by dropping it.
    pub async fn subscribe(
        &self,
        filters: Filters,
        opts: SubscribeOptions,
    ) -> Result<Subscription> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        if filters.is_empty() {
            return Err(Error::Validation("a REQ carries at least one filter".into()));
        }
        let sub = self.prepare_subscription(filters, &opts, false);
        self.fire(&sub).await?;
        Ok(sub)
    }

    /// Subscribe with a single filter and collect events until EOSE, the
    /// deadline, or closure; then unsubscribe.
    pub async fn query_sync(&self, filter: Filter, timeout: Option<Duration>) -> Result<Vec<Event>> {
        let mut sub = self
            .subscribe(Filters::single(filter), SubscribeOptions::default())
            .await?;
        let mut events = Vec::new();
        let deadline = timeout.unwrap_or(self.round_trip());
        let drain = async {
            loop {
                tokio::select! {
                    event = sub.events.recv() => match event {
                        Some(event) => events.push(event),
                        None => break,
                    },
                    _ = &mut sub.end_of_stored_events => break,
                }
            }
        };
        // a deadline here is not an error: return what was gathered
        let _ = tokio::time::timeout(deadline, drain).await;
        sub.unsub().await;
        Ok(events)
    }

    /// Ask the relay how many stored events match, via a COUNT round trip.
    pub async fn count(&self, filters: Filters, timeout: Option<Duration>) -> Result<u64> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        if filters.is_empty() {
            return Err(Error::Validation("a COUNT carries at least one filter".into()));
        }
        let mut sub = self.prepare_subscription(filters, &SubscribeOptions::default(), true);
        self.fire(&sub).await?;
        let count_rx = sub.count_result.take().ok_or(Error::NotConnected)?;
        let deadline = timeout.unwrap_or(self.round_trip());
        let result = tokio::time::timeout(deadline, count_rx)
            .await
            .map_err(|_| Error::Timeout(deadline))?
            .map_err(|_| Error::ConnectionClosed(self.connection_error()));
        sub.unsub().await;
        result.map(|(count, _approximate)| count)
    }

    fn prepare_subscription(
        &self,
        filters: Filters,
        opts: &SubscribeOptions,
        with_count: bool,
    ) -> Subscription {
        let id = SubscriptionId::generate(&opts.label);
        let capacity = self
            .inner
            .opts
            .event_channel_capacity
            .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let (state, channels) = SubState::new(id.clone(), filters, capacity, with_count);
        let state = Arc::new(state);
        self.inner
            .subscriptions
            .lock()
            .expect("poisoned")
            .insert(id.as_str().to_owned(), state.clone());

        // subscription supervisor: teardown once the scope is cancelled
        {
            let relay = self.clone();
            let state = state.clone();
            let mut cancelled = state.cancelled();
            tokio::spawn(async move {
                if !*cancelled.borrow_and_update() {
                    let _ = cancelled.changed().await;
                }
                relay.unsub_state(&state).await;
            });
        }

        Subscription {
            id,
            events: channels.events,
            end_of_stored_events: channels.eose,
            closed_reason: channels.closed,
            count_result: channels.count,
            state,
            relay: self.clone(),
        }
    }

    /// Marshal the REQ (or COUNT) envelope and enqueue it.
    async fn fire(&self, sub: &Subscription) -> Result<()> {
        let state = &sub.state;
        let message = if state.is_count() {
            ClientMessage::Count {
                id: state.id.clone(),
                filters: state.filters.clone(),
            }
        } else {
            ClientMessage::Req {
                id: state.id.clone(),
                filters: state.filters.clone(),
            }
        };
        let frame = serde_json::to_string(&message)?;
        state.live.store(true, Ordering::SeqCst);
        match self.write(frame).await.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                state.trigger_cancel();
                Err(Error::Transport(e))
            }
            Err(_) => {
                state.trigger_cancel();
                Err(Error::ConnectionClosed(self.connection_error()))
            }
        }
    }

    /// Shared teardown for explicit unsubs, dropped handles and connection
    /// shutdown.  Idempotent.
    pub(crate) async fn unsub_state(&self, state: &Arc<SubState>) {
        state.trigger_cancel();
        // the CAS means exactly one caller sends CLOSE
        if state
            .live
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            && self.is_connected()
        {
            if let Ok(frame) =
                serde_json::to_string(&ClientMessage::Close(state.id.clone()))
            {
                let _ = self.write(frame).await.await;
            }
        }
        self.inner
            .subscriptions
            .lock()
            .expect("poisoned")
            .remove(state.id.as_str());
        state.close_events();
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    /// Cancel the connection scope.  Idempotent: a second call reports
    /// [`Error::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        let mut closed = self.inner.closed.lock().expect("poisoned");
        if *closed {
            return Err(Error::AlreadyClosed);
        }
        *closed = true;
        let was_connected = self.inner.connected.load(Ordering::SeqCst);
        let _ = self.inner.shutdown.send(true);
        if !was_connected {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}
