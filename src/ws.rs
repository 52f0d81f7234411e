//! Streaming transport.
//!
//! Every stream is a WebSocket opened with the session's credentials. Inbound
//! frames are split into control frames (`{"type": "ping" | "pong" |
//! "subscriptions"}`), which go to a control handler, and data frames, which
//! go through a caller-supplied parser. Frames that are not JSON and frames
//! the parser rejects are logged and skipped.
//!
//! ```no_run
//! use futures::StreamExt;
//! use tplus_sdk::{Client, User};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = Client::new(User::random(), "https://oms.example.com".parse()?)?;
//! let mut trades = client.stream_trades().await?;
//! while let Some(trade) = trades.next().await {
//!     println!("{trade}");
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
    time::{sleep, timeout},
};
use url::Url;
use yawc::{HttpRequestBuilder, Options, WebSocket, WebSocketError};

use crate::{
    Client, Error, Result,
    correlation::{Correlator, response_key},
    session::Token,
    types::{
        AssetIdentifier, ControlRequest,
        orders::{CancelOrderRequest, ReplaceOrder, ReplaceOrderRequest},
    },
};

const RECONNECT_DELAY: Duration = Duration::from_millis(1_500);

/// Control frames, tagged by their `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Acknowledges the server-side subscriptions of this connection.
    Subscriptions {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    Ping,
    Pong,
}

/// An inbound frame after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlMessage),
    Data(Value),
}

/// Splits a raw frame into control or data. Malformed frames are logged and
/// yield `None`.
pub fn classify(payload: &[u8]) -> Option<Frame> {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(ok) => ok,
        Err(err) => {
            log::warn!(
                "unable to parse: {}: {err:?}",
                String::from_utf8_lossy(payload)
            );
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("subscriptions" | "ping" | "pong") => match serde_json::from_value(value) {
            Ok(control) => Some(Frame::Control(control)),
            Err(err) => {
                log::warn!("malformed control frame: {err:?}");
                None
            }
        },
        _ => Some(Frame::Data(value)),
    }
}

/// Receives every control frame of a stream.
pub type ControlHandler = Arc<dyn Fn(&ControlMessage) + Send + Sync>;

fn log_control() -> ControlHandler {
    Arc::new(|msg: &ControlMessage| log::debug!("control frame: {msg:?}"))
}

/// Result of routing one inbound frame on a data stream.
#[derive(Debug)]
enum Routed<T> {
    Item(T),
    Control(ControlMessage),
    Skip,
}

fn route<T>(payload: &[u8], parser: &impl Fn(Value) -> anyhow::Result<T>) -> Routed<T> {
    match classify(payload) {
        Some(Frame::Control(msg)) => Routed::Control(msg),
        Some(Frame::Data(value)) => match parser(value) {
            Ok(item) => Routed::Item(item),
            Err(err) => {
                log::warn!("unable to parse frame: {err:?}");
                Routed::Skip
            }
        },
        None => Routed::Skip,
    }
}

/// Maps `base` + `path` onto the WebSocket scheme, keeping host and path.
pub fn ws_url(base: &Url, path: &str) -> Result<Url> {
    let mut url = crate::http::endpoint_url(base, path);
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::invalid(format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::invalid(format!("cannot use {scheme} for {base}")))?;
    Ok(url)
}

/// Opens an authenticated WebSocket.
///
/// An upgrade rejected with 401 or 403 renews the token and is retried once.
async fn connect(client: &Client, url: &Url) -> Result<WebSocket> {
    let user_id = client.user().public_key().to_hex();
    client
        .session()
        .call(client, |token| handshake(client, url, token, &user_id))
        .await
}

async fn handshake(client: &Client, url: &Url, token: Token, user_id: &str) -> Result<WebSocket> {
    let request = HttpRequestBuilder::new()
        .header("Authorization", format!("Bearer {}", token.value()))
        .header("User-Id", user_id);

    let connect = async {
        WebSocket::connect(url.clone())
            .with_request(request)
            .with_options(Options::default().with_no_delay())
            .await
    };

    match timeout(client.config().connect_timeout, connect).await {
        Ok(Ok(stream)) => {
            log::debug!("connected to {url}");
            Ok(stream)
        }
        Ok(Err(WebSocketError::InvalidStatusCode(code))) => Err(upgrade_rejected(url, code)),
        Ok(Err(err)) => Err(Error::StreamDisconnected(format!(
            "unable to connect to {url}: {err}"
        ))),
        Err(_) => Err(Error::StreamDisconnected(format!(
            "timed out connecting to {url}"
        ))),
    }
}

fn upgrade_rejected(url: &Url, code: u16) -> Error {
    match StatusCode::from_u16(code) {
        Ok(status) => Error::Status {
            status,
            body: format!("upgrade to {url} rejected"),
        },
        Err(_) => Error::StreamDisconnected(format!("unable to connect to {url}: status {code}")),
    }
}

/// Keeps trying until a connection is established or the consumer is gone.
/// Gives up when the upgrade is still refused after a token renewal.
async fn reconnect<T>(client: &Client, url: &Url, tx: &UnboundedSender<T>) -> Option<WebSocket> {
    loop {
        if tx.is_closed() {
            return None;
        }
        match connect(client, url).await {
            Ok(stream) => return Some(stream),
            Err(err) if err.is_unauthorized() => {
                log::error!("giving up on {url}: {err}");
                return None;
            }
            Err(err) => {
                log::error!("{err}");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// A typed stream of data frames.
///
/// Ends when the remote closes the connection, unless the client was
/// configured to reconnect. Dropping it closes the connection.
pub struct DataStream<T> {
    rx: UnboundedReceiver<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> DataStream<T> {
    pub(crate) async fn open<P>(
        client: Client,
        path: &str,
        parser: P,
        control: Option<ControlHandler>,
    ) -> Result<Self>
    where
        P: Fn(Value) -> anyhow::Result<T> + Send + 'static,
    {
        let url = ws_url(client.base_url(), path)?;
        let stream = connect(&client, &url).await?;

        let (tx, rx) = unbounded_channel();
        let control = control.unwrap_or_else(log_control);
        let task = tokio::spawn(data_connection(client, url, stream, parser, control, tx));
        Ok(Self { rx, task })
    }

    /// Closes the connection.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> futures::Stream for DataStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.rx.poll_recv(cx)
    }
}

impl<T> Drop for DataStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> fmt::Debug for DataStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream").finish_non_exhaustive()
    }
}

async fn data_connection<T, P>(
    client: Client,
    url: Url,
    mut stream: WebSocket,
    parser: P,
    control: ControlHandler,
    tx: UnboundedSender<T>,
) where
    P: Fn(Value) -> anyhow::Result<T>,
{
    loop {
        while let Some(frame) = stream.next().await {
            let routed = route(&frame.payload, &parser);
            match routed {
                Routed::Item(item) => {
                    if tx.send(item).is_err() {
                        return;
                    }
                }
                Routed::Control(msg) => {
                    if msg.is_ping() {
                        if let Err(err) = stream.send_json(&ControlMessage::Pong).await {
                            log::error!("answering ping on {url}: {err:?}");
                            break;
                        }
                    }
                    control(&msg);
                }
                Routed::Skip => {}
            }
        }

        log::debug!("disconnected from {url}");
        if !client.config().reconnect {
            return;
        }

        match reconnect(&client, &url, &tx).await {
            Some(next) => stream = next,
            None => return,
        }
    }
}

/// Bidirectional channel for correlated order-control requests.
///
/// Each request is registered under its correlation key before it is sent;
/// the background reader hands the matching response back to the caller.
pub struct ControlChannel {
    client: Client,
    tx: UnboundedSender<ControlRequest>,
    correlator: Arc<Correlator>,
    task: JoinHandle<()>,
}

impl ControlChannel {
    pub(crate) async fn open(client: Client, path: &str) -> Result<Self> {
        let url = ws_url(client.base_url(), path)?;
        let stream = connect(&client, &url).await?;

        let (tx, rx) = unbounded_channel();
        let correlator = Correlator::new();
        let task = tokio::spawn(control_connection(
            url,
            stream,
            rx,
            Arc::clone(&correlator),
        ));

        Ok(Self {
            client,
            tx,
            correlator,
            task,
        })
    }

    /// Sends `request` and waits for its response.
    ///
    /// Fails with [`Error::DuplicateCorrelation`] if the same request kind is
    /// already pending for the order and with [`Error::CorrelationTimeout`]
    /// if no response arrives in time.
    pub async fn send(&self, request: impl Into<ControlRequest>) -> Result<Value> {
        let request = request.into();
        let pending = self
            .correlator
            .register(request.correlation_key(), self.client.config().correlation_timeout)?;

        self.tx
            .send(request)
            .map_err(|_| Error::StreamDisconnected("control channel closed".into()))?;

        pending.wait().await
    }

    /// Signs and sends a cancel for `order_id`.
    pub async fn cancel_order(
        &self,
        order_id: impl Into<String>,
        asset_id: AssetIdentifier,
    ) -> Result<Value> {
        let request = CancelOrderRequest::new(self.client.user(), order_id, asset_id)?;
        self.send(request).await
    }

    /// Signs and sends a replace.
    pub async fn replace_order(
        &self,
        replace: ReplaceOrder,
        asset_id: AssetIdentifier,
    ) -> Result<Value> {
        let request = ReplaceOrderRequest::new(self.client.user(), replace, asset_id)?;
        self.send(request).await
    }

    /// Number of requests awaiting a response.
    pub fn pending(&self) -> usize {
        self.correlator.len()
    }

    /// Closes the connection and fails every pending request.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.task.abort();
        self.correlator.fail_all("control channel closed");
    }
}

async fn control_connection(
    url: Url,
    mut stream: WebSocket,
    mut rx: UnboundedReceiver<ControlRequest>,
    correlator: Arc<Correlator>,
) {
    loop {
        tokio::select! {
            item = rx.recv() => {
                let Some(request) = item else { break };
                if let Err(err) = stream.send_json(&request).await {
                    log::error!("sending {}: {err:?}", request.correlation_key());
                    break;
                }
            }
            maybe_frame = stream.next() => {
                let Some(frame) = maybe_frame else { break };
                match classify(&frame.payload) {
                    Some(Frame::Control(msg)) => {
                        if msg.is_ping() {
                            if let Err(err) = stream.send_json(&ControlMessage::Pong).await {
                                log::error!("answering ping on {url}: {err:?}");
                                break;
                            }
                        }
                        log::debug!("control frame: {msg:?}");
                    }
                    Some(Frame::Data(value)) => dispatch(&correlator, value),
                    None => {}
                }
            }
        }
    }

    log::debug!("disconnected from {url}");
    correlator.fail_all("control channel disconnected");
}

/// Resolves the waiter a response frame belongs to.
fn dispatch(correlator: &Correlator, value: Value) {
    match response_key(&value) {
        Some(key) => {
            if !correlator.resolve(&key, value) {
                log::debug!("no pending request for {key}");
            }
        }
        None => log::debug!("uncorrelated frame: {value}"),
    }
}
