//! Connection core: correlation, lifecycle, and the event loop.
//!
//! One [`Connection`] owns one transport plus one encoder/decoder pair and
//! multiplexes unbounded concurrent request/response exchanges over it,
//! matching inbound responses to callers by correlation id.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Outbound commands from the handle (requests, responses, close)
//! - Inbound bytes from the transport, decoded into frame events
//! - Teardown: settling every pending request exactly once
//!
//! ```text
//! write_request ──┐                        ┌──► response/ack ──► PendingTable
//! oneway ─────────┤  command channel       │
//! write_response ─┼────────────► EventLoop ┼──► request/heartbeat ──► events
//! close ──────────┘   encoder ▲  ▼ decoder │
//!                          transport       └──► teardown ──► drain + Close
//! ```
//!
//! # Settlement
//!
//! Every pending request settles exactly once, through whichever completion
//! source wins: the matching response, its timeout, an encode failure, or
//! the teardown drain. Each path removes the table entry first, so the
//! losers of a race drain into no-ops.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::Stream;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::id::{CorrelationId, IdAllocator};
use crate::pending::PendingTable;
use crate::protocol::{
    FrameEvent, InboundHeartbeat, InboundRequest, Protocol, ProtocolDecoder, ProtocolEncoder,
    Request, Response,
};
use crate::transport::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the connect race (5s).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initial capacity of the inbound read buffer.
const INITIAL_READ_CAPACITY: usize = 8 * 1024;

/// Process-wide connection instance counter, used for connection names.
static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// State
// ============================================================================

/// Connection lifecycle state.
///
/// Transitions are strictly forward: `Connecting → Connected → Closing →
/// Closed`, never regressing. Constructors only hand out connections that
/// are already past `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// The transport is being established.
    Connecting,
    /// Ready: requests flow.
    Connected,
    /// A close has been requested or teardown has begun.
    Closing,
    /// Teardown completed; all owned resources released.
    Closed,
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Notification delivered on the connection's event channel.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A new request from the peer, awaiting a `write_response`.
    Request(InboundRequest),
    /// A keep-alive probe from the peer, awaiting a `write_heartbeat_ack`.
    Heartbeat(InboundHeartbeat),
    /// A connection-level error: teardown causes surfaced once, plus
    /// oneway encode failures.
    Error(Error),
    /// Teardown completed. Always the final event.
    Close,
}

// ============================================================================
// ConnectionEvents
// ============================================================================

/// Single-consumer stream of [`ConnectionEvent`]s.
///
/// Obtained once per connection via [`Connection::take_events`]. Events
/// buffer until taken, so nothing is lost by taking it late.
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionEvents {
    /// Receives the next event; `None` once the connection is gone and the
    /// buffer is empty.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }
}

impl Stream for ConnectionEvents {
    type Item = ConnectionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Remote endpoint as `host:port`; derived from the transport when not
    /// supplied.
    pub url: Option<String>,

    /// Timeout for the connect race in [`Connection::connect`].
    pub connect_timeout: Duration,
}

impl ConnectionOptions {
    /// Creates the default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the remote endpoint used in error messages.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Wire verb for a correlated outbound frame.
#[derive(Debug, Clone, Copy)]
enum Verb {
    Request,
    Heartbeat,
}

/// Internal commands for the event loop.
enum Command {
    /// Encode and send a correlated request or heartbeat.
    Correlated {
        id: CorrelationId,
        request: Request,
        verb: Verb,
    },
    /// Encode and send a fire-and-forget request.
    Oneway { id: CorrelationId, request: Request },
    /// Encode and send a response to an inbound request.
    Response {
        request: InboundRequest,
        response: Response,
        done: oneshot::Sender<Result<()>>,
    },
    /// Encode and send an ack for an inbound heartbeat.
    HeartbeatAck {
        heartbeat: InboundHeartbeat,
        done: oneshot::Sender<Result<()>>,
    },
    /// Graceful shutdown; pending requests were already drained by the
    /// caller.
    Close { error: Option<Error> },
    /// Abrupt shutdown; teardown settles whatever is still pending.
    ForceClose { error: Option<Error> },
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the handle and the event loop.
struct Shared {
    /// Connection identity, `{protocol}#{seq}`.
    name: String,
    /// Resolved remote endpoint, `host:port`.
    url: String,
    /// Protocol name, prefixing qualified error kind names.
    error_prefix: String,
    /// Outstanding requests by correlation id.
    pending: PendingTable,
    /// Event channel sender; the receiver lives in [`ConnectionEvents`].
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    /// Lifecycle state, watched by `ready`/`closed` waiters.
    state_tx: watch::Sender<State>,
    /// Set once a graceful close has been requested.
    user_closed: AtomicBool,
}

impl Shared {
    /// Surfaces an error on the event channel and the log.
    fn emit_error(&self, err: Error) {
        error!(
            name = %self.name,
            url = %self.url,
            kind = %err.qualified_name(&self.error_prefix),
            %err,
            "connection error"
        );
        let _ = self.events_tx.send(ConnectionEvent::Error(err));
    }

    /// Moves the lifecycle state forward; never regresses.
    fn advance(&self, next: State) {
        self.state_tx.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        });
    }
}

// ============================================================================
// Connection
// ============================================================================

/// One multiplexed connection over a byte-stream transport.
///
/// Cheap to clone; all methods take `&self`. The transport, encoder, and
/// decoder are owned exclusively by the internal event-loop task and are
/// never exposed. Dropping every handle shuts the loop down and settles
/// anything still pending.
pub struct Connection {
    shared: Arc<Shared>,
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<State>,
    events: Arc<Mutex<Option<ConnectionEvents>>>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            command_tx: self.command_tx.clone(),
            state_rx: self.state_rx.clone(),
            events: Arc::clone(&self.events),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.shared.name)
            .field("url", &self.shared.url)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Creates a connection over an already-connected transport.
    ///
    /// Spawns the event loop task internally; must be called within a tokio
    /// runtime. The connection `url` resolves from `options.url`, else the
    /// transport's remote endpoint, else `"unknown"`.
    pub fn new<T, P>(transport: T, protocol: P, options: ConnectionOptions) -> Self
    where
        T: Transport,
        P: Protocol,
    {
        let url = options
            .url
            .or_else(|| transport.peer_url())
            .unwrap_or_else(|| "unknown".to_string());
        let name = format!(
            "{}#{}",
            protocol.name(),
            CONNECTION_SEQ.fetch_add(1, Ordering::Relaxed)
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(State::Connected);

        let shared = Arc::new(Shared {
            name,
            url,
            error_prefix: protocol.name().to_string(),
            pending: PendingTable::new(),
            events_tx,
            state_tx,
            user_closed: AtomicBool::new(false),
        });

        let event_loop = EventLoop::<T, P> {
            transport,
            encoder: protocol.encoder(),
            decoder: protocol.decoder(),
            shared: Arc::clone(&shared),
            command_rx,
            read_buf: BytesMut::with_capacity(INITIAL_READ_CAPACITY),
            write_buf: BytesMut::new(),
        };
        tokio::spawn(event_loop.run());

        debug!(name = %shared.name, url = %shared.url, "connection established");

        Self {
            shared,
            command_tx,
            state_rx,
            events: Arc::new(Mutex::new(Some(ConnectionEvents { rx: events_rx }))),
        }
    }

    /// Races a connect future against the connect timeout.
    ///
    /// This is the readiness await for not-yet-connected transports:
    ///
    /// ```ignore
    /// let conn = Connection::connect(
    ///     TcpStream::connect(addr),
    ///     protocol,
    ///     ConnectionOptions::new().url(addr.to_string()),
    /// )
    /// .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::ConnectTimeout`](crate::ErrorKind::ConnectTimeout) if
    ///   the future does not resolve within `options.connect_timeout`
    /// - [`ErrorKind::SocketError`](crate::ErrorKind::SocketError) if the
    ///   connect itself fails
    pub async fn connect<T, P, F>(connecting: F, protocol: P, options: ConnectionOptions) -> Result<Self>
    where
        T: Transport,
        P: Protocol,
        F: Future<Output = io::Result<T>>,
    {
        let url = options.url.clone().unwrap_or_else(|| "unknown".to_string());
        match time::timeout(options.connect_timeout, connecting).await {
            Err(_) => Err(Error::connect_timeout(
                options.connect_timeout.as_millis() as u64,
                url,
            )),
            Ok(Err(err)) => Err(Error::socket(err.to_string()).with_url(&url)),
            Ok(Ok(transport)) => Ok(Self::new(transport, protocol, options)),
        }
    }
}

// ============================================================================
// Connection - Write Paths
// ============================================================================

impl Connection {
    /// Sends a request and waits for the matching response.
    ///
    /// `request.timeout` is required and caller-supplied; a zero timeout
    /// fires immediately.
    ///
    /// # Errors
    ///
    /// One of `RequestEncode` (code "02", local to this request),
    /// `ResponseTimeout` (code "03"), `SocketClose`, or `SocketError`
    /// (connection-fatal causes).
    pub async fn write_request(&self, request: Request) -> Result<Response> {
        self.round_trip(request, Verb::Request).await
    }

    /// Sends a heartbeat and waits for the matching ack.
    ///
    /// Identical contract to [`write_request`](Self::write_request) via the
    /// heartbeat wire verb, with its own independent pending entry.
    pub async fn write_heartbeat(&self, heartbeat: Request) -> Result<Response> {
        self.round_trip(heartbeat, Verb::Heartbeat).await
    }

    /// Sends a request without expecting or tracking a response.
    ///
    /// There is no future to reject: an encode failure (including a write
    /// after close) surfaces on the event channel as `OneWayEncode`.
    pub fn oneway(&self, mut request: Request) {
        let id = IdAllocator::global().next();
        request.oneway = true;
        if self
            .command_tx
            .send(Command::Oneway { id, request })
            .is_err()
        {
            self.shared
                .emit_error(Error::oneway_encode("write after end"));
        }
    }

    /// Sends a response to an inbound request, echoing its correlation id.
    ///
    /// # Errors
    ///
    /// `ResponseEncode` (code "02") if the encoder rejects the frame or the
    /// connection is already closing ("write after end").
    pub async fn write_response(&self, request: &InboundRequest, response: Response) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let command = Command::Response {
            request: request.clone(),
            response,
            done: done_tx,
        };
        if self.command_tx.send(command).is_err() {
            return Err(Error::response_encode("write after end"));
        }
        done_rx
            .await
            .unwrap_or_else(|_| Err(Error::response_encode("write after end")))
    }

    /// Sends an ack for an inbound heartbeat, echoing its correlation id.
    ///
    /// # Errors
    ///
    /// `ResponseEncode` (code "02"), as for
    /// [`write_response`](Self::write_response).
    pub async fn write_heartbeat_ack(&self, heartbeat: &InboundHeartbeat) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let command = Command::HeartbeatAck {
            heartbeat: heartbeat.clone(),
            done: done_tx,
        };
        if self.command_tx.send(command).is_err() {
            return Err(Error::response_encode("write after end"));
        }
        done_rx
            .await
            .unwrap_or_else(|_| Err(Error::response_encode("write after end")))
    }

    async fn round_trip(&self, request: Request, verb: Verb) -> Result<Response> {
        let id = IdAllocator::global().next();
        let timeout = request.timeout;

        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.shared.pending.register(id, waiter_tx);
        let start = Instant::now();

        if self
            .command_tx
            .send(Command::Correlated { id, request, verb })
            .is_err()
        {
            // loop already gone; settle our own entry
            let err = Error::socket_closed(self.shared.url.as_str());
            self.shared.pending.fail(id, err.clone());
            return Err(err);
        }

        match time::timeout(timeout, waiter_rx).await {
            Ok(Ok(settled)) => settled,
            // waiter dropped without settlement; should not happen, but a
            // typed error beats a hang
            Ok(Err(_)) => Err(Error::socket_closed(self.shared.url.as_str())),
            Err(_) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let err = Error::response_timeout(elapsed_ms, self.shared.url.as_str());
                self.shared.pending.fail(id, err.clone());
                Err(err)
            }
        }
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Graceful shutdown: waits for every in-flight request to settle
    /// through its own path, then ends the outbound side so the peer
    /// observes orderly closure, and finally awaits full teardown.
    ///
    /// Idempotent: calls after the first return immediately. Drain errors
    /// are delivered to the original callers, never re-raised here.
    pub async fn close(&self) {
        self.shutdown_gracefully(None).await;
    }

    /// Graceful shutdown carrying an error.
    ///
    /// The error is surfaced on the event channel first; draining and
    /// teardown then proceed as for [`close`](Self::close), with the
    /// inbound side short-circuited instead of cleanly ended.
    pub async fn close_with(&self, err: Error) {
        self.shutdown_gracefully(Some(err)).await;
    }

    /// Abrupt shutdown: does not wait for in-flight requests, which are
    /// settled by teardown (`SocketClose`).
    pub async fn force_close(&self) {
        self.shutdown_abruptly(None).await;
    }

    /// Abrupt shutdown carrying an error, which teardown classifies and
    /// surfaces once; in-flight requests reject with it.
    pub async fn force_close_with(&self, err: Error) {
        self.shutdown_abruptly(Some(err)).await;
    }

    /// Resolves once the connection is usable.
    ///
    /// Constructors only return connected connections, so this resolves
    /// immediately unless the connection has already begun closing.
    ///
    /// # Errors
    ///
    /// `SocketClose` if the connection closed first.
    pub async fn ready(&self) -> Result<()> {
        let mut state_rx = self.state_rx.clone();
        let state = match state_rx.wait_for(|state| *state >= State::Connected).await {
            Ok(state) => *state,
            Err(_) => State::Closed,
        };
        if state == State::Connected {
            Ok(())
        } else {
            Err(Error::socket_closed(self.shared.url.as_str()))
        }
    }

    /// Resolves once teardown has fully completed.
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx.wait_for(|state| *state == State::Closed).await;
    }

    async fn shutdown_gracefully(&self, err: Option<Error>) {
        if self.shared.user_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.advance(State::Closing);
        if let Some(err) = &err {
            self.shared.emit_error(err.clone());
        }
        self.shared.pending.wait_empty().await;
        let _ = self.command_tx.send(Command::Close { error: err });
        self.closed().await;
    }

    async fn shutdown_abruptly(&self, err: Option<Error>) {
        self.shared.advance(State::Closing);
        let _ = self.command_tx.send(Command::ForceClose { error: err });
        self.closed().await;
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Takes the single-consumer event stream.
    ///
    /// `Some` on the first call, `None` afterwards. Events buffer until
    /// taken.
    #[must_use]
    pub fn take_events(&self) -> Option<ConnectionEvents> {
        self.events.lock().take()
    }

    /// Returns the connection identity, `{protocol}#{seq}`.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the resolved remote endpoint.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Returns the protocol name used as the error-kind prefix.
    #[inline]
    #[must_use]
    pub fn protocol_name(&self) -> &str {
        &self.shared.error_prefix
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> State {
        *self.state_rx.borrow()
    }

    /// Returns `true` once teardown has fully completed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }
}

// ============================================================================
// Shutdown
// ============================================================================

/// Why the event loop is exiting, and whether the cause still needs to be
/// surfaced on the event channel.
struct Shutdown {
    error: Option<Error>,
    surface: bool,
}

// ============================================================================
// EventLoop
// ============================================================================

/// The task exclusively owning transport, encoder, and decoder.
struct EventLoop<T, P: Protocol> {
    transport: T,
    encoder: P::Encoder,
    decoder: P::Decoder,
    shared: Arc<Shared>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl<T, P> EventLoop<T, P>
where
    T: Transport,
    P: Protocol,
{
    async fn run(mut self) {
        let shutdown = self.drive().await;
        self.teardown(shutdown);
    }

    async fn drive(&mut self) -> Shutdown {
        loop {
            tokio::select! {
                read = self.transport.read_buf(&mut self.read_buf) => {
                    match read {
                        // end of stream: peer closed in an orderly way
                        Ok(0) => {
                            return Shutdown { error: None, surface: false };
                        }
                        Ok(_) => {
                            if let Some(shutdown) = self.process_inbound() {
                                return shutdown;
                            }
                        }
                        Err(err) => return self.classify_read_error(err),
                    }
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if let Some(shutdown) = self.handle_command(command).await {
                                return shutdown;
                            }
                        }
                        // every handle dropped
                        None => return Shutdown { error: None, surface: false },
                    }
                }
            }
        }
    }

    /// Decodes every complete frame currently buffered.
    fn process_inbound(&mut self) -> Option<Shutdown> {
        loop {
            match self.decoder.decode(&mut self.read_buf) {
                Ok(Some(event)) => self.dispatch(event),
                Ok(None) => return None,
                // one codec pair per connection: malformed input is fatal
                Err(err) => {
                    return Some(Shutdown {
                        error: Some(Error::socket(err.to_string())),
                        surface: true,
                    });
                }
            }
        }
    }

    /// Routes one decoded frame.
    fn dispatch(&self, event: FrameEvent) {
        match event {
            FrameEvent::Request(request) => {
                self.forward(ConnectionEvent::Request(request));
            }
            FrameEvent::Heartbeat(heartbeat) => {
                self.forward(ConnectionEvent::Heartbeat(heartbeat));
            }
            FrameEvent::Response { id, response } | FrameEvent::HeartbeatAck { id, response } => {
                self.shared.pending.resolve(id, response);
            }
        }
    }

    fn forward(&self, event: ConnectionEvent) {
        if self.shared.events_tx.send(event).is_err() {
            trace!(name = %self.shared.name, "event receiver gone, inbound work dropped");
        }
    }

    async fn handle_command(&mut self, command: Command) -> Option<Shutdown> {
        match command {
            Command::Correlated { id, request, verb } => {
                self.write_buf.clear();
                let encoded = match verb {
                    Verb::Request => {
                        self.encoder
                            .encode_request(id, &request, &mut self.write_buf)
                    }
                    Verb::Heartbeat => {
                        self.encoder
                            .encode_heartbeat(id, &request, &mut self.write_buf)
                    }
                };
                if let Err(err) = encoded {
                    // local to this one request; other pending entries are
                    // untouched
                    self.shared
                        .pending
                        .fail(id, Error::request_encode(err.to_string()));
                    return None;
                }
                self.flush_frame().await
            }

            Command::Oneway { id, request } => {
                self.write_buf.clear();
                if let Err(err) = self
                    .encoder
                    .encode_request(id, &request, &mut self.write_buf)
                {
                    self.shared.emit_error(Error::oneway_encode(err.to_string()));
                    return None;
                }
                self.flush_frame().await
            }

            Command::Response {
                request,
                response,
                done,
            } => {
                self.write_buf.clear();
                if let Err(err) =
                    self.encoder
                        .encode_response(&request, &response, &mut self.write_buf)
                {
                    let _ = done.send(Err(Error::response_encode(err.to_string())));
                    return None;
                }
                let _ = done.send(Ok(()));
                self.flush_frame().await
            }

            Command::HeartbeatAck { heartbeat, done } => {
                self.write_buf.clear();
                if let Err(err) = self
                    .encoder
                    .encode_heartbeat_ack(&heartbeat, &mut self.write_buf)
                {
                    let _ = done.send(Err(Error::response_encode(err.to_string())));
                    return None;
                }
                let _ = done.send(Ok(()));
                self.flush_frame().await
            }

            Command::Close { error } => {
                if error.is_none() {
                    // flush, then signal end-of-stream so the peer observes
                    // orderly closure
                    let _ = self.transport.flush().await;
                    let _ = self.transport.shutdown().await;
                }
                // a close_with error was already surfaced by the handle
                Some(Shutdown {
                    error,
                    surface: false,
                })
            }

            Command::ForceClose { error } => {
                let surface = error.is_some();
                Some(Shutdown { error, surface })
            }
        }
    }

    /// Writes the staged frame to the transport; write failures are
    /// connection-fatal.
    async fn flush_frame(&mut self) -> Option<Shutdown> {
        let written = match self.transport.write_all(&self.write_buf).await {
            Ok(()) => self.transport.flush().await,
            Err(err) => Err(err),
        };
        match written {
            Ok(()) => None,
            Err(err) => Some(Shutdown {
                error: Some(Error::socket(err.to_string())),
                surface: true,
            }),
        }
    }

    fn classify_read_error(&self, err: io::Error) -> Shutdown {
        // passive peer resets are routine: log, do not surface
        let surface = err.kind() != io::ErrorKind::ConnectionReset;
        if !surface {
            warn!(
                name = %self.shared.name,
                url = %self.shared.url,
                "connection reset by peer"
            );
        }
        Shutdown {
            error: Some(Error::socket(err.to_string())),
            surface,
        }
    }

    /// Runs exactly once: the loop exits into it through every path.
    fn teardown(mut self, shutdown: Shutdown) {
        // stop accepting commands before draining, so a racing writer
        // either lands in the drain or sees its send fail
        self.command_rx.close();
        self.shared.advance(State::Closing);

        let Shutdown { error, surface } = shutdown;
        let cause = error.map(|err| err.with_url(&self.shared.url));
        if surface && let Some(err) = &cause {
            self.shared.emit_error(err.clone());
        }

        let drain_error = cause.unwrap_or_else(|| Error::socket_closed(self.shared.url.as_str()));
        self.shared.pending.drain_all(&drain_error);

        // transport, encoder, and decoder drop with the loop
        self.shared.advance(State::Closed);
        let _ = self.shared.events_tx.send(ConnectionEvent::Close);
        debug!(name = %self.shared.name, url = %self.shared.url, "connection closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
