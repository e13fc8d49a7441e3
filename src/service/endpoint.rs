//! # Session Endpoint
//!
//! Server side of the session transport.
//!
//! `start` returns immediately; the accept loop binds in the background and
//! flips the endpoint to `Running` once the listener is bound. Callers wait
//! on [`SessionServer::wait_started`] before connecting.
//!
//! Each connection runs its own dispatch loop. Inbound frames are decoded
//! through the registry and processed into [`SessionEvent`]s, which are
//! handed to the simulation host over a channel. The loop waits for the
//! host to finish (responses included) before it reads the next frame, so
//! dispatch per connection is strictly sequential.
//!
//! A malformed frame, a frame the server does not accept, or a host-side
//! failure disconnects the offending client.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{ServerConfig, TransportConfig};
use crate::core::codec::{FrameCodec, RawFrame};
use crate::error::{constants, Result, SessionError};
use crate::protocol::frame::{
    ClientId, Frame, FrameHandler, JoinGame, MoveRequest, MoveTo, UpdateEquipment,
};
use crate::protocol::registry::FrameRegistry;
use crate::utils::metrics::SessionMetrics;

/// Outbound frames buffered per connection
const OUTBOUND_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Decoded client request, as seen by the simulation host.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Join(JoinGame),
    Move(MoveRequest),
    MoveTo(MoveTo),
    UpdateEquipment(UpdateEquipment),
    /// The connection is gone; no responses can be sent.
    Disconnected,
}

/// One event plus what the host needs to answer it.
///
/// The host must complete `done` once it has sent every response; the
/// endpoint does not read the next frame from this client until then.
#[derive(Debug)]
pub struct Dispatch {
    pub client: ClientId,
    pub event: SessionEvent,
    pub responder: Responder,
    pub done: oneshot::Sender<Result<()>>,
}

#[derive(Debug)]
enum Outbound {
    Frame(RawFrame),
    Close,
}

/// Send handle for one connection.
#[derive(Debug, Clone)]
pub struct Responder {
    client: ClientId,
    outbound: mpsc::Sender<Outbound>,
}

impl Responder {
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Queue a frame for this client. Frames are written in call order.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        trace!(client = %self.client, frame = frame.name(), "queueing frame");
        let raw = frame.to_raw()?;
        self.outbound
            .send(Outbound::Frame(raw))
            .await
            .map_err(|_| SessionError::ConnectionClosed)
    }

    /// Flush everything queued so far, then close the connection.
    pub async fn close(&self) {
        let _ = self.outbound.send(Outbound::Close).await;
    }
}

/// Turns accepted frames into [`SessionEvent`]s. Server-to-client frames
/// keep the default `UnexpectedFrame` rejection.
#[derive(Default)]
struct EventCollector {
    event: Option<SessionEvent>,
}

impl FrameHandler for EventCollector {
    fn on_join_game(&mut self, _client: ClientId, frame: JoinGame) -> Result<()> {
        self.event = Some(SessionEvent::Join(frame));
        Ok(())
    }

    fn on_move_request(&mut self, _client: ClientId, frame: MoveRequest) -> Result<()> {
        self.event = Some(SessionEvent::Move(frame));
        Ok(())
    }

    fn on_move_to(&mut self, _client: ClientId, frame: MoveTo) -> Result<()> {
        self.event = Some(SessionEvent::MoveTo(frame));
        Ok(())
    }

    fn on_update_equipment(&mut self, _client: ClientId, frame: UpdateEquipment) -> Result<()> {
        self.event = Some(SessionEvent::UpdateEquipment(frame));
        Ok(())
    }
}

/// State shared between the handle and the accept loop.
struct Shared {
    state: watch::Sender<EndpointState>,
    local_addr: OnceLock<SocketAddr>,
    bind_error: OnceLock<String>,
    registry: Arc<FrameRegistry>,
    metrics: Arc<SessionMetrics>,
    max_frame_size: usize,
    shutdown_timeout: Duration,
}

pub struct SessionServer {
    address: String,
    shared: Arc<Shared>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionServer {
    pub fn new(
        server: &ServerConfig,
        transport: &TransportConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(EndpointState::Stopped);
        Self {
            address: server.address.clone(),
            shared: Arc::new(Shared {
                state,
                local_addr: OnceLock::new(),
                bind_error: OnceLock::new(),
                registry: Arc::new(FrameRegistry::standard()),
                metrics,
                max_frame_size: transport.max_frame_size,
                shutdown_timeout: server.shutdown_timeout,
            }),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> EndpointState {
        *self.shared.state.borrow()
    }

    /// Bound address, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr.get().copied()
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.shared.metrics
    }

    /// Launch the accept loop and return without waiting for the bind.
    ///
    /// Decoded events are delivered on `events`. An endpoint runs once; a
    /// stopped endpoint cannot be restarted.
    ///
    /// # Errors
    /// `TransportError` if the endpoint was already started.
    pub fn start(&self, events: mpsc::Sender<Dispatch>) -> Result<()> {
        let started = self.shared.state.send_if_modified(|state| {
            if *state == EndpointState::Stopped && self.shared.local_addr.get().is_none() {
                *state = EndpointState::Starting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(SessionError::TransportError(
                "session endpoint already started".into(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(accept_loop(
            self.address.clone(),
            self.shared.clone(),
            events,
            shutdown_rx,
        ));

        if let Ok(mut slot) = self.shutdown_tx.lock() {
            *slot = Some(shutdown_tx);
        }
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Wait until the listener is bound.
    ///
    /// # Errors
    /// `TransportError` if binding failed, `NotRunning` if the endpoint was
    /// never started or has already stopped.
    pub async fn wait_started(&self) -> Result<SocketAddr> {
        let mut state = self.shared.state.subscribe();
        let reached = state
            .wait_for(|s| matches!(s, EndpointState::Running | EndpointState::Stopped))
            .await
            .map(|s| *s)
            .map_err(|_| SessionError::NotRunning)?;

        match (reached, self.local_addr(), self.shared.bind_error.get()) {
            (EndpointState::Running, Some(addr), _) => Ok(addr),
            (_, _, Some(reason)) => Err(SessionError::TransportError(format!(
                "{}: {reason}",
                constants::ERR_BIND_FAILED
            ))),
            _ => Err(SessionError::NotRunning),
        }
    }

    /// Ask the accept loop to exit. Frames already being dispatched finish
    /// first. Returns immediately.
    pub fn stop(&self) {
        let sender = self.shutdown_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = sender {
            debug!("stopping session endpoint");
            let _ = tx.try_send(());
        }
    }

    /// Stop and wait for every connection to wind down.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();
        let handle = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| SessionError::TransportError(format!("accept loop failed: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for SessionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[instrument(skip(shared, events, shutdown_rx))]
async fn accept_loop(
    address: String,
    shared: Arc<Shared>,
    events: mpsc::Sender<Dispatch>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "failed to bind session endpoint");
            let _ = shared.bind_error.set(e.to_string());
            shared.state.send_replace(EndpointState::Stopped);
            return;
        }
    };

    let bound = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "failed to read bound address");
            let _ = shared.bind_error.set(e.to_string());
            shared.state.send_replace(EndpointState::Stopped);
            return;
        }
    };
    let _ = shared.local_addr.set(bound);
    shared.state.send_replace(EndpointState::Running);
    info!(address = %bound, "session endpoint listening");

    let (close_tx, close_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    let mut next_client: u64 = 1;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutting down session endpoint");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let client = ClientId(next_client);
                    next_client += 1;
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        client,
                        shared.clone(),
                        events.clone(),
                        close_rx.clone(),
                    ));
                }
                Err(e) => {
                    error!(error = %e, "error accepting connection");
                    shared.metrics.connection_error();
                }
            },

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    shared.state.send_replace(EndpointState::Stopping);
    drop(listener);
    let _ = close_tx.send(true);

    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(shared.shutdown_timeout, drain)
        .await
        .is_err()
    {
        warn!(
            remaining = connections.len(),
            "shutdown timeout reached, aborting connections"
        );
        connections.abort_all();
    }

    shared.state.send_replace(EndpointState::Stopped);
    info!("session endpoint stopped");
}

#[instrument(skip(stream, shared, events, close_rx), fields(client = %client, peer = %peer))]
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    client: ClientId,
    shared: Arc<Shared>,
    events: mpsc::Sender<Dispatch>,
    close_rx: watch::Receiver<bool>,
) {
    shared.metrics.connection_established();
    info!("client connected");

    let codec = FrameCodec::new(shared.max_frame_size);
    let (read_half, write_half) = stream.into_split();
    let reader = FramedRead::new(read_half, codec);
    let writer = FramedWrite::new(write_half, codec);

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let write_task = tokio::spawn(write_loop(writer, outbound_rx, shared.metrics.clone()));
    let responder = Responder {
        client,
        outbound: outbound_tx,
    };

    if let Err(e) = dispatch_loop(reader, client, &shared, &events, &responder, close_rx).await {
        warn!(error = %e, "disconnecting client");
    }

    let (done, _) = oneshot::channel();
    let _ = events
        .send(Dispatch {
            client,
            event: SessionEvent::Disconnected,
            responder: responder.clone(),
            done,
        })
        .await;

    responder.close().await;
    drop(responder);
    let _ = write_task.await;

    shared.metrics.connection_closed();
    info!("client disconnected");
}

/// Read, decode and dispatch frames until the peer leaves, the endpoint
/// stops, or a frame fails. `Ok` means a clean exit.
async fn dispatch_loop(
    mut reader: FramedRead<tokio::net::tcp::OwnedReadHalf, FrameCodec>,
    client: ClientId,
    shared: &Shared,
    events: &mpsc::Sender<Dispatch>,
    responder: &Responder,
    mut close_rx: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            _ = close_rx.changed() => return Ok(()),
            next = reader.next() => next,
        };

        let raw = match next {
            None => return Ok(()),
            Some(Err(e)) => {
                if !matches!(e, SessionError::Io(_)) {
                    shared.metrics.malformed_frame();
                }
                return Err(e);
            }
            Some(Ok(raw)) => raw,
        };
        shared.metrics.frame_received(raw.wire_len() as u64);

        let frame = shared.registry.decode_raw(&raw).inspect_err(|_| {
            shared.metrics.malformed_frame();
        })?;
        debug!(frame = frame.name(), "frame received");

        let mut collector = EventCollector::default();
        frame.process(client, &mut collector)?;
        let Some(event) = collector.event else {
            continue;
        };

        let (done_tx, done_rx) = oneshot::channel();
        events
            .send(Dispatch {
                client,
                event,
                responder: responder.clone(),
                done: done_tx,
            })
            .await
            .map_err(|_| SessionError::TransportError(constants::ERR_HOST_GONE.into()))?;

        done_rx
            .await
            .map_err(|_| SessionError::TransportError(constants::ERR_HOST_GONE.into()))??;
    }
}

async fn write_loop(
    mut writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut outbound: mpsc::Receiver<Outbound>,
    metrics: Arc<SessionMetrics>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(raw) => {
                let len = raw.wire_len() as u64;
                if let Err(e) = writer.send(raw).await {
                    warn!(error = %e, "failed to write frame");
                    metrics.connection_error();
                    break;
                }
                metrics.frame_sent(len);
            }
            Outbound::Close => break,
        }
    }
    let _ = writer.close().await;
}
