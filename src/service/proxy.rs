//! # Session Proxy
//!
//! Client side of the session transport.
//!
//! A background network task owns the connection: it writes queued frames
//! and decodes inbound ones into a channel. Request operations read that
//! channel in order, one operation at a time, with every wait bounded by
//! `client.response_timeout`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::core::codec::{FrameCodec, RawFrame};
use crate::error::{Result, SessionError};
use crate::protocol::frame::{Frame, FrameTag, JoinGame, MoveRequest, MoveTo, UpdateEquipment};
use crate::protocol::handshake::JoinSequence;
use crate::protocol::registry::FrameRegistry;
use crate::service::world::{ClientEvent, ClientWorld, SERVER_PEER};
use crate::service::LocalServer;
use crate::sim::data::GameData;
use crate::sim::mob::{Equipment, Hero, MobId, MovementType, Point};
use crate::utils::metrics::SessionMetrics;
use crate::utils::timeout::{with_timeout_error, within};

/// Decoded frames buffered between the network task and the caller
const INBOUND_QUEUE: usize = 64;
const OUTBOUND_QUEUE: usize = 64;

/// Result of a completed join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinedGame {
    pub seed: i32,
    pub player_id: MobId,
}

pub struct SessionProxy {
    outbound: mpsc::Sender<RawFrame>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Result<Frame>>>,
    world: Arc<Mutex<ClientWorld>>,
    events: mpsc::UnboundedSender<ClientEvent>,
    response_timeout: Duration,
    metrics: Arc<SessionMetrics>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    local: Option<LocalServer>,
}

impl SessionProxy {
    /// Connect to the remote endpoint at `client.address`.
    pub async fn initialize(
        config: &SessionConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        if config.client.address.is_empty() {
            return Err(SessionError::ConfigError(
                "Client address cannot be empty".to_string(),
            ));
        }
        Self::connect(config.client.address.clone(), config, metrics, None).await
    }

    /// Start a co-located server, wait for it to bind, then connect to it.
    ///
    /// The server is stopped together with the proxy.
    pub async fn initialize_local(
        config: &SessionConfig,
        data: Arc<GameData>,
        metrics: Arc<SessionMetrics>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        let local = LocalServer::start(config, data, metrics.clone()).await?;
        let addr = local.local_addr().to_string();
        Self::connect(addr, config, metrics, Some(local)).await
    }

    #[instrument(skip(config, metrics, local))]
    async fn connect(
        addr: String,
        config: &SessionConfig,
        metrics: Arc<SessionMetrics>,
        local: Option<LocalServer>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        let stream = with_timeout_error(
            async { Ok(TcpStream::connect(addr.as_str()).await?) },
            config.client.connection_timeout,
        )
        .await?;
        metrics.connection_established();
        info!(address = %addr, "connected to session endpoint");

        let framed = Framed::new(stream, FrameCodec::new(config.transport.max_frame_size));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(network_loop(
            framed,
            Arc::new(FrameRegistry::standard()),
            outbound_rx,
            inbound_tx,
            shutdown_rx,
            metrics.clone(),
        ));

        let proxy = Self {
            outbound: outbound_tx,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            world: Arc::new(Mutex::new(ClientWorld::new())),
            events: events_tx,
            response_timeout: config.client.response_timeout,
            metrics,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
            local,
        };
        Ok((proxy, events_rx))
    }

    /// The co-located server, for local sessions.
    pub fn local_server(&self) -> Option<&LocalServer> {
        self.local.as_ref()
    }

    /// Copy of the mirrored session state.
    pub fn world(&self) -> Result<ClientWorld> {
        self.world
            .lock()
            .map(|world| world.clone())
            .map_err(|_| SessionError::LockPoisoned)
    }

    /// Join the session and wait for the four-frame response.
    ///
    /// # Errors
    /// `ProtocolSequenceViolation` if a slot holds the wrong frame,
    /// `ConnectionClosed` if the server hangs up, `Timeout` if a frame does
    /// not arrive within the response timeout.
    #[instrument(skip(self, name), fields(name = %name))]
    pub async fn join_game(&self, name: &str, hero: Hero) -> Result<JoinedGame> {
        let mut inbound = self.inbound.lock().await;
        self.metrics.handshake_attempt();

        let outcome = self.run_join(&mut inbound, name, hero).await;
        match &outcome {
            Ok(joined) => {
                self.metrics.handshake_success();
                info!(mob_id = %joined.player_id, seed = joined.seed, "joined game");
            }
            Err(e) => {
                self.metrics.handshake_failed();
                warn!(error = %e, "join failed");
            }
        }
        outcome
    }

    async fn run_join(
        &self,
        inbound: &mut mpsc::Receiver<Result<Frame>>,
        name: &str,
        hero: Hero,
    ) -> Result<JoinedGame> {
        self.send(
            JoinGame {
                hero,
                name: name.to_string(),
            }
            .into(),
        )
        .await?;

        let mut sequence = JoinSequence::new();
        while !sequence.is_complete() {
            let frame = self.receive(inbound).await?;
            sequence.accept(&frame).inspect_err(|_| {
                self.metrics.sequence_violation();
            })?;
            self.apply(frame)?;
        }

        let world = self.world.lock().map_err(|_| SessionError::LockPoisoned)?;
        let player_id = world
            .focus()
            .ok_or_else(|| SessionError::malformed("join completed without a focus"))?;
        Ok(JoinedGame {
            seed: world.seed().unwrap_or_default(),
            player_id,
        })
    }

    /// Steer along a heading. No acknowledgement is expected.
    pub async fn move_request(&self, direction: u8, movement_type: MovementType) -> Result<()> {
        self.send(
            MoveRequest {
                direction,
                movement_type,
            }
            .into(),
        )
        .await
    }

    /// Walk or run to a target cell. No acknowledgement is expected.
    pub async fn move_to(&self, target: Point, movement_type: MovementType) -> Result<()> {
        self.send(
            MoveTo {
                target,
                movement_type,
            }
            .into(),
        )
        .await
    }

    /// Equip `item` into `slot` and wait for the server's equipment list.
    #[instrument(skip(self))]
    pub async fn update_equipment(&self, slot: &str, item: &str) -> Result<Equipment> {
        let mut inbound = self.inbound.lock().await;
        self.send(
            UpdateEquipment {
                slot: slot.to_string(),
                item: item.to_string(),
            }
            .into(),
        )
        .await?;

        let frame = self.receive(&mut inbound).await?;
        let equipment = match &frame {
            Frame::ChangeEquipment(change) => change.equipment.clone(),
            other => {
                self.metrics.sequence_violation();
                return Err(SessionError::ProtocolSequenceViolation {
                    slot: 0,
                    expected: FrameTag::ChangeEquipment.name(),
                    received: other.name(),
                });
            }
        };
        self.apply(frame)?;
        Ok(equipment)
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        debug!(frame = frame.name(), "sending frame");
        let raw = frame.to_raw()?;
        self.outbound
            .send(raw)
            .await
            .map_err(|_| SessionError::ConnectionClosed)
    }

    async fn receive(&self, inbound: &mut mpsc::Receiver<Result<Frame>>) -> Result<Frame> {
        match within(inbound.recv(), self.response_timeout).await? {
            Some(frame) => frame,
            None => Err(SessionError::ConnectionClosed),
        }
    }

    fn apply(&self, frame: Frame) -> Result<()> {
        let mut world = self.world.lock().map_err(|_| SessionError::LockPoisoned)?;
        frame.process(SERVER_PEER, &mut world.updater(&self.events))
    }

    /// Signal the network task to exit. Returns immediately.
    pub fn stop(&self) {
        let sender = self.shutdown_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = sender {
            debug!("stopping session proxy");
            let _ = tx.try_send(());
        }
        if let Some(local) = &self.local {
            local.stop();
        }
    }

    /// Stop, then wait for the network task and any local server.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();
        let handle = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| SessionError::TransportError(format!("network task failed: {e}")))?;
        }
        if let Some(local) = &self.local {
            local.shutdown().await?;
        }
        Ok(())
    }
}

impl Drop for SessionProxy {
    fn drop(&mut self) {
        self.stop();
    }
}

#[instrument(skip_all)]
async fn network_loop(
    mut framed: Framed<TcpStream, FrameCodec>,
    registry: Arc<FrameRegistry>,
    mut outbound: mpsc::Receiver<RawFrame>,
    inbound: mpsc::Sender<Result<Frame>>,
    mut shutdown_rx: mpsc::Receiver<()>,
    metrics: Arc<SessionMetrics>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("network task shutting down");
                break;
            }

            Some(raw) = outbound.recv() => {
                let len = raw.wire_len() as u64;
                if let Err(e) = framed.send(raw).await {
                    warn!(error = %e, "failed to send frame");
                    metrics.connection_error();
                    let _ = inbound.send(Err(e)).await;
                    break;
                }
                metrics.frame_sent(len);
            }

            next = framed.next() => match next {
                Some(Ok(raw)) => {
                    metrics.frame_received(raw.wire_len() as u64);
                    let decoded = registry.decode_raw(&raw);
                    let fatal = decoded.is_err();
                    if fatal {
                        metrics.malformed_frame();
                    }
                    if inbound.send(decoded).await.is_err() || fatal {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "connection failed");
                    if !matches!(e, SessionError::Io(_)) {
                        metrics.malformed_frame();
                    }
                    let _ = inbound.send(Err(e)).await;
                    break;
                }
                None => {
                    info!("server closed the connection");
                    break;
                }
            },
        }
    }

    let _ = framed.close().await;
    metrics.connection_closed();
}
