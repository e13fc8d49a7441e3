//! # Session Services
//!
//! Async transport endpoints and the pieces that connect them to the
//! simulation.
//!
//! ## Components
//! - **Endpoint**: accepts clients and dispatches their frames in order
//! - **Host**: applies decoded events to the shared game
//! - **Proxy**: client connection with the ordered join handshake
//! - **World**: client-side mirror of the session
//!
//! [`LocalServer`] wires an endpoint, a host and a freshly initialized game
//! together in one process.

pub mod endpoint;
pub mod host;
pub mod proxy;
pub mod world;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::service::endpoint::SessionServer;
use crate::service::host::GameHost;
use crate::sim::data::GameData;
use crate::sim::server::{lock_game, GameServer, SharedGame};
use crate::utils::metrics::{SessionMetrics, Timer};

/// Endpoint + host + game running in this process.
pub struct LocalServer {
    endpoint: SessionServer,
    game: SharedGame,
    host_task: Mutex<Option<JoinHandle<()>>>,
    addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl LocalServer {
    /// Initialize a new game, start the endpoint on `server.address` and
    /// wait until it is bound.
    pub async fn start(
        config: &SessionConfig,
        data: Arc<GameData>,
        metrics: Arc<SessionMetrics>,
    ) -> Result<Self> {
        let mut game = GameServer::new(
            data,
            config.game.clone(),
            config.server.reinit_policy,
            metrics.clone(),
        );
        game.initialize_new_game();
        let game = game.into_shared();

        let (events_tx, events_rx) = mpsc::channel(config.server.event_queue_limit);
        let host_task = GameHost::new(game.clone(), metrics.clone()).spawn(events_rx);

        let endpoint = SessionServer::new(&config.server, &config.transport, metrics);
        endpoint.start(events_tx)?;
        let addr = endpoint.wait_started().await?;
        info!(address = %addr, "local server ready");

        Ok(Self {
            endpoint,
            game,
            host_task: Mutex::new(Some(host_task)),
            addr,
            shutdown_timeout: config.server.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> &SessionServer {
        &self.endpoint
    }

    pub fn game(&self) -> &SharedGame {
        &self.game
    }

    /// Advance the simulation by `elapsed_ms`.
    pub fn tick(&self, elapsed_ms: u64) -> Result<()> {
        let _timer = Timer::start("tick");
        lock_game(&self.game)?.update(elapsed_ms);
        Ok(())
    }

    pub fn stop(&self) {
        self.endpoint.stop();
    }

    /// Stop the endpoint, then wait for the host to drain its queue.
    pub async fn shutdown(&self) -> Result<()> {
        self.endpoint.shutdown().await?;

        let handle = self.host_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(joined) => joined
                    .map_err(|e| SessionError::TransportError(format!("host task failed: {e}")))?,
                Err(_) => warn!("game host did not finish before the shutdown timeout"),
            }
        }
        Ok(())
    }
}
