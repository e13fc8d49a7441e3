//! Simulation side of the endpoint channel.
//!
//! `GameHost` consumes [`Dispatch`]es one at a time, applies them to the
//! shared game under its lock and sends the responses. The lock is always
//! released before a response is awaited.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SessionError};
use crate::protocol::frame::{ChangeEquipment, ClientId};
use crate::protocol::handshake::join_response;
use crate::service::endpoint::{Dispatch, Responder, SessionEvent};
use crate::sim::mob::MobId;
use crate::sim::server::{lock_game, SharedGame};
use crate::utils::metrics::{SessionMetrics, Timer};

pub struct GameHost {
    game: SharedGame,
    metrics: Arc<SessionMetrics>,
}

impl GameHost {
    pub fn new(game: SharedGame, metrics: Arc<SessionMetrics>) -> Self {
        Self { game, metrics }
    }

    /// Run on its own task until every event sender is dropped.
    pub fn spawn(self, events: mpsc::Receiver<Dispatch>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(self, mut events: mpsc::Receiver<Dispatch>) {
        while let Some(dispatch) = events.recv().await {
            let Dispatch {
                client,
                event,
                responder,
                done,
            } = dispatch;
            let result = self.handle(client, event, &responder).await;
            if let Err(e) = &result {
                warn!(client = %client, error = %e, "event rejected");
            }
            let _ = done.send(result);
        }
        debug!("game host finished, no more event sources");
    }

    /// Apply one event and send its responses.
    #[instrument(skip(self, event, responder), fields(client = %client))]
    pub async fn handle(
        &self,
        client: ClientId,
        event: SessionEvent,
        responder: &Responder,
    ) -> Result<()> {
        match event {
            SessionEvent::Join(join) => {
                let _timer = Timer::start("join");
                self.metrics.handshake_attempt();
                let built = {
                    let mut game = lock_game(&self.game)?;
                    join_response(&mut game, client, &join)
                };
                let (id, frames) = built.inspect_err(|_| self.metrics.handshake_failed())?;

                for frame in frames {
                    responder
                        .send(frame)
                        .await
                        .inspect_err(|_| self.metrics.handshake_failed())?;
                }
                self.metrics.handshake_success();
                info!(mob_id = %id, name = %join.name, "player joined");
            }
            SessionEvent::Move(request) => {
                let mut game = lock_game(&self.game)?;
                let moved =
                    game.apply_move_request(client, request.direction, request.movement_type);
                ignore_unjoined(moved)?;
            }
            SessionEvent::MoveTo(request) => {
                let mut game = lock_game(&self.game)?;
                let moved = game.apply_move_to(client, request.target, request.movement_type);
                ignore_unjoined(moved)?;
            }
            SessionEvent::UpdateEquipment(update) => {
                let (id, equipment) = {
                    let mut game = lock_game(&self.game)?;
                    game.update_equipment(client, &update.slot, &update.item)?
                };
                responder
                    .send(ChangeEquipment { id, equipment }.into())
                    .await?;
            }
            SessionEvent::Disconnected => {
                let mut game = lock_game(&self.game)?;
                if let Some(player) = game.remove_client(client) {
                    info!(mob_id = %player.id(), "player left");
                }
            }
        }
        Ok(())
    }
}

/// Movement is best-effort: a command from a client without a player is
/// dropped instead of failing the connection.
fn ignore_unjoined(moved: Result<MobId>) -> Result<()> {
    match moved {
        Ok(_) => Ok(()),
        Err(SessionError::UnknownPlayer(client)) => {
            debug!(client = %client, "dropping movement from a client that has not joined");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
