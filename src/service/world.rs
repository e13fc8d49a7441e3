//! Client-side mirror of the session.
//!
//! The proxy applies server frames here under its own coarse lock and
//! forwards a [`ClientEvent`] for each change.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::protocol::frame::{
    ChangeEquipment, ClientId, FocusOnPlayer, FrameHandler, LocatePlayers, PlayerInfo,
    PlayerLocation, PlayerSummary, SetSeed,
};
use crate::sim::mob::{Equipment, MobId, Point};

/// Caller identity used when the proxy processes frames from the server.
pub const SERVER_PEER: ClientId = ClientId(0);

/// Changes to the mirrored session, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SeedSet(i32),
    PlayersUpdated(Vec<PlayerSummary>),
    PlayersLocated(Vec<PlayerLocation>),
    Focused(MobId),
    EquipmentChanged { id: MobId, equipment: Equipment },
}

#[derive(Debug, Clone, Default)]
pub struct ClientWorld {
    seed: Option<i32>,
    players: BTreeMap<MobId, PlayerSummary>,
    locations: BTreeMap<MobId, Point>,
    focus: Option<MobId>,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self) -> Option<i32> {
        self.seed
    }

    pub fn focus(&self) -> Option<MobId> {
        self.focus
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerSummary> {
        self.players.values()
    }

    pub fn player(&self, id: MobId) -> Option<&PlayerSummary> {
        self.players.get(&id)
    }

    /// The player the camera follows.
    pub fn focused_player(&self) -> Option<&PlayerSummary> {
        self.focus.and_then(|id| self.players.get(&id))
    }

    /// Last reported position of a player.
    pub fn location(&self, id: MobId) -> Option<Point> {
        self.locations.get(&id).copied()
    }

    /// Apply `frame`-driven changes through a handler bound to `events`.
    pub fn updater<'a>(
        &'a mut self,
        events: &'a mpsc::UnboundedSender<ClientEvent>,
    ) -> WorldUpdater<'a> {
        WorldUpdater {
            world: self,
            events,
        }
    }
}

/// Process step for frames arriving at the client.
pub struct WorldUpdater<'a> {
    world: &'a mut ClientWorld,
    events: &'a mpsc::UnboundedSender<ClientEvent>,
}

impl WorldUpdater<'_> {
    fn emit(&self, event: ClientEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }
}

impl FrameHandler for WorldUpdater<'_> {
    fn on_set_seed(&mut self, _client: ClientId, frame: SetSeed) -> Result<()> {
        debug!(seed = frame.seed, "seed received");
        self.world.seed = Some(frame.seed);
        self.emit(ClientEvent::SeedSet(frame.seed));
        Ok(())
    }

    fn on_player_info(&mut self, _client: ClientId, frame: PlayerInfo) -> Result<()> {
        self.world.players = frame
            .players
            .iter()
            .map(|summary| (summary.id, summary.clone()))
            .collect();
        for summary in &frame.players {
            self.world.locations.insert(summary.id, summary.position);
        }
        self.emit(ClientEvent::PlayersUpdated(frame.players));
        Ok(())
    }

    fn on_locate_players(&mut self, _client: ClientId, frame: LocatePlayers) -> Result<()> {
        for location in &frame.players {
            self.world.locations.insert(location.id, location.position);
            if let Some(summary) = self.world.players.get_mut(&location.id) {
                summary.position = location.position;
            }
        }
        self.emit(ClientEvent::PlayersLocated(frame.players));
        Ok(())
    }

    fn on_focus_on_player(&mut self, _client: ClientId, frame: FocusOnPlayer) -> Result<()> {
        self.world.focus = Some(frame.id);
        self.emit(ClientEvent::Focused(frame.id));
        Ok(())
    }

    fn on_change_equipment(&mut self, _client: ClientId, frame: ChangeEquipment) -> Result<()> {
        if let Some(summary) = self.world.players.get_mut(&frame.id) {
            summary.equipment = frame.equipment.clone();
        }
        self.emit(ClientEvent::EquipmentChanged {
            id: frame.id,
            equipment: frame.equipment,
        });
        Ok(())
    }
}
