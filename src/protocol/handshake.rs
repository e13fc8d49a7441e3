//! Fixed join handshake.
//!
//! After a client sends `JoinGame`, the server answers with exactly four
//! frames in this order:
//!
//! 1. `SetSeed`
//! 2. `PlayerInfo`
//! 3. `LocatePlayers`
//! 4. `FocusOnPlayer`
//!
//! The client accepts them strictly in order; any other frame in a slot is a
//! sequence violation.

use tracing::{debug, instrument};

use crate::error::{Result, SessionError};
use crate::protocol::frame::{
    ClientId, FocusOnPlayer, Frame, FrameTag, JoinGame, LocatePlayers, PlayerInfo, SetSeed,
};
use crate::sim::mob::MobId;
use crate::sim::server::GameServer;

/// Response order for a join.
pub const JOIN_SEQUENCE: [FrameTag; 4] = [
    FrameTag::SetSeed,
    FrameTag::PlayerInfo,
    FrameTag::LocatePlayers,
    FrameTag::FocusOnPlayer,
];

/// Spawn the joining player and build the four response frames.
///
/// A client owns at most one player. A repeated join from a client that
/// already has one spawns nothing and answers with the existing id. The seed
/// falls back to 0 when the game was never initialized.
#[instrument(skip(game, join), fields(hero = ?join.hero))]
pub fn join_response(
    game: &mut GameServer,
    client: ClientId,
    join: &JoinGame,
) -> Result<(MobId, Vec<Frame>)> {
    let existing = game.repository().find_player_by_client(client).map(|p| p.id());
    let id = match existing {
        Some(id) => {
            debug!(mob_id = %id, "client already joined, repeating its handshake");
            id
        }
        None => game.spawn_new_player(client, &join.name, join.hero)?,
    };

    let frames = vec![
        SetSeed {
            seed: game.seed().unwrap_or_default(),
        }
        .into(),
        PlayerInfo {
            players: game.player_summaries(),
        }
        .into(),
        LocatePlayers {
            players: game.player_locations(),
        }
        .into(),
        FocusOnPlayer { id }.into(),
    ];

    debug!(mob_id = %id, "join response built");
    Ok((id, frames))
}

/// Client-side validator for the ordered join response.
#[derive(Debug, Default)]
pub struct JoinSequence {
    slot: usize,
}

impl JoinSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot the next frame must fill.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn is_complete(&self) -> bool {
        self.slot >= JOIN_SEQUENCE.len()
    }

    /// Check `frame` against the current slot and move to the next one.
    ///
    /// # Errors
    /// `ProtocolSequenceViolation` if the frame is not the expected variant,
    /// `UnexpectedFrame` if the sequence is already complete.
    pub fn accept(&mut self, frame: &Frame) -> Result<()> {
        let expected = *JOIN_SEQUENCE
            .get(self.slot)
            .ok_or(SessionError::UnexpectedFrame(frame.name()))?;
        if frame.tag() != expected {
            return Err(SessionError::ProtocolSequenceViolation {
                slot: self.slot,
                expected: expected.name(),
                received: frame.name(),
            });
        }
        self.slot += 1;
        Ok(())
    }
}
