//! # Authoritative Game Server
//!
//! Simulation root. Owns the session seed and the mob repository, spawns
//! players, applies movement commands and runs the per-tick update.
//!
//! The network side and the tick both reach the server through [`SharedGame`],
//! a single coarse lock over the whole simulation state. Locks are held only
//! for the duration of one operation and never across an `.await`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::config::{GameConfig, ReinitPolicy};
use crate::error::{Result, SessionError};
use crate::protocol::frame::{ClientId, PlayerLocation, PlayerSummary};
use crate::sim::data::{GameData, LevelExperienceConfig};
use crate::sim::mob::{BaseStats, Equipment, Hero, MobId, MovementType, Player, Point};
use crate::sim::movement::{self, DIRECTION_SECTORS};
use crate::sim::repository::MobRepository;
use crate::utils::metrics::SessionMetrics;

/// The simulation state behind its coarse lock.
pub type SharedGame = Arc<Mutex<GameServer>>;

/// Acquire the simulation lock.
///
/// # Errors
/// `LockPoisoned` if a previous holder panicked.
pub fn lock_game(game: &SharedGame) -> Result<MutexGuard<'_, GameServer>> {
    game.lock().map_err(|_| SessionError::LockPoisoned)
}

pub struct GameServer {
    repository: MobRepository,
    data: Arc<GameData>,
    config: GameConfig,
    reinit_policy: ReinitPolicy,
    seed: Option<i32>,
    metrics: Arc<SessionMetrics>,
}

impl GameServer {
    pub fn new(
        data: Arc<GameData>,
        config: GameConfig,
        reinit_policy: ReinitPolicy,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            repository: MobRepository::new(),
            data,
            config,
            reinit_policy,
            seed: None,
            metrics,
        }
    }

    /// Wrap the server in the shared simulation lock.
    pub fn into_shared(self) -> SharedGame {
        Arc::new(Mutex::new(self))
    }

    /// Draw the session seed.
    ///
    /// A second call follows the configured [`ReinitPolicy`]: `Keep` leaves the
    /// first seed in place, `Reset` draws a new one.
    #[instrument(skip(self))]
    pub fn initialize_new_game(&mut self) -> i32 {
        self.initialize_with(|| rand::rng().random())
    }

    /// Same as [`initialize_new_game`](Self::initialize_new_game) with a
    /// caller-supplied seed source.
    pub fn initialize_with<F>(&mut self, draw: F) -> i32
    where
        F: FnOnce() -> i32,
    {
        match (self.seed, self.reinit_policy) {
            (Some(seed), ReinitPolicy::Keep) => {
                warn!(seed, "game already initialized, keeping existing seed");
                seed
            }
            (previous, _) => {
                let seed = draw();
                if previous.is_some() {
                    info!(seed, "re-initializing game with a fresh seed");
                } else {
                    info!(seed, "initializing a new game");
                }
                self.seed = Some(seed);
                seed
            }
        }
    }

    pub fn seed(&self) -> Option<i32> {
        self.seed
    }

    pub fn is_initialized(&self) -> bool {
        self.seed.is_some()
    }

    pub fn repository(&self) -> &MobRepository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut MobRepository {
        &mut self.repository
    }

    /// Create a player for `client` and register it.
    ///
    /// A missing experience table is logged and replaced by a single-threshold
    /// table. A missing hero table fails with `MissingHeroConfig`.
    #[instrument(skip(self, name), fields(name = %name.as_ref()))]
    pub fn spawn_new_player(
        &mut self,
        client: ClientId,
        name: impl AsRef<str>,
        hero: Hero,
    ) -> Result<MobId> {
        let experience = match self.data.experience(hero) {
            Ok(table) => table.clone(),
            Err(e) => {
                warn!(error = %e, "substituting default experience table");
                LevelExperienceConfig::single(self.config.default_experience_threshold)
            }
        };

        let hero_config = self.data.hero(hero)?;
        let id = self.repository.next_available_id()?;

        let mut player = Player::new(
            id,
            client,
            name.as_ref(),
            hero,
            Point::new(self.config.spawn_x, self.config.spawn_y),
            BaseStats::from(hero_config),
            experience,
        );

        // unslotted items would go to the inventory, which is not tracked
        for item in &hero_config.initial_equipment {
            if let Some(slot) = item.equip_slot() {
                player.equip(slot, item.item.as_str());
            } else {
                debug!(item = %item.item, "discarding unslotted starting item");
            }
        }

        self.repository.add_player(player)?;
        self.metrics.player_spawned();
        info!(mob_id = %id, ?hero, "player spawned");
        Ok(id)
    }

    /// Speed for a movement type, derived from the player's velocities.
    fn speed_for(&self, stats: &BaseStats, movement_type: MovementType) -> f32 {
        match movement_type {
            MovementType::Stopped => 0.0,
            MovementType::Walking => stats.walk_velocity * self.config.velocity_scale,
            MovementType::Running => stats.run_velocity * self.config.velocity_scale,
        }
    }

    /// Steer the client's player along a quantized heading.
    pub fn apply_move_request(
        &mut self,
        client: ClientId,
        direction: u8,
        movement_type: MovementType,
    ) -> Result<MobId> {
        let stats = self.player_for(client)?.stats;
        let speed = self.speed_for(&stats, movement_type);
        let player = self
            .repository
            .find_player_by_client_mut(client)
            .ok_or(SessionError::UnknownPlayer(client))?;

        player.mob.waypoints.clear();
        player.mob.direction = direction % DIRECTION_SECTORS;
        player.mob.movement_type = movement_type;
        player.mob.movement_speed = speed;
        Ok(player.id())
    }

    /// Send the client's player towards a target cell.
    pub fn apply_move_to(
        &mut self,
        client: ClientId,
        target: Point,
        movement_type: MovementType,
    ) -> Result<MobId> {
        let stats = self.player_for(client)?.stats;
        let speed = self.speed_for(&stats, movement_type);
        let player = self
            .repository
            .find_player_by_client_mut(client)
            .ok_or(SessionError::UnknownPlayer(client))?;

        player.mob.waypoints = if movement_type == MovementType::Stopped {
            VecDeque::new()
        } else {
            VecDeque::from([target])
        };
        player.mob.movement_type = movement_type;
        player.mob.movement_speed = speed;
        Ok(player.id())
    }

    /// Equip an item into a slot for the client's player.
    pub fn update_equipment(
        &mut self,
        client: ClientId,
        slot: &str,
        item: &str,
    ) -> Result<(MobId, Equipment)> {
        let player = self
            .repository
            .find_player_by_client_mut(client)
            .ok_or(SessionError::UnknownPlayer(client))?;
        player.equip(slot, item);
        Ok((player.id(), player.equipment.clone()))
    }

    /// Advance the simulation by `elapsed_ms`.
    ///
    /// Mobs with waypoints follow them; mobs without waypoints move along
    /// their heading. Stopped mobs are left alone. No collision checks.
    pub fn update(&mut self, elapsed_ms: u64) {
        let seconds = elapsed_ms as f32 / 1000.0;
        for mob in self.repository.mobs_mut() {
            if !mob.is_moving() {
                continue;
            }
            if mob.waypoints.is_empty() {
                movement::integrate_heading(mob, seconds);
            } else {
                movement::advance(mob, seconds);
            }
        }
    }

    pub fn player_for(&self, client: ClientId) -> Result<&Player> {
        self.repository
            .find_player_by_client(client)
            .ok_or(SessionError::UnknownPlayer(client))
    }

    pub fn player_summaries(&self) -> Vec<PlayerSummary> {
        self.repository.players().map(PlayerSummary::from).collect()
    }

    pub fn player_locations(&self) -> Vec<PlayerLocation> {
        self.repository.players().map(PlayerLocation::from).collect()
    }

    /// Remove the client's player, e.g. after it disconnected.
    pub fn remove_client(&mut self, client: ClientId) -> Option<Player> {
        let id = self.repository.find_player_by_client(client)?.id();
        self.repository.remove_player(id)
    }
}
