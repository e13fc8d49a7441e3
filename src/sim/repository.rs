//! # Mob Repository
//!
//! Single owner of entity identity. Every tracked entity lives in the primary
//! map keyed by id; the player and enemy views hold ids only, and every id in
//! a view is always present in the primary map.
//!
//! Category adds write to both the view and the primary map. Removing an
//! entity from either side removes it from both.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{Result, SessionError};
use crate::protocol::frame::ClientId;
use crate::sim::mob::{Enemy, Entity, Mob, MobId, Player, Point};

#[derive(Debug, Default)]
pub struct MobRepository {
    mobs: BTreeMap<MobId, Entity>,
    players: BTreeSet<MobId>,
    enemies: BTreeSet<MobId>,
}

impl MobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mobs.is_empty()
    }

    pub fn contains(&self, id: MobId) -> bool {
        self.mobs.contains_key(&id)
    }

    fn insert(&mut self, entity: Entity) -> Result<MobId> {
        let id = entity.id();
        if self.mobs.contains_key(&id) {
            return Err(SessionError::DuplicateId(id));
        }
        self.mobs.insert(id, entity);
        Ok(id)
    }

    /// Track an uncategorised mob.
    pub fn add_mob(&mut self, mob: Mob) -> Result<()> {
        let id = self.insert(Entity::Mob(mob))?;
        debug!(mob_id = %id, "mob added");
        Ok(())
    }

    /// Stop tracking any entity, dropping it from its category view as well.
    /// The id becomes available again.
    pub fn remove_mob(&mut self, id: MobId) -> Option<Entity> {
        let entity = self.mobs.remove(&id)?;
        self.players.remove(&id);
        self.enemies.remove(&id);
        debug!(mob_id = %id, "mob removed");
        Some(entity)
    }

    pub fn add_player(&mut self, player: Player) -> Result<()> {
        let id = self.insert(Entity::Player(player))?;
        self.players.insert(id);
        debug!(mob_id = %id, "player added");
        Ok(())
    }

    /// Remove a player. Ids that do not belong to a player are left alone.
    pub fn remove_player(&mut self, id: MobId) -> Option<Player> {
        if !self.players.contains(&id) {
            return None;
        }
        match self.remove_mob(id) {
            Some(Entity::Player(player)) => Some(player),
            _ => None,
        }
    }

    pub fn add_enemy(&mut self, enemy: Enemy) -> Result<()> {
        let id = self.insert(Entity::Enemy(enemy))?;
        self.enemies.insert(id);
        debug!(mob_id = %id, "enemy added");
        Ok(())
    }

    /// Remove an enemy. Ids that do not belong to an enemy are left alone.
    pub fn remove_enemy(&mut self, id: MobId) -> Option<Enemy> {
        if !self.enemies.contains(&id) {
            return None;
        }
        match self.remove_mob(id) {
            Some(Entity::Enemy(enemy)) => Some(enemy),
            _ => None,
        }
    }

    /// Smallest positive id not currently tracked.
    ///
    /// # Errors
    /// `IdExhausted` when every `u32` id from 1 upward is in use.
    pub fn next_available_id(&self) -> Result<MobId> {
        let mut candidate: u32 = 1;
        for id in self.mobs.keys() {
            if id.get() > candidate {
                break;
            }
            candidate = candidate.checked_add(1).ok_or(SessionError::IdExhausted)?;
        }
        MobId::new(candidate).ok_or(SessionError::IdExhausted)
    }

    pub fn get(&self, id: MobId) -> Option<&Entity> {
        self.mobs.get(&id)
    }

    pub fn get_mut(&mut self, id: MobId) -> Option<&mut Entity> {
        self.mobs.get_mut(&id)
    }

    /// Every tracked entity, ascending by id.
    pub fn mobs(&self) -> impl Iterator<Item = &Entity> {
        self.mobs.values()
    }

    pub fn mobs_mut(&mut self) -> impl Iterator<Item = &mut Mob> {
        self.mobs.values_mut().map(Entity::mob_mut)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players
            .iter()
            .filter_map(|id| self.mobs.get(id).and_then(Entity::as_player))
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies
            .iter()
            .filter_map(|id| self.mobs.get(id).and_then(Entity::as_enemy))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    pub fn player(&self, id: MobId) -> Option<&Player> {
        self.mobs.get(&id).and_then(Entity::as_player)
    }

    pub fn find_player_by_client(&self, client: ClientId) -> Option<&Player> {
        self.players().find(|player| player.client == client)
    }

    pub fn find_player_by_client_mut(&mut self, client: ClientId) -> Option<&mut Player> {
        let id = self.find_player_by_client(client)?.id();
        self.mobs.get_mut(&id).and_then(Entity::as_player_mut)
    }

    /// Entities within `radius` of `center` (straight-line distance).
    pub fn find_in_radius(&self, center: Point, radius: f32) -> Vec<&Entity> {
        self.mobs
            .values()
            .filter(|entity| entity.mob().position.distance_to(center) <= radius)
            .collect()
    }

    /// Checks the view/primary consistency invariant.
    pub fn is_consistent(&self) -> bool {
        let players_ok = self
            .players
            .iter()
            .all(|id| matches!(self.mobs.get(id), Some(Entity::Player(_))));
        let enemies_ok = self
            .enemies
            .iter()
            .all(|id| matches!(self.mobs.get(id), Some(Entity::Enemy(_))));
        let categorised = self
            .mobs
            .iter()
            .all(|(id, entity)| match entity {
                Entity::Player(_) => self.players.contains(id),
                Entity::Enemy(_) => self.enemies.contains(id),
                Entity::Mob(_) => !self.players.contains(id) && !self.enemies.contains(id),
            });
        players_ok && enemies_ok && categorised
    }
}
