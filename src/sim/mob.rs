//! Simulated entities: the generic mob, the player specialization and enemies.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::protocol::frame::ClientId;
use crate::sim::data::{HeroTypeConfig, LevelExperienceConfig};

/// Unique positive mob identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MobId(NonZeroU32);

impl MobId {
    /// Returns `None` for zero, which is never a valid id.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for MobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2D point in map cells.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementType {
    #[default]
    Stopped,
    Walking,
    Running,
}

impl MovementType {
    pub const ALL: [MovementType; 3] = [Self::Stopped, Self::Walking, Self::Running];

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Walking => 1,
            Self::Running => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Stopped),
            1 => Some(Self::Walking),
            2 => Some(Self::Running),
            _ => None,
        }
    }
}

/// Hero archetypes a player may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Hero {
    Barbarian,
    Necromancer,
    Paladin,
    Assassin,
    Sorceress,
    Amazon,
    Druid,
}

impl Hero {
    pub const ALL: [Hero; 7] = [
        Self::Barbarian,
        Self::Necromancer,
        Self::Paladin,
        Self::Assassin,
        Self::Sorceress,
        Self::Amazon,
        Self::Druid,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Barbarian => 1,
            Self::Necromancer => 2,
            Self::Paladin => 3,
            Self::Assassin => 4,
            Self::Sorceress => 5,
            Self::Amazon => 6,
            Self::Druid => 7,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|hero| hero.as_u8() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Barbarian => "barbarian",
            Self::Necromancer => "necromancer",
            Self::Paladin => "paladin",
            Self::Assassin => "assassin",
            Self::Sorceress => "sorceress",
            Self::Amazon => "amazon",
            Self::Druid => "druid",
        }
    }
}

impl TryFrom<String> for Hero {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|hero| hero.name().eq_ignore_ascii_case(&value))
            .ok_or_else(|| format!("unknown hero: {value}"))
    }
}

impl From<Hero> for String {
    fn from(hero: Hero) -> String {
        hero.name().to_string()
    }
}

/// Classification flags carried by every mob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MobFlags(u8);

impl MobFlags {
    pub const PLAYER: MobFlags = MobFlags(1 << 0);
    pub const ENEMY: MobFlags = MobFlags(1 << 1);
    pub const INVULNERABLE: MobFlags = MobFlags(1 << 2);
    pub const BOSS: MobFlags = MobFlags(1 << 3);
    pub const CRITTER: MobFlags = MobFlags(1 << 4);

    pub const fn empty() -> Self {
        MobFlags(0)
    }

    pub fn contains(self, other: MobFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MobFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: MobFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for MobFlags {
    type Output = MobFlags;

    fn bitor(self, rhs: MobFlags) -> MobFlags {
        MobFlags(self.0 | rhs.0)
    }
}

/// Any simulated entity with a position and movement state.
#[derive(Debug, Clone, PartialEq)]
pub struct Mob {
    pub id: MobId,
    pub name: String,
    pub position: Point,
    /// Cells per second
    pub movement_speed: f32,
    /// Quantized heading, sector 0..16 of 22.5° each
    pub direction: u8,
    pub waypoints: VecDeque<Point>,
    pub movement_type: MovementType,
    pub flags: MobFlags,
}

impl Mob {
    pub fn new(id: MobId, name: impl Into<String>, position: Point) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            movement_speed: 0.0,
            direction: 0,
            waypoints: VecDeque::new(),
            movement_type: MovementType::Stopped,
            flags: MobFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: MobFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    pub fn has_flag(&self, flag: MobFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_moving(&self) -> bool {
        self.movement_type != MovementType::Stopped
    }
}

/// Item codes keyed by equip slot name.
pub type Equipment = BTreeMap<String, String>;

/// Base attributes a player starts with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseStats {
    pub vitality: u32,
    pub strength: u32,
    pub dexterity: u32,
    pub energy: u32,
    pub walk_velocity: f32,
    pub run_velocity: f32,
}

impl From<&HeroTypeConfig> for BaseStats {
    fn from(config: &HeroTypeConfig) -> Self {
        Self {
            vitality: config.vitality,
            strength: config.strength,
            dexterity: config.dexterity,
            energy: config.energy,
            walk_velocity: config.walk_velocity,
            run_velocity: config.run_velocity,
        }
    }
}

/// A mob controlled by a connected client.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub mob: Mob,
    pub client: ClientId,
    pub hero: Hero,
    pub stats: BaseStats,
    pub equipment: Equipment,
    pub level: u32,
    pub experience: u64,
    experience_table: LevelExperienceConfig,
}

impl Player {
    pub fn new(
        id: MobId,
        client: ClientId,
        name: impl Into<String>,
        hero: Hero,
        position: Point,
        stats: BaseStats,
        experience_table: LevelExperienceConfig,
    ) -> Self {
        Self {
            mob: Mob::new(id, name, position).with_flags(MobFlags::PLAYER),
            client,
            hero,
            stats,
            equipment: Equipment::new(),
            level: 1,
            experience: 0,
            experience_table,
        }
    }

    pub fn id(&self) -> MobId {
        self.mob.id
    }

    pub fn name(&self) -> &str {
        &self.mob.name
    }

    /// Assign an item to a slot, returning whatever was there before.
    pub fn equip(&mut self, slot: impl Into<String>, item: impl Into<String>) -> Option<String> {
        self.equipment.insert(slot.into(), item.into())
    }

    pub fn experience_table(&self) -> &LevelExperienceConfig {
        &self.experience_table
    }

    /// Add experience, levelling up at most once per threshold crossed.
    /// Returns true if the player gained at least one level.
    pub fn add_experience(&mut self, amount: u64) -> bool {
        self.experience = self.experience.saturating_add(amount);
        let mut levelled = false;
        while self.level < self.experience_table.max_level() {
            match self.experience_table.total_for_level(self.level + 1) {
                Some(needed) if self.experience >= needed => {
                    self.level += 1;
                    levelled = true;
                }
                _ => break,
            }
        }
        levelled
    }
}

/// A hostile mob.
#[derive(Debug, Clone, PartialEq)]
pub struct Enemy {
    pub mob: Mob,
    /// Monster type code from the data tables
    pub kind: String,
}

impl Enemy {
    pub fn new(id: MobId, kind: impl Into<String>, position: Point) -> Self {
        let kind = kind.into();
        Self {
            mob: Mob::new(id, kind.clone(), position).with_flags(MobFlags::ENEMY),
            kind,
        }
    }
}

/// Everything the repository can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Mob(Mob),
    Player(Player),
    Enemy(Enemy),
}

impl Entity {
    pub fn mob(&self) -> &Mob {
        match self {
            Entity::Mob(mob) => mob,
            Entity::Player(player) => &player.mob,
            Entity::Enemy(enemy) => &enemy.mob,
        }
    }

    pub fn mob_mut(&mut self) -> &mut Mob {
        match self {
            Entity::Mob(mob) => mob,
            Entity::Player(player) => &mut player.mob,
            Entity::Enemy(enemy) => &mut enemy.mob,
        }
    }

    pub fn id(&self) -> MobId {
        self.mob().id
    }

    pub fn as_player(&self) -> Option<&Player> {
        match self {
            Entity::Player(player) => Some(player),
            _ => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut Player> {
        match self {
            Entity::Player(player) => Some(player),
            _ => None,
        }
    }

    pub fn as_enemy(&self) -> Option<&Enemy> {
        match self {
            Entity::Enemy(enemy) => Some(enemy),
            _ => None,
        }
    }
}
