//! # Game Data Tables
//!
//! Read-only hero tables consumed when a player spawns: per-hero base stats
//! with starting equipment, and per-hero experience thresholds.
//!
//! The tables are supplied by the composing layer, usually from a TOML file:
//!
//! ```toml
//! [heroes.sorceress]
//! vitality = 10
//! strength = 10
//! dexterity = 25
//! energy = 35
//! walk_velocity = 6.0
//! run_velocity = 9.0
//! initial_equipment = [
//!     { item = "sst", slot = "rarm" },
//!     { item = "hp1" },
//! ]
//!
//! [experience.sorceress]
//! thresholds = [0, 500, 1500, 3750]
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::sim::mob::Hero;

/// Starting item; only items with a slot are equipped at spawn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InitialItem {
    pub item: String,
    #[serde(default)]
    pub slot: Option<String>,
}

impl InitialItem {
    /// The slot this item is equipped into, if it declares a non-empty one.
    pub fn equip_slot(&self) -> Option<&str> {
        self.slot.as_deref().filter(|slot| !slot.is_empty())
    }
}

/// Base stats for one hero archetype.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HeroTypeConfig {
    pub vitality: u32,
    pub strength: u32,
    pub dexterity: u32,
    pub energy: u32,
    pub walk_velocity: f32,
    pub run_velocity: f32,
    #[serde(default)]
    pub initial_equipment: Vec<InitialItem>,
}

/// Cumulative experience required to reach each level, starting at level 1.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LevelExperienceConfig {
    thresholds: Vec<u64>,
}

impl LevelExperienceConfig {
    pub fn new(thresholds: Vec<u64>) -> Self {
        Self { thresholds }
    }

    /// The table used when a hero has no experience data loaded.
    pub fn single(threshold: u64) -> Self {
        Self::new(vec![threshold])
    }

    pub fn max_level(&self) -> u32 {
        u32::try_from(self.thresholds.len()).unwrap_or(u32::MAX)
    }

    /// Total experience needed to be at `level`
    pub fn total_for_level(&self, level: u32) -> Option<u64> {
        let index = usize::try_from(level.checked_sub(1)?).ok()?;
        self.thresholds.get(index).copied()
    }
}

/// Read-only provider of hero tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GameData {
    #[serde(default)]
    pub heroes: HashMap<Hero, HeroTypeConfig>,
    #[serde(default)]
    pub experience: HashMap<Hero, LevelExperienceConfig>,
}

impl GameData {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| SessionError::ConfigError(format!("Failed to parse game data: {e}")))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SessionError::ConfigError(format!("Failed to read game data: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn hero(&self, hero: Hero) -> Result<&HeroTypeConfig> {
        self.heroes
            .get(&hero)
            .ok_or(SessionError::MissingHeroConfig(hero))
    }

    pub fn experience(&self, hero: Hero) -> Result<&LevelExperienceConfig> {
        self.experience
            .get(&hero)
            .ok_or(SessionError::MissingExperienceConfig(hero))
    }

    /// Sanity checks on the loaded tables.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (hero, config) in &self.heroes {
            if config.walk_velocity <= 0.0 {
                errors.push(format!("{hero:?}: walk_velocity must be positive"));
            }
            if config.run_velocity < config.walk_velocity {
                errors.push(format!("{hero:?}: run_velocity is slower than walk_velocity"));
            }
        }

        for (hero, table) in &self.experience {
            if table.thresholds.is_empty() {
                errors.push(format!("{hero:?}: experience table is empty"));
            } else if table.thresholds.windows(2).any(|pair| pair[0] > pair[1]) {
                errors.push(format!("{hero:?}: experience thresholds must not decrease"));
            }
        }

        errors
    }
}
