//! # Authoritative Simulation
//!
//! Entity identity, movement and the simulation root.
//!
//! ## Components
//! - **Mob**: entity, player and enemy types
//! - **Movement**: waypoint integration and heading quantization
//! - **Repository**: the single owner of entity identity
//! - **Data**: read-only hero base-stat and experience tables
//! - **Server**: seed, spawning and the per-tick update behind one coarse lock

pub mod data;
pub mod mob;
pub mod movement;
pub mod repository;
pub mod server;

pub use mob::{Hero, MobId, MovementType, Point};
pub use server::{lock_game, GameServer, SharedGame};
