//! # session-core
//!
//! Authoritative multiplayer session layer.
//!
//! - [`core`]: little-endian wire primitives and the stream codec
//! - [`protocol`]: tagged frames, the tag registry and the join handshake
//! - [`sim`]: entity repository, movement and the authoritative game server
//! - [`service`]: async endpoint, host and client proxy over TCP
//!
//! A solo session in one process:
//!
//! ```no_run
//! use std::sync::Arc;
//! use session_core::config::SessionConfig;
//! use session_core::service::proxy::SessionProxy;
//! use session_core::sim::data::GameData;
//! use session_core::sim::Hero;
//! use session_core::utils::SessionMetrics;
//!
//! # async fn run() -> session_core::Result<()> {
//! let mut config = SessionConfig::default();
//! config.server.address = "127.0.0.1:0".into();
//! let data = Arc::new(GameData::from_file("heroes.toml")?);
//!
//! let (proxy, _events) =
//!     SessionProxy::initialize_local(&config, data, Arc::new(SessionMetrics::new())).await?;
//! let joined = proxy.join_game("Deckard", Hero::Sorceress).await?;
//! println!("playing as {}", joined.player_id);
//! proxy.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod sim;
pub mod utils;

pub use error::{Result, SessionError};
