//! # Error Types
//!
//! Error handling for the session layer.
//!
//! This module defines every error variant the core can surface, from transport
//! failures to simulation invariant violations.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and file system failures
//! - **Frame Errors**: malformed payloads, unknown tags, oversized envelopes
//! - **Sequence Errors**: a handshake slot received the wrong frame variant
//! - **Repository Errors**: duplicate ids, exhausted id space
//! - **Configuration Errors**: missing hero tables, invalid settings
//!
//! Decode and sequence errors abort the operation that triggered them and are
//! returned to its initiator. Repository errors indicate a programming error;
//! callers propagate them instead of continuing with corrupted state.
//!
//! ## Example Usage
//! ```rust
//! use session_core::error::{Result, SessionError};
//! use session_core::core::wire::WireReader;
//!
//! fn read_seed(payload: &[u8]) -> Result<i32> {
//!     let mut reader = WireReader::new(payload);
//!     let seed = reader.read_i32()?;
//!     reader.finish()?;
//!     Ok(seed)
//! }
//!
//! assert!(matches!(read_seed(&[1, 2]), Err(SessionError::MalformedFrame(_))));
//! ```

use std::io;
use thiserror::Error;

use crate::protocol::frame::ClientId;
use crate::sim::mob::{Hero, MobId};

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Frame decoding errors
    pub const ERR_TRUNCATED_PAYLOAD: &str = "payload ended before the frame was complete";
    pub const ERR_TRAILING_BYTES: &str = "payload has bytes after the last field";
    pub const ERR_STRING_TOO_LONG: &str = "string exceeds the 16-bit length prefix";
    pub const ERR_INVALID_UTF8: &str = "string is not valid UTF-8";
    pub const ERR_EMPTY_ENVELOPE: &str = "envelope declares a zero length";
    pub const ERR_LIST_TOO_LONG: &str = "list exceeds the 16-bit count prefix";

    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_TIMEOUT: &str = "Operation timed out";
    pub const ERR_BIND_FAILED: &str = "Session endpoint failed to bind";
    pub const ERR_HOST_GONE: &str = "Simulation host is no longer consuming events";
}

/// SessionError is the primary error type for all session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown frame tag: {0:#04x}")]
    UnknownFrameTag(u8),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Protocol sequence violation in slot {slot}: expected {expected}, received {received}")]
    ProtocolSequenceViolation {
        slot: usize,
        expected: &'static str,
        received: &'static str,
    },

    #[error("Frame {0} is not valid in this direction")]
    UnexpectedFrame(&'static str),

    #[error("Mob id {0} is already tracked")]
    DuplicateId(MobId),

    #[error("Mob id space exhausted")]
    IdExhausted,

    #[error("No hero configuration loaded for {0:?}")]
    MissingHeroConfig(Hero),

    #[error("No experience configuration loaded for {0:?}")]
    MissingExperienceConfig(Hero),

    #[error("No player registered for client {0}")]
    UnknownPlayer(ClientId),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Session is not running")]
    NotRunning,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Synchronization primitive poisoned")]
    LockPoisoned,
}

impl SessionError {
    /// Shorthand used by the wire reader and the frame decoders.
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        SessionError::MalformedFrame(reason.into())
    }
}

/// Type alias for Results using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;
