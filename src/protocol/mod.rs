//! # Protocol Layer
//!
//! Session frames, the tag registry that decodes them, and the fixed join
//! handshake built on top of both.
//!
//! ## Components
//! - **Frame**: typed frame variants and the `FrameHandler` process port
//! - **Registry**: explicit tag → decoder table
//! - **Handshake**: join response builder and ordered-slot validator

pub mod frame;
pub mod handshake;
pub mod registry;
