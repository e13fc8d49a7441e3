//! # Core Wire Components
//!
//! Low-level byte handling for the session protocol.
//!
//! ## Components
//! - **Wire**: little-endian field readers/writers with length-prefixed strings
//! - **Codec**: Tokio codec that delimits tagged frames on a byte stream
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [Tag(1)] [Payload(N)]
//! ```
//!
//! ## Safety
//! - Maximum envelope size is configurable (default 64 KiB)
//! - Length validation happens before allocation
//! - Every declared string length is checked against the remaining payload

pub mod codec;
pub mod wire;
