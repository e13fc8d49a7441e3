//! Explicit tag → decoder table.
//!
//! The table is filled once at startup by [`FrameRegistry::standard`] and is
//! read-only afterwards, so it can be shared freely behind an `Arc`.

use tracing::trace;

use crate::core::codec::RawFrame;
use crate::core::wire::WireReader;
use crate::error::{constants, Result, SessionError};
use crate::protocol::frame::{
    ChangeEquipment, FocusOnPlayer, Frame, FrameTag, JoinGame, LocatePlayers, MessageFrame,
    MoveRequest, MoveTo, PlayerInfo, SetSeed, UpdateEquipment,
};

type DecodeFn = fn(&[u8]) -> Result<Frame>;

fn decode_as<T: MessageFrame>(payload: &[u8]) -> Result<Frame> {
    let mut reader = WireReader::new(payload);
    let frame = T::decode(&mut reader)?;
    reader.finish()?;
    Ok(frame.into())
}

pub struct FrameRegistry {
    decoders: [Option<DecodeFn>; 256],
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FrameRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            decoders: [None; 256],
        }
    }

    /// A registry with every session frame registered.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.insert::<SetSeed>();
        registry.insert::<JoinGame>();
        registry.insert::<LocatePlayers>();
        registry.insert::<PlayerInfo>();
        registry.insert::<FocusOnPlayer>();
        registry.insert::<MoveRequest>();
        registry.insert::<MoveTo>();
        registry.insert::<UpdateEquipment>();
        registry.insert::<ChangeEquipment>();
        registry
    }

    fn insert<T: MessageFrame>(&mut self) {
        self.decoders[usize::from(T::TAG.as_u8())] = Some(decode_as::<T> as DecodeFn);
    }

    /// Register a frame type.
    ///
    /// # Errors
    /// `ConfigError` if the tag is already taken.
    pub fn register<T: MessageFrame>(&mut self) -> Result<()> {
        if self.contains(T::TAG.as_u8()) {
            return Err(SessionError::ConfigError(format!(
                "frame tag {:#04x} ({}) registered twice",
                T::TAG.as_u8(),
                T::TAG.name()
            )));
        }
        self.insert::<T>();
        Ok(())
    }

    pub fn contains(&self, tag: u8) -> bool {
        self.decoders[usize::from(tag)].is_some()
    }

    /// Decode a payload with the decoder registered for `tag`.
    pub fn decode(&self, tag: u8, payload: &[u8]) -> Result<Frame> {
        let decode = self.decoders[usize::from(tag)].ok_or(SessionError::UnknownFrameTag(tag))?;
        let frame = decode(payload)?;
        trace!(frame = frame.name(), len = payload.len(), "frame decoded");
        Ok(frame)
    }

    pub fn decode_raw(&self, raw: &RawFrame) -> Result<Frame> {
        self.decode(raw.tag, &raw.payload)
    }

    /// Decode a tag-prefixed buffer (tag byte followed by the payload).
    pub fn decode_tagged(&self, buf: &[u8]) -> Result<Frame> {
        let (&tag, payload) = buf
            .split_first()
            .ok_or_else(|| SessionError::malformed(constants::ERR_EMPTY_ENVELOPE))?;
        self.decode(tag, payload)
    }

    /// Tags currently registered, ascending.
    pub fn tags(&self) -> impl Iterator<Item = FrameTag> + '_ {
        FrameTag::ALL
            .into_iter()
            .filter(|tag| self.contains(tag.as_u8()))
    }
}
