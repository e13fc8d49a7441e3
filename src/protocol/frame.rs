//! # Session Frames
//!
//! Every message exchanged over the session transport is a frame: a typed
//! payload addressed by a stable one-byte tag.
//!
//! ## Frame Table
//! | Tag | Frame | Direction | Payload |
//! |---|---|---|---|
//! | 0x01 | SetSeed | S→C | seed:i32 |
//! | 0x02 | JoinGame | C→S | hero:u8, name:str16 |
//! | 0x03 | LocatePlayers | S→C | count:u16, (id:u32, x:f32, y:f32)* |
//! | 0x04 | PlayerInfo | S→C | count:u16, PlayerSummary* |
//! | 0x05 | FocusOnPlayer | S→C | id:u32 |
//! | 0x06 | MoveRequest | C→S | direction:u8, movementType:u8 |
//! | 0x07 | MoveTo | C→S | x:f32, y:f32, movementType:u8 |
//! | 0x08 | UpdateEquipment | C→S | slot:str16, item:str16 |
//! | 0x09 | ChangeEquipment | S→C | id:u32, count:u16, (slot:str16, item:str16)* |
//!
//! Encoding never includes the tag; the codec and registry handle it.

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::core::codec::RawFrame;
use crate::core::wire::{WireReader, WireWriter};
use crate::error::{Result, SessionError};
use crate::sim::mob::{Equipment, Hero, MobId, MovementType, Player, Point};

/// Caller identity assigned by the endpoint to each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-byte wire discriminator. `0x00` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameTag {
    SetSeed = 0x01,
    JoinGame = 0x02,
    LocatePlayers = 0x03,
    PlayerInfo = 0x04,
    FocusOnPlayer = 0x05,
    MoveRequest = 0x06,
    MoveTo = 0x07,
    UpdateEquipment = 0x08,
    ChangeEquipment = 0x09,
}

impl FrameTag {
    pub const ALL: [FrameTag; 9] = [
        Self::SetSeed,
        Self::JoinGame,
        Self::LocatePlayers,
        Self::PlayerInfo,
        Self::FocusOnPlayer,
        Self::MoveRequest,
        Self::MoveTo,
        Self::UpdateEquipment,
        Self::ChangeEquipment,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_u8() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SetSeed => "SetSeed",
            Self::JoinGame => "JoinGame",
            Self::LocatePlayers => "LocatePlayers",
            Self::PlayerInfo => "PlayerInfo",
            Self::FocusOnPlayer => "FocusOnPlayer",
            Self::MoveRequest => "MoveRequest",
            Self::MoveTo => "MoveTo",
            Self::UpdateEquipment => "UpdateEquipment",
            Self::ChangeEquipment => "ChangeEquipment",
        }
    }
}

/// Byte-exact payload contract implemented by every frame variant.
pub trait MessageFrame: Sized + Into<Frame> {
    const TAG: FrameTag;

    /// Append the payload (tag excluded).
    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()>;

    /// Populate the variant from a payload. The registry checks that the
    /// whole payload was consumed.
    fn decode(reader: &mut WireReader<'_>) -> Result<Self>;
}

fn read_mob_id(reader: &mut WireReader<'_>) -> Result<MobId> {
    let raw = reader.read_u32()?;
    MobId::new(raw).ok_or_else(|| SessionError::malformed("mob id 0 is reserved"))
}

fn read_movement_type(reader: &mut WireReader<'_>) -> Result<MovementType> {
    let raw = reader.read_u8()?;
    MovementType::from_u8(raw)
        .ok_or_else(|| SessionError::malformed(format!("unknown movement type {raw}")))
}

fn read_hero(reader: &mut WireReader<'_>) -> Result<Hero> {
    let raw = reader.read_u8()?;
    Hero::from_u8(raw).ok_or_else(|| SessionError::malformed(format!("unknown hero {raw}")))
}

fn write_equipment(writer: &mut WireWriter<'_>, equipment: &Equipment) -> Result<()> {
    writer.write_count(equipment.len())?;
    for (slot, item) in equipment {
        writer.write_str(slot)?;
        writer.write_str(item)?;
    }
    Ok(())
}

fn read_equipment(reader: &mut WireReader<'_>) -> Result<Equipment> {
    let count = reader.read_count()?;
    let mut equipment = Equipment::new();
    for _ in 0..count {
        let slot = reader.read_str()?;
        let item = reader.read_str()?;
        if equipment.insert(slot, item).is_some() {
            return Err(SessionError::malformed("duplicate equipment slot"));
        }
    }
    Ok(equipment)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSeed {
    pub seed: i32,
}

impl MessageFrame for SetSeed {
    const TAG: FrameTag = FrameTag::SetSeed;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_i32(self.seed);
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            seed: reader.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    pub hero: Hero,
    pub name: String,
}

impl MessageFrame for JoinGame {
    const TAG: FrameTag = FrameTag::JoinGame;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_u8(self.hero.as_u8());
        writer.write_str(&self.name)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let hero = read_hero(reader)?;
        let name = reader.read_str()?;
        Ok(Self { hero, name })
    }
}

/// Position of one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerLocation {
    pub id: MobId,
    pub position: Point,
}

impl From<&Player> for PlayerLocation {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id(),
            position: player.mob.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatePlayers {
    pub players: Vec<PlayerLocation>,
}

impl MessageFrame for LocatePlayers {
    const TAG: FrameTag = FrameTag::LocatePlayers;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_count(self.players.len())?;
        for location in &self.players {
            writer.write_u32(location.id.get());
            writer.write_f32(location.position.x);
            writer.write_f32(location.position.y);
        }
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let count = reader.read_count()?;
        let mut players = Vec::with_capacity(count.min(reader.remaining() / 12));
        for _ in 0..count {
            let id = read_mob_id(reader)?;
            let x = reader.read_f32()?;
            let y = reader.read_f32()?;
            players.push(PlayerLocation {
                id,
                position: Point::new(x, y),
            });
        }
        Ok(Self { players })
    }
}

/// Everything a client needs to render one player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSummary {
    pub id: MobId,
    pub name: String,
    pub hero: Hero,
    pub position: Point,
    pub movement_speed: f32,
    pub direction: u8,
    pub movement_type: MovementType,
    pub equipment: Equipment,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id(),
            name: player.name().to_string(),
            hero: player.hero,
            position: player.mob.position,
            movement_speed: player.mob.movement_speed,
            direction: player.mob.direction,
            movement_type: player.mob.movement_type,
            equipment: player.equipment.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub players: Vec<PlayerSummary>,
}

impl MessageFrame for PlayerInfo {
    const TAG: FrameTag = FrameTag::PlayerInfo;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_count(self.players.len())?;
        for player in &self.players {
            writer.write_u32(player.id.get());
            writer.write_str(&player.name)?;
            writer.write_u8(player.hero.as_u8());
            writer.write_f32(player.position.x);
            writer.write_f32(player.position.y);
            writer.write_f32(player.movement_speed);
            writer.write_u8(player.direction);
            writer.write_u8(player.movement_type.as_u8());
            write_equipment(writer, &player.equipment)?;
        }
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let count = reader.read_count()?;
        let mut players = Vec::new();
        for _ in 0..count {
            let id = read_mob_id(reader)?;
            let name = reader.read_str()?;
            let hero = read_hero(reader)?;
            let x = reader.read_f32()?;
            let y = reader.read_f32()?;
            let movement_speed = reader.read_f32()?;
            let direction = reader.read_u8()?;
            let movement_type = read_movement_type(reader)?;
            let equipment = read_equipment(reader)?;
            players.push(PlayerSummary {
                id,
                name,
                hero,
                position: Point::new(x, y),
                movement_speed,
                direction,
                movement_type,
                equipment,
            });
        }
        Ok(Self { players })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusOnPlayer {
    pub id: MobId,
}

impl MessageFrame for FocusOnPlayer {
    const TAG: FrameTag = FrameTag::FocusOnPlayer;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_u32(self.id.get());
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            id: read_mob_id(reader)?,
        })
    }
}

/// Heading command. `direction` travels raw; the server reduces it to a sector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub direction: u8,
    pub movement_type: MovementType,
}

impl MessageFrame for MoveRequest {
    const TAG: FrameTag = FrameTag::MoveRequest;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_u8(self.direction);
        writer.write_u8(self.movement_type.as_u8());
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let direction = reader.read_u8()?;
        let movement_type = read_movement_type(reader)?;
        Ok(Self {
            direction,
            movement_type,
        })
    }
}

/// Target-cell movement command.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveTo {
    pub target: Point,
    pub movement_type: MovementType,
}

impl MessageFrame for MoveTo {
    const TAG: FrameTag = FrameTag::MoveTo;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_f32(self.target.x);
        writer.write_f32(self.target.y);
        writer.write_u8(self.movement_type.as_u8());
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let x = reader.read_f32()?;
        let y = reader.read_f32()?;
        let movement_type = read_movement_type(reader)?;
        Ok(Self {
            target: Point::new(x, y),
            movement_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEquipment {
    pub slot: String,
    pub item: String,
}

impl MessageFrame for UpdateEquipment {
    const TAG: FrameTag = FrameTag::UpdateEquipment;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_str(&self.slot)?;
        writer.write_str(&self.item)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let slot = reader.read_str()?;
        let item = reader.read_str()?;
        Ok(Self { slot, item })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEquipment {
    pub id: MobId,
    pub equipment: Equipment,
}

impl MessageFrame for ChangeEquipment {
    const TAG: FrameTag = FrameTag::ChangeEquipment;

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_u32(self.id.get());
        write_equipment(writer, &self.equipment)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let id = read_mob_id(reader)?;
        let equipment = read_equipment(reader)?;
        Ok(Self { id, equipment })
    }
}

/// Any frame variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SetSeed(SetSeed),
    JoinGame(JoinGame),
    LocatePlayers(LocatePlayers),
    PlayerInfo(PlayerInfo),
    FocusOnPlayer(FocusOnPlayer),
    MoveRequest(MoveRequest),
    MoveTo(MoveTo),
    UpdateEquipment(UpdateEquipment),
    ChangeEquipment(ChangeEquipment),
}

macro_rules! frame_variants {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for Frame {
                fn from(frame: $variant) -> Self {
                    Frame::$variant(frame)
                }
            }
        )+

        impl Frame {
            pub fn tag(&self) -> FrameTag {
                match self {
                    $(Frame::$variant(_) => <$variant as MessageFrame>::TAG,)+
                }
            }

            /// Encode the payload (tag excluded).
            pub fn encode_payload(&self) -> Result<Bytes> {
                let mut buf = BytesMut::new();
                let mut writer = WireWriter::new(&mut buf);
                match self {
                    $(Frame::$variant(frame) => frame.encode(&mut writer)?,)+
                }
                Ok(buf.freeze())
            }
        }
    };
}

frame_variants!(
    SetSeed,
    JoinGame,
    LocatePlayers,
    PlayerInfo,
    FocusOnPlayer,
    MoveRequest,
    MoveTo,
    UpdateEquipment,
    ChangeEquipment,
);

impl Frame {
    pub fn name(&self) -> &'static str {
        self.tag().name()
    }

    /// Tag plus encoded payload, ready for the codec.
    pub fn to_raw(&self) -> Result<RawFrame> {
        Ok(RawFrame::new(self.tag().as_u8(), self.encode_payload()?))
    }

    /// Hand the frame to `handler` on behalf of `client`.
    pub fn process(self, client: ClientId, handler: &mut dyn FrameHandler) -> Result<()> {
        match self {
            Frame::SetSeed(frame) => handler.on_set_seed(client, frame),
            Frame::JoinGame(frame) => handler.on_join_game(client, frame),
            Frame::LocatePlayers(frame) => handler.on_locate_players(client, frame),
            Frame::PlayerInfo(frame) => handler.on_player_info(client, frame),
            Frame::FocusOnPlayer(frame) => handler.on_focus_on_player(client, frame),
            Frame::MoveRequest(frame) => handler.on_move_request(client, frame),
            Frame::MoveTo(frame) => handler.on_move_to(client, frame),
            Frame::UpdateEquipment(frame) => handler.on_update_equipment(client, frame),
            Frame::ChangeEquipment(frame) => handler.on_change_equipment(client, frame),
        }
    }
}

/// Process step for decoded frames.
///
/// Each side overrides the frames it accepts; the rest are rejected with
/// `UnexpectedFrame`.
pub trait FrameHandler {
    fn on_set_seed(&mut self, _client: ClientId, _frame: SetSeed) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::SetSeed.name()))
    }

    fn on_join_game(&mut self, _client: ClientId, _frame: JoinGame) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::JoinGame.name()))
    }

    fn on_locate_players(&mut self, _client: ClientId, _frame: LocatePlayers) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::LocatePlayers.name()))
    }

    fn on_player_info(&mut self, _client: ClientId, _frame: PlayerInfo) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::PlayerInfo.name()))
    }

    fn on_focus_on_player(&mut self, _client: ClientId, _frame: FocusOnPlayer) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::FocusOnPlayer.name()))
    }

    fn on_move_request(&mut self, _client: ClientId, _frame: MoveRequest) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::MoveRequest.name()))
    }

    fn on_move_to(&mut self, _client: ClientId, _frame: MoveTo) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::MoveTo.name()))
    }

    fn on_update_equipment(&mut self, _client: ClientId, _frame: UpdateEquipment) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::UpdateEquipment.name()))
    }

    fn on_change_equipment(&mut self, _client: ClientId, _frame: ChangeEquipment) -> Result<()> {
        Err(SessionError::UnexpectedFrame(FrameTag::ChangeEquipment.name()))
    }
}
