//! Property-based tests using proptest
//!
//! Frame encoding, repository identity and movement invariants checked over
//! randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use proptest::prelude::*;
use session_core::core::codec::FrameCodec;
use session_core::protocol::frame::*;
use session_core::protocol::registry::FrameRegistry;
use session_core::sim::data::LevelExperienceConfig;
use session_core::sim::mob::{BaseStats, Enemy, Equipment, Hero, Mob, MobId, MovementType, Point};
use session_core::sim::movement::{advance, direction_sector, sector_for_degrees, DIRECTION_SECTORS};
use session_core::sim::repository::MobRepository;
use tokio_util::codec::{Decoder, Encoder};

fn coord() -> impl Strategy<Value = f32> {
    -10_000.0f32..10_000.0f32
}

fn point() -> impl Strategy<Value = Point> {
    (coord(), coord()).prop_map(|(x, y)| Point::new(x, y))
}

fn mob_id() -> impl Strategy<Value = MobId> {
    (1u32..=u32::MAX).prop_map(|raw| MobId::new(raw).expect("non-zero"))
}

fn hero() -> impl Strategy<Value = Hero> {
    prop::sample::select(Hero::ALL.to_vec())
}

fn movement_type() -> impl Strategy<Value = MovementType> {
    prop::sample::select(MovementType::ALL.to_vec())
}

fn name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-zA-Z0-9 ]{1,16}",
        "\\PC{0,24}",
    ]
}

fn equipment() -> impl Strategy<Value = Equipment> {
    prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..6)
}

fn summary() -> impl Strategy<Value = PlayerSummary> {
    (
        mob_id(),
        name(),
        hero(),
        point(),
        0.0f32..20.0,
        any::<u8>(),
        movement_type(),
        equipment(),
    )
        .prop_map(
            |(id, name, hero, position, movement_speed, direction, movement_type, equipment)| {
                PlayerSummary {
                    id,
                    name,
                    hero,
                    position,
                    movement_speed,
                    direction,
                    movement_type,
                    equipment,
                }
            },
        )
}

fn frame() -> impl Strategy<Value = Frame> {
    prop_oneof![
        any::<i32>().prop_map(|seed| Frame::from(SetSeed { seed })),
        (hero(), name()).prop_map(|(hero, name)| Frame::from(JoinGame { hero, name })),
        prop::collection::vec(
            (mob_id(), point()).prop_map(|(id, position)| PlayerLocation { id, position }),
            0..8
        )
        .prop_map(|players| Frame::from(LocatePlayers { players })),
        prop::collection::vec(summary(), 0..4)
            .prop_map(|players| Frame::from(PlayerInfo { players })),
        mob_id().prop_map(|id| Frame::from(FocusOnPlayer { id })),
        (any::<u8>(), movement_type()).prop_map(|(direction, movement_type)| {
            Frame::from(MoveRequest {
                direction,
                movement_type,
            })
        }),
        (point(), movement_type()).prop_map(|(target, movement_type)| {
            Frame::from(MoveTo {
                target,
                movement_type,
            })
        }),
        ("[a-z]{0,8}", "[a-z0-9]{0,8}")
            .prop_map(|(slot, item)| Frame::from(UpdateEquipment { slot, item })),
        (mob_id(), equipment())
            .prop_map(|(id, equipment)| Frame::from(ChangeEquipment { id, equipment })),
    ]
}

// Property: every frame survives encode → registry decode unchanged
proptest! {
    #[test]
    fn prop_frame_roundtrip(frame in frame()) {
        let registry = FrameRegistry::standard();
        let raw = frame.to_raw().expect("encode");
        prop_assert_eq!(raw.tag, frame.tag().as_u8());

        let decoded = registry.decode_raw(&raw).expect("decode");
        prop_assert_eq!(decoded, frame);
    }
}

// Property: the stream envelope round-trips through the codec
proptest! {
    #[test]
    fn prop_frame_roundtrip_through_codec(frames in prop::collection::vec(frame(), 1..6)) {
        let registry = FrameRegistry::standard();
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        for frame in &frames {
            codec.encode(frame.to_raw().expect("encode"), &mut buf).expect("envelope");
        }

        let mut decoded = Vec::new();
        while let Some(raw) = codec.decode(&mut buf).expect("codec") {
            decoded.push(registry.decode_raw(&raw).expect("decode"));
        }
        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded, frames);
    }
}

// Property: encoding is deterministic
proptest! {
    #[test]
    fn prop_encoding_deterministic(frame in frame()) {
        let first = frame.encode_payload().expect("encode");
        let second = frame.encode_payload().expect("encode");
        prop_assert_eq!(first, second);
    }
}

// Property: truncating any non-empty payload never decodes successfully
proptest! {
    #[test]
    fn prop_truncated_payload_rejected(frame in frame(), cut in any::<prop::sample::Index>()) {
        let registry = FrameRegistry::standard();
        let raw = frame.to_raw().expect("encode");
        prop_assume!(!raw.payload.is_empty());

        let keep = cut.index(raw.payload.len());
        let result = registry.decode(raw.tag, &raw.payload[..keep]);
        prop_assert!(result.is_err());
    }
}

// Property: arbitrary bytes never panic the decoder
proptest! {
    #[test]
    fn prop_decoder_never_panics(tag in any::<u8>(), payload in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = FrameRegistry::standard().decode(tag, &payload);
    }
}

#[derive(Debug, Clone)]
enum RepoOp {
    AddPlayer,
    AddEnemy,
    AddMob,
    Remove(prop::sample::Index),
    RemovePlayer(prop::sample::Index),
}

fn repo_op() -> impl Strategy<Value = RepoOp> {
    prop_oneof![
        3 => Just(RepoOp::AddPlayer),
        2 => Just(RepoOp::AddEnemy),
        1 => Just(RepoOp::AddMob),
        2 => any::<prop::sample::Index>().prop_map(RepoOp::Remove),
        1 => any::<prop::sample::Index>().prop_map(RepoOp::RemovePlayer),
    ]
}

fn stats() -> BaseStats {
    BaseStats {
        vitality: 20,
        strength: 20,
        dexterity: 20,
        energy: 20,
        walk_velocity: 6.0,
        run_velocity: 9.0,
    }
}

// Property: ids stay unique, views stay consistent, the next id is always free
proptest! {
    #[test]
    fn prop_repository_ids_unique(ops in prop::collection::vec(repo_op(), 0..80)) {
        let mut repo = MobRepository::new();
        let mut client = 0u64;

        for op in ops {
            match op {
                RepoOp::AddPlayer => {
                    let id = repo.next_available_id().expect("id");
                    client += 1;
                    let player = session_core::sim::mob::Player::new(
                        id,
                        ClientId(client),
                        "p",
                        Hero::Amazon,
                        Point::default(),
                        stats(),
                        LevelExperienceConfig::single(100),
                    );
                    repo.add_player(player).expect("fresh id");
                }
                RepoOp::AddEnemy => {
                    let id = repo.next_available_id().expect("id");
                    repo.add_enemy(Enemy::new(id, "fallen", Point::default())).expect("fresh id");
                }
                RepoOp::AddMob => {
                    let id = repo.next_available_id().expect("id");
                    repo.add_mob(Mob::new(id, "critter", Point::default())).expect("fresh id");
                }
                RepoOp::Remove(index) => {
                    let ids: Vec<MobId> = repo.mobs().map(|e| e.id()).collect();
                    if !ids.is_empty() {
                        let id = ids[index.index(ids.len())];
                        prop_assert!(repo.remove_mob(id).is_some());
                        prop_assert!(!repo.contains(id));
                    }
                }
                RepoOp::RemovePlayer(index) => {
                    let ids: Vec<MobId> = repo.players().map(|p| p.id()).collect();
                    if !ids.is_empty() {
                        let id = ids[index.index(ids.len())];
                        prop_assert!(repo.remove_player(id).is_some());
                    }
                }
            }

            prop_assert!(repo.is_consistent());
            let next = repo.next_available_id().expect("id");
            prop_assert!(!repo.contains(next));
            prop_assert_eq!(repo.len(), repo.mobs().count());
            prop_assert!(repo.player_count() + repo.enemy_count() <= repo.len());
        }
    }
}

// Property: re-adding a tracked id is always rejected
proptest! {
    #[test]
    fn prop_duplicate_add_rejected(raw in 1u32..1000) {
        let mut repo = MobRepository::new();
        let id = MobId::new(raw).expect("non-zero");
        repo.add_mob(Mob::new(id, "a", Point::default())).expect("first add");
        prop_assert!(repo.add_enemy(Enemy::new(id, "b", Point::default())).is_err());
        prop_assert_eq!(repo.len(), 1);
    }
}

// Property: quantization always lands in [0, 16)
proptest! {
    #[test]
    fn prop_sector_in_range(degrees in -1.0e6f32..1.0e6f32, dx in -1.0e3f32..1.0e3, dy in -1.0e3f32..1.0e3) {
        prop_assert!(sector_for_degrees(degrees) < DIRECTION_SECTORS);
        prop_assert!(direction_sector(dx, dy) < DIRECTION_SECTORS);
    }
}

// Property: a travel distance covering the whole path ends exactly on the last waypoint
proptest! {
    #[test]
    fn prop_advance_never_overshoots(
        start in point(),
        path in prop::collection::vec(point(), 1..6),
        speed in 0.5f32..50.0,
    ) {
        let mut mob = Mob::new(MobId::new(1).expect("non-zero"), "walker", start);
        mob.movement_speed = speed;
        mob.movement_type = MovementType::Running;
        mob.waypoints.extend(path.iter().copied());

        let mut length = 0.0f32;
        let mut from = start;
        for &p in &path {
            length += from.distance_to(p);
            from = p;
        }

        advance(&mut mob, (length / speed) * 1.01 + 1.0);

        prop_assert_eq!(mob.position, *path.last().expect("non-empty"));
        prop_assert!(mob.waypoints.is_empty());
        prop_assert_eq!(mob.movement_type, MovementType::Stopped);
    }
}
