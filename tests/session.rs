//! End-to-end tests over real sockets: endpoint, host and proxy together,
//! plus scripted servers for the failure paths of the join handshake.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use session_core::config::SessionConfig;
use session_core::core::codec::FrameCodec;
use session_core::protocol::frame::{Frame, FrameTag, LocatePlayers, SetSeed};
use session_core::protocol::registry::FrameRegistry;
use session_core::service::endpoint::{EndpointState, SessionServer};
use session_core::service::proxy::SessionProxy;
use session_core::service::world::ClientEvent;
use session_core::sim::data::GameData;
use session_core::sim::mob::{Hero, MovementType, Point};
use session_core::sim::server::lock_game;
use session_core::utils::SessionMetrics;
use session_core::SessionError;

const HEROES: &str = r#"
    [heroes.barbarian]
    vitality = 25
    strength = 30
    dexterity = 20
    energy = 10
    walk_velocity = 6.0
    run_velocity = 9.0
    initial_equipment = [
        { item = "hax", slot = "rarm" },
        { item = "buc", slot = "larm" },
        { item = "hp1" },
    ]

    [heroes.sorceress]
    vitality = 10
    strength = 10
    dexterity = 25
    energy = 35
    walk_velocity = 6.0
    run_velocity = 9.0
    initial_equipment = [{ item = "sst", slot = "rarm" }]

    [experience.barbarian]
    thresholds = [0, 500, 1500]
"#;

fn data() -> Arc<GameData> {
    Arc::new(GameData::from_toml(HEROES).expect("hero tables"))
}

fn config() -> SessionConfig {
    SessionConfig::default_with_overrides(|config| {
        config.server.address = "127.0.0.1:0".into();
        config.client.response_timeout = Duration::from_secs(5);
    })
}

fn remote_config(addr: SocketAddr) -> SessionConfig {
    SessionConfig::default_with_overrides(|config| {
        config.client.address = addr.to_string();
        config.client.response_timeout = Duration::from_secs(5);
    })
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Accept one connection and hand it to `script`.
async fn scripted_server<F, Fut>(script: F) -> SocketAddr
where
    F: FnOnce(Framed<TcpStream, FrameCodec>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        script(Framed::new(stream, FrameCodec::default())).await;
    });
    addr
}

async fn read_frame(framed: &mut Framed<TcpStream, FrameCodec>) -> Frame {
    let raw = framed.next().await.expect("frame").expect("envelope");
    FrameRegistry::standard().decode_raw(&raw).expect("decode")
}

async fn write_frame(framed: &mut Framed<TcpStream, FrameCodec>, frame: Frame) {
    framed.send(frame.to_raw().unwrap()).await.unwrap();
}

#[tokio::test]
async fn test_local_join_completes_handshake() {
    let metrics = Arc::new(SessionMetrics::new());
    let (proxy, mut events) = SessionProxy::initialize_local(&config(), data(), metrics.clone())
        .await
        .unwrap();

    let joined = proxy.join_game("Grom", Hero::Barbarian).await.unwrap();
    assert_eq!(joined.player_id.get(), 1);

    let server_seed = {
        let local = proxy.local_server().unwrap();
        let game = lock_game(local.game()).unwrap();
        game.seed()
    };
    assert_eq!(Some(joined.seed), server_seed);

    let world = proxy.world().unwrap();
    let me = world.focused_player().expect("focused player");
    assert_eq!(me.name, "Grom");
    assert_eq!(me.position, Point::new(20.5, 20.5));
    assert_eq!(me.equipment.len(), 2);

    assert_eq!(events.recv().await, Some(ClientEvent::SeedSet(joined.seed)));
    assert!(matches!(events.recv().await, Some(ClientEvent::PlayersUpdated(p)) if p.len() == 1));
    assert!(matches!(events.recv().await, Some(ClientEvent::PlayersLocated(_))));
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Focused(joined.player_id))
    );

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.players_spawned, 1);
    assert!(snapshot.handshakes_success >= 1);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_client_sees_both_players() {
    let metrics = Arc::new(SessionMetrics::new());
    let (host, _events) = SessionProxy::initialize_local(&config(), data(), metrics.clone())
        .await
        .unwrap();
    host.join_game("first", Hero::Barbarian).await.unwrap();

    let addr = host.local_server().unwrap().local_addr();
    let (guest, _guest_events) = SessionProxy::initialize(&remote_config(addr), metrics)
        .await
        .unwrap();
    let joined = guest.join_game("second", Hero::Sorceress).await.unwrap();

    assert_eq!(joined.player_id.get(), 2);
    let world = guest.world().unwrap();
    assert_eq!(world.players().count(), 2);
    assert_eq!(world.focus(), Some(joined.player_id));

    guest.shutdown().await.unwrap();
    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_move_to_then_tick_reaches_target() {
    let (proxy, _events) =
        SessionProxy::initialize_local(&config(), data(), Arc::new(SessionMetrics::new()))
            .await
            .unwrap();
    let joined = proxy.join_game("walker", Hero::Barbarian).await.unwrap();
    proxy
        .move_to(Point::new(24.5, 20.5), MovementType::Running)
        .await
        .unwrap();

    let local = proxy.local_server().unwrap();
    let applied = eventually(|| {
        let game = lock_game(local.game()).unwrap();
        game.repository()
            .player(joined.player_id)
            .is_some_and(|p| p.mob.movement_type == MovementType::Running)
    })
    .await;
    assert!(applied, "move was never applied");

    local.tick(1_000).unwrap();
    {
        let game = lock_game(local.game()).unwrap();
        let player = game.repository().player(joined.player_id).unwrap();
        // run velocity 9.0 scaled by 0.25
        assert!((player.mob.position.x - 22.75).abs() < 1e-4);
        assert_eq!(player.mob.movement_type, MovementType::Running);
    }

    local.tick(10_000).unwrap();
    let game = lock_game(local.game()).unwrap();
    let player = game.repository().player(joined.player_id).unwrap();
    assert_eq!(player.mob.position, Point::new(24.5, 20.5));
    assert_eq!(player.mob.movement_type, MovementType::Stopped);
}

#[tokio::test]
async fn test_move_request_sets_heading() {
    let (proxy, _events) =
        SessionProxy::initialize_local(&config(), data(), Arc::new(SessionMetrics::new()))
            .await
            .unwrap();
    let joined = proxy.join_game("drifter", Hero::Sorceress).await.unwrap();
    proxy.move_request(20, MovementType::Walking).await.unwrap();
    // requests on one connection are handled in order, so this doubles as a barrier
    proxy.update_equipment("head", "cap").await.unwrap();

    let local = proxy.local_server().unwrap();
    {
        let game = lock_game(local.game()).unwrap();
        let player = game.repository().player(joined.player_id).unwrap();
        assert_eq!(player.mob.direction, 4);
        assert_eq!(player.mob.movement_type, MovementType::Walking);
        assert!((player.mob.movement_speed - 1.5).abs() < f32::EPSILON);
    }

    local.tick(2_000).unwrap();
    let game = lock_game(local.game()).unwrap();
    let player = game.repository().player(joined.player_id).unwrap();
    assert!((player.mob.position.x - 20.5).abs() < 1e-4);
    assert!((player.mob.position.y - 23.5).abs() < 1e-4);
}

#[tokio::test]
async fn test_update_equipment_round_trip() {
    let (proxy, mut events) =
        SessionProxy::initialize_local(&config(), data(), Arc::new(SessionMetrics::new()))
            .await
            .unwrap();
    let joined = proxy.join_game("Grom", Hero::Barbarian).await.unwrap();
    for _ in 0..4 {
        events.recv().await.unwrap();
    }

    let equipment = proxy.update_equipment("rarm", "axe").await.unwrap();
    assert_eq!(equipment.get("rarm").map(String::as_str), Some("axe"));
    assert_eq!(equipment.get("larm").map(String::as_str), Some("buc"));

    let world = proxy.world().unwrap();
    assert_eq!(world.player(joined.player_id).unwrap().equipment, equipment);
    assert!(matches!(
        events.recv().await,
        Some(ClientEvent::EquipmentChanged { id, .. }) if id == joined.player_id
    ));
}

#[tokio::test]
async fn test_missing_hero_config_disconnects_client() {
    let metrics = Arc::new(SessionMetrics::new());
    let (proxy, _events) = SessionProxy::initialize_local(&config(), data(), metrics.clone())
        .await
        .unwrap();

    let result = proxy.join_game("Tal Rasha", Hero::Necromancer).await;
    assert!(matches!(result, Err(SessionError::ConnectionClosed)));
    assert!(metrics.snapshot().handshakes_failed >= 1);

    let game = lock_game(proxy.local_server().unwrap().game()).unwrap();
    assert!(game.repository().is_empty());
}

#[tokio::test]
async fn test_disconnect_removes_player() {
    let metrics = Arc::new(SessionMetrics::new());
    let (host, _events) = SessionProxy::initialize_local(&config(), data(), metrics.clone())
        .await
        .unwrap();
    host.join_game("stays", Hero::Barbarian).await.unwrap();

    let local = host.local_server().unwrap();
    let (guest, _guest_events) =
        SessionProxy::initialize(&remote_config(local.local_addr()), metrics)
            .await
            .unwrap();
    guest.join_game("leaves", Hero::Barbarian).await.unwrap();
    assert_eq!(lock_game(local.game()).unwrap().repository().player_count(), 2);

    guest.shutdown().await.unwrap();
    drop(guest);

    let removed = eventually(|| lock_game(local.game()).unwrap().repository().player_count() == 1).await;
    assert!(removed, "departed player still tracked");
}

#[tokio::test]
async fn test_repeated_join_reuses_player() {
    let (proxy, _events) =
        SessionProxy::initialize_local(&config(), data(), Arc::new(SessionMetrics::new()))
            .await
            .unwrap();
    let first = proxy.join_game("twice", Hero::Barbarian).await.unwrap();
    let again = proxy.join_game("twice", Hero::Sorceress).await.unwrap();
    assert_eq!(again.player_id, first.player_id);

    let local = proxy.local_server().unwrap();
    {
        let game = lock_game(local.game()).unwrap();
        assert_eq!(game.repository().player_count(), 1);
        let player = game.repository().player(first.player_id).unwrap();
        assert_eq!(player.hero, Hero::Barbarian);
    }

    let (guest, _guest_events) = SessionProxy::initialize(
        &remote_config(local.local_addr()),
        Arc::new(SessionMetrics::new()),
    )
    .await
    .unwrap();
    guest.join_game("again", Hero::Barbarian).await.unwrap();
    guest.join_game("again", Hero::Barbarian).await.unwrap();
    assert_eq!(lock_game(local.game()).unwrap().repository().player_count(), 2);

    guest.shutdown().await.unwrap();
    drop(guest);

    let removed = eventually(|| lock_game(local.game()).unwrap().repository().player_count() == 1).await;
    assert!(removed, "player of a departed client still tracked");
}

#[tokio::test]
async fn test_movement_before_join_is_ignored() {
    let metrics = Arc::new(SessionMetrics::new());
    let (proxy, _events) = SessionProxy::initialize_local(&config(), data(), metrics)
        .await
        .unwrap();

    proxy.move_request(3, MovementType::Walking).await.unwrap();
    proxy
        .move_to(Point::new(22.5, 20.5), MovementType::Running)
        .await
        .unwrap();

    let joined = proxy.join_game("late", Hero::Barbarian).await.unwrap();
    let game = lock_game(proxy.local_server().unwrap().game()).unwrap();
    let player = game.repository().player(joined.player_id).unwrap();
    assert_eq!(player.mob.movement_type, MovementType::Stopped);
    assert_eq!(player.mob.position, Point::new(20.5, 20.5));
}

#[tokio::test]
async fn test_client_resolves_hostnames() {
    let (host, _events) =
        SessionProxy::initialize_local(&config(), data(), Arc::new(SessionMetrics::new()))
            .await
            .unwrap();
    let port = host.local_server().unwrap().local_addr().port();
    let config = SessionConfig::default_with_overrides(|config| {
        config.client.address = format!("localhost:{port}");
        config.client.response_timeout = Duration::from_secs(5);
    });
    assert!(config.validate().is_empty());

    let (guest, _guest_events) = SessionProxy::initialize(&config, Arc::new(SessionMetrics::new()))
        .await
        .unwrap();
    let joined = guest.join_game("remote", Hero::Sorceress).await.unwrap();
    assert_eq!(joined.player_id.get(), 1);
}

#[tokio::test]
async fn test_out_of_order_response_is_sequence_violation() {
    let addr = scripted_server(|mut framed| async move {
        let join = read_frame(&mut framed).await;
        assert_eq!(join.tag(), FrameTag::JoinGame);
        write_frame(&mut framed, SetSeed { seed: 5 }.into()).await;
        write_frame(&mut framed, LocatePlayers { players: vec![] }.into()).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let metrics = Arc::new(SessionMetrics::new());
    let (proxy, _events) = SessionProxy::initialize(&remote_config(addr), metrics.clone())
        .await
        .unwrap();

    match proxy.join_game("x", Hero::Amazon).await {
        Err(SessionError::ProtocolSequenceViolation {
            slot,
            expected,
            received,
        }) => {
            assert_eq!(slot, 1);
            assert_eq!(expected, "PlayerInfo");
            assert_eq!(received, "LocatePlayers");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(metrics.snapshot().sequence_violations, 1);
    assert_eq!(proxy.world().unwrap().seed(), Some(5));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let addr = scripted_server(|mut framed| async move {
        let _join = read_frame(&mut framed).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let mut config = remote_config(addr);
    config.client.response_timeout = Duration::from_millis(200);
    let (proxy, _events) = SessionProxy::initialize(&config, Arc::new(SessionMetrics::new()))
        .await
        .unwrap();

    let result = proxy.join_game("x", Hero::Amazon).await;
    assert!(matches!(result, Err(SessionError::Timeout)));
}

#[tokio::test]
async fn test_disconnect_mid_handshake() {
    let addr = scripted_server(|mut framed| async move {
        let _join = read_frame(&mut framed).await;
        write_frame(&mut framed, SetSeed { seed: 1 }.into()).await;
    })
    .await;

    let (proxy, _events) =
        SessionProxy::initialize(&remote_config(addr), Arc::new(SessionMetrics::new()))
            .await
            .unwrap();

    let result = proxy.join_game("x", Hero::Amazon).await;
    assert!(matches!(result, Err(SessionError::ConnectionClosed)));
}

#[tokio::test]
async fn test_unknown_tag_closes_connection() {
    let metrics = Arc::new(SessionMetrics::new());
    let (proxy, _events) = SessionProxy::initialize_local(&config(), data(), metrics.clone())
        .await
        .unwrap();
    let addr = proxy.local_server().unwrap().local_addr();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[1, 0, 0, 0, 0xEE]).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should hang up")
        .unwrap();
    assert_eq!(read, 0);
    assert!(metrics.snapshot().malformed_frames >= 1);

    // other clients are unaffected
    proxy.join_game("still here", Hero::Barbarian).await.unwrap();
}

#[tokio::test]
async fn test_server_rejects_server_frames() {
    let (proxy, _events) =
        SessionProxy::initialize_local(&config(), data(), Arc::new(SessionMetrics::new()))
            .await
            .unwrap();
    let addr = proxy.local_server().unwrap().local_addr();

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, FrameCodec::default());
    write_frame(&mut framed, SetSeed { seed: 3 }.into()).await;

    let next = tokio::time::timeout(Duration::from_secs(2), framed.next())
        .await
        .expect("server should hang up");
    assert!(next.is_none());
}

#[tokio::test]
#[serial]
async fn test_endpoint_lifecycle() {
    let metrics = Arc::new(SessionMetrics::new());
    let config = config();
    let endpoint = SessionServer::new(&config.server, &config.transport, metrics);
    assert_eq!(endpoint.state(), EndpointState::Stopped);
    assert!(matches!(
        endpoint.wait_started().await,
        Err(SessionError::NotRunning)
    ));

    let (events_tx, _events_rx) = tokio::sync::mpsc::channel(8);
    endpoint.start(events_tx.clone()).unwrap();
    let addr = endpoint.wait_started().await.unwrap();
    assert_eq!(endpoint.state(), EndpointState::Running);
    assert_eq!(endpoint.local_addr(), Some(addr));
    assert!(endpoint.start(events_tx).is_err());

    TcpStream::connect(addr).await.unwrap();

    endpoint.shutdown().await.unwrap();
    assert_eq!(endpoint.state(), EndpointState::Stopped);
}

#[tokio::test]
#[serial]
async fn test_bind_failure_is_reported() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = config();
    config.server.address = taken.local_addr().unwrap().to_string();

    let endpoint = SessionServer::new(
        &config.server,
        &config.transport,
        Arc::new(SessionMetrics::new()),
    );
    let (events_tx, _events_rx) = tokio::sync::mpsc::channel(8);
    endpoint.start(events_tx).unwrap();

    assert!(matches!(
        endpoint.wait_started().await,
        Err(SessionError::TransportError(_))
    ));
    assert_eq!(endpoint.state(), EndpointState::Stopped);
}
