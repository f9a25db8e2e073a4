//! Console lines and command replies in, subscriber frames out

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use tf2_roster_relay::config::TimingConfig;
use tf2_roster_relay::relay::{spawn_core, Core};
use tf2_roster_relay::{
    EngineInput, NullSink, PersistenceSink, RefreshCommand, SessionIdentity, SqliteSink,
};

use crate::common::*;

fn start(
    gateway: Arc<ScriptedGateway>,
    sink: Arc<dyn PersistenceSink>,
) -> (Core, tokio::sync::mpsc::UnboundedReceiver<String>, CancellationToken) {
    let (slot, rx) = attached_slot();
    let cancel = CancellationToken::new();
    let core = spawn_core(
        &TimingConfig::default(),
        SessionIdentity::new("Me"),
        gateway,
        sink,
        slot,
        &cancel,
    );
    (core, rx, cancel)
}

async fn feed(core: &Core, line: impl Into<String>) {
    core.inputs
        .send(EngineInput::Line(line.into()))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn startup_refresh_builds_enriched_roster() {
    let gateway = ScriptedGateway::new();
    gateway.reply(
        "status",
        status_reply(&[status_line(3, "Carl", 5), status_line(4, "Me", 9)]),
    );
    gateway.reply(
        "tf_lobby_debug",
        lobby_reply(&[(5, "TF_GC_TEAM_INVADERS", "MATCH_PLAYER")]),
    );

    let (_core, mut rx, cancel) = start(gateway.clone(), Arc::new(NullSink));
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(gateway.calls()[..2], ["tf_lobby_debug", "status"]);

    let frames = drain(&mut rx);
    let updates = of_type(&frames, "player-update");
    let latest = updates.last().expect("at least one roster push");
    let players = latest["currentPlayers"].as_array().unwrap();
    assert_eq!(players.len(), 2);

    let carl = &players[0];
    assert_eq!(carl["steamId"], steam64(5));
    assert_eq!(carl["name"], "Carl");
    assert_eq!(carl["team"], "BLU");
    assert_eq!(carl["type"], "MATCH_PLAYER");
    assert_eq!(carl["memberType"], "Member");
    assert_eq!(carl["isMe"], false);

    let me = &players[1];
    assert_eq!(me["isMe"], true);
    assert_eq!(me["team"], "");

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn status_lobby_status_keeps_team() {
    let gateway = ScriptedGateway::new();
    let (core, mut rx, cancel) = start(gateway, Arc::new(NullSink));

    feed(&core, status_line(3, "Carl", 5)).await;
    core.inputs
        .send(EngineInput::CommandOutput {
            command: RefreshCommand::LobbyDebug,
            text: lobby_reply(&[(5, "TF_GC_TEAM_INVADERS", "MATCH_PLAYER")]),
        })
        .await
        .unwrap();
    feed(&core, status_line(3, "Carl", 5)).await;
    core.inputs
        .send(EngineInput::CommandOutput {
            command: RefreshCommand::LobbyDebug,
            text: "Failed to find lobby shared object\n".to_string(),
        })
        .await
        .unwrap();
    feed(&core, status_line(3, "Carl", 5)).await;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let record = &core.state.snapshot()[0];
    assert_eq!(record.steam_id.0, steam64(5));
    assert_eq!(record.name, "Carl");
    assert_eq!(record.tags.team, "BLU");

    let frames = drain(&mut rx);
    let latest = of_type(&frames, "player-update").pop().unwrap().clone();
    assert_eq!(latest["currentPlayers"][0]["team"], "BLU");

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn burst_of_updates_is_one_push() {
    let gateway = ScriptedGateway::new();
    let (core, mut rx, cancel) = start(gateway, Arc::new(NullSink));

    // Let the startup refresh fail and the first ticks pass
    tokio::time::sleep(Duration::from_millis(1100)).await;
    drain(&mut rx);

    for i in 0..30u64 {
        feed(&core, status_line(i as u32, &format!("player{}", i % 6), i % 6)).await;
    }
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let frames = drain(&mut rx);
    let updates = of_type(&frames, "player-update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["currentPlayers"].as_array().unwrap().len(), 6);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn frags_are_pushed_without_waiting_for_a_tick() {
    let gateway = ScriptedGateway::new();
    let (core, mut rx, cancel) = start(gateway, Arc::new(NullSink));

    feed(&core, status_line(3, "Carl", 5)).await;
    feed(&core, "Carl killed Someone Else with tomislav.").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let frames = drain(&mut rx);
    let frags = of_type(&frames, "frag");
    assert_eq!(frags.len(), 1);
    assert_eq!(frags[0]["frag"]["killer"], "Carl");
    assert_eq!(frags[0]["frag"]["killerSteamId"], steam64(5));
    assert_eq!(frags[0]["frag"]["victim"], "Someone Else");
    assert_eq!(frags[0]["frag"]["victimSteamId"], 0);
    assert_eq!(frags[0]["frag"]["crit"], false);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn chat_is_persisted_with_resolved_speaker() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(SqliteSink::open(&dir.path().join("relay.sqlite3")).unwrap());
    let gateway = ScriptedGateway::new();
    let (core, _rx, cancel) = start(gateway, sink.clone());

    feed(&core, status_line(3, "Carl", 5)).await;
    feed(&core, "*DEAD* Carl :  nice shot").await;
    feed(&core, "(TEAM) Ghost :  who am i").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(sink.chat_count().unwrap(), 2);
    assert_eq!(sink.player_count().unwrap(), 1);
    assert_eq!(sink.player_name(steam64(5)).unwrap().as_deref(), Some("Carl"));
    // Speakers are never added to the roster
    assert_eq!(core.state.player_count(), 1);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn eviction_is_pushed_as_empty_roster() {
    let gateway = ScriptedGateway::new();
    let (core, mut rx, cancel) = start(gateway, Arc::new(NullSink));

    feed(&core, status_line(3, "Carl", 5)).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    drain(&mut rx);

    let later = Utc::now() + chrono::Duration::seconds(21);
    let evicted = core.state.evict_stale(later, Duration::from_secs(20));
    assert_eq!(evicted.len(), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let frames = drain(&mut rx);
    let updates = of_type(&frames, "player-update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["currentPlayers"], serde_json::json!([]));

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn refresh_marker_requests_both_commands() {
    let gateway = ScriptedGateway::new();
    let (core, _rx, cancel) = start(gateway.clone(), Arc::new(NullSink));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let startup_calls = gateway.calls().len();

    feed(&core, "Lobby updated").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let calls = gateway.calls();
    assert_eq!(calls.len(), startup_calls + 2);
    assert_eq!(calls[startup_calls..], ["tf_lobby_debug", "status"]);

    cancel.cancel();
}
