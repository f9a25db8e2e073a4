//! Startup and task wiring
//!
//! Startup is strictly ordered and every step before the tasks are spawned is
//! fatal on failure:
//!
//! 1. bind the push channel
//! 2. connect and authenticate RCON
//! 3. resolve the local player's name
//! 4. locate and empty the console log
//!
//! After that the engine, publisher, sweeper, scheduler, tailer and push
//! server run as independent tasks sharing one cancellation token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::parse_player_name;
use crate::config::{LogSourceConfig, RelayConfig, StoreConfig, TimingConfig};
use crate::engine::{Engine, EngineInput};
use crate::error::{RelayError, Result};
use crate::model::SessionIdentity;
use crate::publisher::UpdatePublisher;
use crate::push::{PushServer, SubscriberSlot};
use crate::rcon::{CommandGateway, RconGateway};
use crate::roster::ExpirySweeper;
use crate::scheduler::RefreshScheduler;
use crate::state::MatchState;
use crate::store::{NullSink, PersistenceSink, SqliteSink};
use crate::tail::{self, LogTailer};

/// Capacity of the engine input queue
const INPUT_QUEUE: usize = 1024;

/// How long shutdown waits for tasks to notice cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Ask the client who we are.
pub async fn resolve_identity(gateway: &dyn CommandGateway) -> Result<SessionIdentity> {
    let reply = gateway
        .execute("name")
        .await
        .map_err(|e| RelayError::startup(format!("Unable to query player name: {}", e)))?;

    match parse_player_name(&reply) {
        Some(name) => Ok(SessionIdentity::new(name)),
        None => Err(RelayError::startup(format!(
            "Unable to parse player name from {:?}",
            reply.trim()
        ))),
    }
}

/// Locate the console log and optionally empty it
pub fn prepare_log(config: &LogSourceConfig) -> Result<PathBuf> {
    let path = match &config.path {
        Some(path) => path.clone(),
        None => tail::detect_log_path()
            .ok_or_else(|| RelayError::startup("Unable to locate console.log; set log.path"))?,
    };

    if config.truncate_on_start {
        tail::truncate(&path)?;
        tracing::info!("Emptied {}", path.display());
    }
    Ok(path)
}

/// Open the configured sink; storage trouble degrades to no persistence
pub fn open_sink(config: &StoreConfig) -> Arc<dyn PersistenceSink> {
    if !config.enabled {
        tracing::info!("Persistence disabled");
        return Arc::new(NullSink);
    }

    let path = config.database_path();
    match SqliteSink::open(&path) {
        Ok(sink) => {
            tracing::info!("Storing players and chat in {}", path.display());
            Arc::new(sink)
        }
        Err(e) => {
            tracing::warn!("Unable to open {}: {}; persistence disabled", path.display(), e);
            Arc::new(NullSink)
        }
    }
}

/// Running engine and periodic tasks
pub struct Core {
    pub state: Arc<MatchState>,
    pub publisher: UpdatePublisher,
    /// Feed console lines and command replies here
    pub inputs: mpsc::Sender<EngineInput>,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Spawn the engine, publisher, sweeper and scheduler
pub fn spawn_core(
    timing: &TimingConfig,
    identity: SessionIdentity,
    gateway: Arc<dyn CommandGateway>,
    sink: Arc<dyn PersistenceSink>,
    slot: Arc<SubscriberSlot>,
    cancel: &CancellationToken,
) -> Core {
    let state = Arc::new(MatchState::new(identity));
    let (inputs, rx) = mpsc::channel(INPUT_QUEUE);

    let publisher = UpdatePublisher::new(Arc::clone(&state), slot, timing.publish_interval());
    let scheduler = RefreshScheduler::new(
        gateway,
        inputs.clone(),
        Arc::clone(&state),
        timing.refresh_interval(),
    );
    let sweeper = ExpirySweeper::new(
        Arc::clone(&state),
        timing.staleness_window(),
        timing.sweep_interval(),
    );
    let engine = Engine::new(
        Arc::clone(&state),
        publisher.clone(),
        sink,
        scheduler.clone(),
    );

    // Prime the roster instead of waiting a full refresh interval
    scheduler.tick();

    let tasks = vec![
        tokio::spawn(engine.run(rx, cancel.clone())),
        tokio::spawn(publisher.clone().run(cancel.clone())),
        tokio::spawn(sweeper.run(cancel.clone())),
        tokio::spawn(scheduler.run(cancel.clone())),
    ];

    Core {
        state,
        publisher,
        inputs,
        tasks,
    }
}

/// Run the relay until a signal or the `exit` control message
pub async fn run(config: RelayConfig, slot: Arc<SubscriberSlot>) -> Result<()> {
    let cancel = CancellationToken::new();

    let server = PushServer::bind(&config.push).await?;

    let gateway: Arc<dyn CommandGateway> = Arc::new(RconGateway::connect(config.rcon.clone()).await?);

    let identity = resolve_identity(gateway.as_ref()).await?;
    tracing::info!("Playing as {}", identity.name());

    let log_path = prepare_log(&config.log)?;
    let tailer = LogTailer::from_end(
        &log_path,
        Duration::from_millis(config.log.poll_interval_ms.max(10)),
    )?;

    let sink = open_sink(&config.store);

    let core = spawn_core(&config.timing, identity, gateway, sink, slot, &cancel);
    let mut tasks = core.tasks;
    tasks.push(tokio::spawn(server.run(core.publisher.clone(), cancel.clone())));
    tasks.push(tokio::spawn(tailer.run(core.inputs.clone(), cancel.clone())));
    drop(core.inputs);

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Signal received, shutting down");
        }
        _ = cancel.cancelled() => {
            tracing::info!("Exit requested, shutting down");
        }
    }
    cancel.cancel();

    for task in tasks {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            tracing::warn!("A task did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Unable to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
