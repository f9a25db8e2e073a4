//! tf2-roster-relay: live TF2 match roster, chat and kill feed relay
//!
//! The relay watches a running game client from two directions: it tails the
//! console log (`-condebug`) and talks to the client's RCON listener. From
//! those it keeps one record per player in the current match, keyed by
//! SteamID64, and pushes that roster to a local UI over a WebSocket.
//!
//! # Data flow
//!
//! ```text
//! console.log ──► LogTailer ─┐
//!                            ├──► Engine ──► MatchState ──► UpdatePublisher ──► push channel
//! RCON replies ◄─ Scheduler ─┘       │                             ▲
//!                                    └──── frags ──────────────────┘
//! ```
//!
//! Status lines create and refresh players, `tf_lobby_debug` snapshots add
//! team and lobby tags, and chat and kill feed lines are resolved against the
//! roster by name. Players who stop appearing in `status` age out.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod publisher;
pub mod push;
pub mod rcon;
pub mod relay;
pub mod roster;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod tail;

// Re-export commonly used types
pub use cli::Cli;
pub use config::RelayConfig;
pub use engine::{Engine, EngineInput};
pub use error::{RelayError, Result};
pub use model::{
    ChatRecord, FragRecord, GameEvent, PlayerRecord, PlayerTags, SessionIdentity, SteamId,
};
pub use publisher::{PushOutcome, UpdatePublisher};
pub use push::{PushServer, SubscriberSlot};
pub use rcon::{CommandGateway, RconGateway};
pub use roster::RosterStore;
pub use scheduler::{RefreshCommand, RefreshScheduler};
pub use state::MatchState;
pub use store::{NullSink, PersistenceSink, SqliteSink};
