//! Push channel message types
//!
//! Defines the JSON envelopes exchanged with the UI client.

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::model::{FragRecord, PlayerRecord};

/// Server-to-client message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage<'a> {
    /// Full current roster
    PlayerUpdate {
        #[serde(rename = "currentPlayers")]
        current_players: &'a [PlayerRecord],
    },
    /// One kill feed entry
    Frag { frag: &'a FragRecord },
    /// Mirrored diagnostic line
    ApplicationLog { message: &'a str },
}

impl ServerMessage<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerUpdate { .. } => "player update",
            Self::Frag { .. } => "frag",
            Self::ApplicationLog { .. } => "application log",
        }
    }

    /// Encode as a single JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| RelayError::SerializationFailure {
            what: self.kind(),
            source,
        })
    }
}

/// Client-to-server control message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Shut the relay down
    Exit,
    /// Anything else; currently echoed back unprocessed
    #[serde(other)]
    Unhandled,
}
