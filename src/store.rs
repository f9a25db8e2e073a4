//! Player and chat persistence
//!
//! Records are written as they are finalized by the engine. The engine never
//! looks at the outcome beyond logging a failure, so storage problems can not
//! stall roster processing.

use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::model::{ChatRecord, PlayerRecord};

/// Destination for finalized records
pub trait PersistenceSink: Send + Sync {
    fn store_player(&self, player: &PlayerRecord) -> Result<()>;
    fn store_chat(&self, chat: &ChatRecord) -> Result<()>;
}

/// Sink used when storage is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PersistenceSink for NullSink {
    fn store_player(&self, _player: &PlayerRecord) -> Result<()> {
        Ok(())
    }

    fn store_chat(&self, _chat: &ChatRecord) -> Result<()> {
        Ok(())
    }
}

/// SQLite-backed sink
#[derive(Debug)]
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) the database at `path` and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- One row per SteamID64, refreshed on every status line
            CREATE TABLE IF NOT EXISTS players (
                steam_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- steam_id is 0 when the speaker could not be resolved
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                steam_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                message TEXT NOT NULL,
                dead INTEGER NOT NULL DEFAULT 0,
                team_only INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chats_steam_id ON chats(steam_id);
            "#,
        )?;
        Ok(())
    }

    pub fn player_count(&self) -> Result<i64> {
        let count = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn chat_count(&self) -> Result<i64> {
        let count = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Most recently stored name for a SteamID64
    pub fn player_name(&self, steam_id: u64) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM players WHERE steam_id = ?1")?;
        let mut rows = stmt.query(params![steam_id as i64])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

impl PersistenceSink for SqliteSink {
    fn store_player(&self, player: &PlayerRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO players (steam_id, name, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(steam_id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![
                player.steam_id.0 as i64,
                player.name,
                player.last_seen.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn store_chat(&self, chat: &ChatRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO chats (steam_id, name, message, dead, team_only, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chat.steam_id.0 as i64,
                chat.name,
                chat.message,
                chat.dead,
                chat.team_only,
                chat.timestamp.timestamp_millis()
            ],
        )?;
        Ok(())
    }
}
