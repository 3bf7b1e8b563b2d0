use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{Session, User};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Durable key/value store for client-side state.
pub struct ClientStorage {
    conn: Connection,
}

impl ClientStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(path = %path.display(), "Opening client storage");
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS client_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM client_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO client_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    pub fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let ts = self
            .conn
            .query_row(
                "SELECT updated_at FROM client_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }

    pub fn token(&self) -> Result<Option<String>> {
        self.get(TOKEN_KEY)
    }

    /// Stored user, if present and still decodable.
    pub fn user(&self) -> Result<Option<User>> {
        let Some(raw) = self.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                debug!(error = %e, "Discarding undecodable stored user");
                Ok(None)
            }
        }
    }

    pub fn session(&self) -> Result<Option<Session>> {
        match (self.token()?, self.user()?) {
            (Some(token), Some(user)) if !token.is_empty() => Ok(Some(Session { token, user })),
            _ => Ok(None),
        }
    }

    pub fn save_session(&mut self, session: &Session) -> Result<()> {
        let user = serde_json::to_string(&session.user)?;
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        for (key, value) in [(TOKEN_KEY, session.token.as_str()), (USER_KEY, user.as_str())] {
            tx.execute(
                "INSERT INTO client_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        debug!(username = %session.user.username, "Session persisted");
        Ok(())
    }

    /// Removes token and user together.
    pub fn clear_session(&mut self) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM client_storage WHERE key IN (?1, ?2)",
            params![TOKEN_KEY, USER_KEY],
        )?;
        tx.commit()?;
        if removed > 0 {
            info!("Cleared stored session");
        }
        Ok(removed > 0)
    }
}
