pub mod schema;

use crate::config::Config;
use anyhow::{anyhow, Context as _};
use rusqlite::{Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Where a document lives. Mirrors the global / per-guild / per-member /
/// per-user settings every cog can keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Guild(u64),
    Member(u64, u64),
    User(u64),
}

impl Scope {
    fn kind(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Guild(_) => "guild",
            Scope::Member(_, _) => "member",
            Scope::User(_) => "user",
        }
    }

    fn keys(&self) -> (String, String) {
        match *self {
            Scope::Global => (String::new(), String::new()),
            Scope::Guild(g) => (g.to_string(), String::new()),
            Scope::Member(g, u) => (g.to_string(), u.to_string()),
            Scope::User(u) => (String::new(), u.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory {:?}", parent))?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.lock()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Runs `f` on the blocking pool with a handle to this database.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    fn read<T: DeserializeOwned>(
        conn: &Connection,
        cog: &str,
        scope: Scope,
    ) -> anyhow::Result<Option<T>> {
        let (guild_id, user_id) = scope.keys();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE cog = ?1 AND scope = ?2 AND guild_id = ?3 AND user_id = ?4",
                (cog, scope.kind(), &guild_id, &user_id),
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| {
            serde_json::from_str(&body)
                .with_context(|| format!("unreadable {} document for {:?}", cog, scope))
        })
        .transpose()
    }

    fn write<T: Serialize>(
        conn: &Connection,
        cog: &str,
        scope: Scope,
        doc: &T,
    ) -> anyhow::Result<()> {
        let (guild_id, user_id) = scope.keys();
        let body = serde_json::to_string(doc)?;
        conn.execute(
            "INSERT INTO documents (cog, scope, guild_id, user_id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
             ON CONFLICT(cog, scope, guild_id, user_id) DO UPDATE SET body = ?5, updated_at = CURRENT_TIMESTAMP",
            (cog, scope.kind(), &guild_id, &user_id, &body),
        )?;
        Ok(())
    }

    /// Loads a document, falling back to its default when none is stored.
    /// A stored body that no longer parses is an error, never a default.
    pub fn load<T>(&self, cog: &str, scope: Scope) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let conn = self.lock()?;
        Ok(Self::read(&conn, cog, scope)?.unwrap_or_default())
    }

    pub fn save<T: Serialize>(&self, cog: &str, scope: Scope, doc: &T) -> anyhow::Result<()> {
        let conn = self.lock()?;
        Self::write(&conn, cog, scope, doc)
    }

    /// Read-modify-write under a single lock acquisition. Nothing is
    /// written when the stored body cannot be parsed.
    pub fn update<T, R, F>(&self, cog: &str, scope: Scope, f: F) -> anyhow::Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let conn = self.lock()?;
        let mut doc: T = Self::read(&conn, cog, scope)?.unwrap_or_default();
        let out = f(&mut doc);
        Self::write(&conn, cog, scope, &doc)?;
        Ok(out)
    }

    pub fn delete(&self, cog: &str, scope: Scope) -> anyhow::Result<bool> {
        let (guild_id, user_id) = scope.keys();
        let conn = self.lock()?;
        let count = conn.execute(
            "DELETE FROM documents WHERE cog = ?1 AND scope = ?2 AND guild_id = ?3 AND user_id = ?4",
            (cog, scope.kind(), &guild_id, &user_id),
        )?;
        Ok(count > 0)
    }

    /// Every guild-scoped document for a cog, for background tasks.
    pub fn list_guild_documents<T: DeserializeOwned>(
        &self,
        cog: &str,
    ) -> anyhow::Result<Vec<(u64, T)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT guild_id, body FROM documents WHERE cog = ?1 AND scope = 'guild'",
        )?;
        let rows = stmt.query_map([cog], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (guild_id, body) = row?;
            let Ok(guild_id) = guild_id.parse::<u64>() else {
                continue;
            };
            match serde_json::from_str(&body) {
                Ok(doc) => results.push((guild_id, doc)),
                Err(e) => warn!("Database: skipping {} document for guild {}: {}", cog, guild_id, e),
            }
        }
        Ok(results)
    }

    /// Every member-scoped document for a cog within one guild.
    pub fn list_member_documents<T: DeserializeOwned>(
        &self,
        cog: &str,
        guild_id: u64,
    ) -> anyhow::Result<Vec<(u64, T)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, body FROM documents WHERE cog = ?1 AND scope = 'member' AND guild_id = ?2",
        )?;
        let rows = stmt.query_map((cog, guild_id.to_string()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (user_id, body) = row?;
            let Ok(user_id) = user_id.parse::<u64>() else {
                continue;
            };
            match serde_json::from_str(&body) {
                Ok(doc) => results.push((user_id, doc)),
                Err(e) => warn!("Database: skipping {} document for member {}: {}", cog, user_id, e),
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Counter {
        value: u32,
        label: String,
    }

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_missing_document_reads_default() {
        let db = test_db();
        let doc: Counter = db.load("counter", Scope::Guild(1)).unwrap();
        assert_eq!(doc, Counter::default());
    }

    #[test]
    fn test_scopes_are_isolated() {
        let db = test_db();
        db.save("counter", Scope::Guild(1), &Counter { value: 1, label: "g".into() }).unwrap();
        db.save("counter", Scope::Member(1, 2), &Counter { value: 2, label: "m".into() }).unwrap();
        db.save("counter", Scope::User(2), &Counter { value: 3, label: "u".into() }).unwrap();
        db.save("other", Scope::Guild(1), &Counter { value: 9, label: "o".into() }).unwrap();

        let guild: Counter = db.load("counter", Scope::Guild(1)).unwrap();
        let member: Counter = db.load("counter", Scope::Member(1, 2)).unwrap();
        let user: Counter = db.load("counter", Scope::User(2)).unwrap();
        assert_eq!(guild.value, 1);
        assert_eq!(member.value, 2);
        assert_eq!(user.value, 3);
    }

    #[test]
    fn test_update_and_delete() {
        let db = test_db();
        let after = db
            .update("counter", Scope::Global, |doc: &mut Counter| {
                doc.value += 5;
                doc.value
            })
            .unwrap();
        assert_eq!(after, 5);
        db.update("counter", Scope::Global, |doc: &mut Counter| doc.value += 1)
            .unwrap();
        let doc: Counter = db.load("counter", Scope::Global).unwrap();
        assert_eq!(doc.value, 6);

        assert!(db.delete("counter", Scope::Global).unwrap());
        assert!(!db.delete("counter", Scope::Global).unwrap());
    }

    #[test]
    fn test_listing_documents() {
        let db = test_db();
        db.save("counter", Scope::Guild(10), &Counter { value: 1, label: String::new() }).unwrap();
        db.save("counter", Scope::Guild(20), &Counter { value: 2, label: String::new() }).unwrap();
        db.save("counter", Scope::Member(10, 7), &Counter { value: 3, label: String::new() }).unwrap();
        db.save("counter", Scope::Member(20, 8), &Counter { value: 4, label: String::new() }).unwrap();

        let mut guilds: Vec<(u64, Counter)> = db.list_guild_documents("counter").unwrap();
        guilds.sort_by_key(|(id, _)| *id);
        assert_eq!(guilds.len(), 2);
        assert_eq!(guilds[0].0, 10);

        let members: Vec<(u64, Counter)> = db.list_member_documents("counter", 10).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].0, 7);
        assert_eq!(members[0].1.value, 3);
    }

    fn stored_body(db: &Database, guild_id: &str) -> String {
        let conn = db.conn.lock().unwrap();
        conn.query_row(
            "SELECT body FROM documents WHERE cog = 'counter' AND scope = 'guild' AND guild_id = ?1",
            [guild_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_unreadable_document_is_an_error() {
        let db = test_db();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO documents (cog, scope, guild_id, user_id, body) VALUES ('counter', 'guild', '5', '', 'not json')",
                [],
            )
            .unwrap();
        }
        assert!(db.load::<Counter>("counter", Scope::Guild(5)).is_err());
    }

    #[test]
    fn test_update_leaves_unreadable_document_intact() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        struct Strict {
            value: u32,
            owner: u64,
        }

        let db = test_db();
        db.save("counter", Scope::Guild(6), &Counter { value: 3, label: "old".into() })
            .unwrap();
        let before = stored_body(&db, "6");

        let result = db.update("counter", Scope::Guild(6), |doc: &mut Strict| doc.value += 1);
        assert!(result.is_err());
        assert_eq!(stored_body(&db, "6"), before);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_db();
        let value = db
            .run_blocking(|db| {
                db.save("counter", Scope::Guild(1), &Counter { value: 42, label: String::new() })?;
                let doc: Counter = db.load("counter", Scope::Guild(1))?;
                Ok(doc.value)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
