use anyhow::{Context, Result};
use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;

pub struct ScriptStore {
    conn: Connection,
}

impl ScriptStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open script store: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scripts(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT,
                topic TEXT,
                text TEXT
            )",
        )
        .context("Failed to create scripts table")?;
        Ok(Self { conn })
    }

    pub fn recent_texts(&self, k: usize) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT text FROM scripts ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![k as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn recent_topics(&self, days: i64) -> Result<HashSet<String>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut stmt = self
            .conn
            .prepare("SELECT topic FROM scripts WHERE created_at > ?1")?;
        let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    pub fn save(&self, topic: &str, text: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.save_at(&now, topic, text)
    }

    fn save_at(&self, created_at: &str, topic: &str, text: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO scripts(created_at, topic, text) VALUES(?1, ?2, ?3)",
                params![created_at, topic, text],
            )
            .context("Failed to save script")?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM scripts", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_texts_newest_first_and_limited() {
        let store = ScriptStore::open_in_memory().unwrap();
        store.save("Neon", "first").unwrap();
        store.save("Okapi", "second").unwrap();
        store.save("Vikings", "third").unwrap();

        assert_eq!(store.recent_texts(2).unwrap(), vec!["third", "second"]);
        assert_eq!(store.recent_texts(10).unwrap().len(), 3);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_recent_topics_respects_cooldown() {
        let store = ScriptStore::open_in_memory().unwrap();
        let old = (Utc::now() - Duration::days(45)).to_rfc3339_opts(SecondsFormat::Micros, true);
        store.save_at(&old, "Pompeii", "old text").unwrap();
        store.save("Quokka", "new text").unwrap();

        let recent = store.recent_topics(30).unwrap();
        assert!(recent.contains("Quokka"));
        assert!(!recent.contains("Pompeii"));
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("memory.sqlite");
        {
            let store = ScriptStore::open(&db).unwrap();
            store.save("Narwhal", "tusk").unwrap();
        }
        let store = ScriptStore::open(&db).unwrap();
        assert_eq!(store.recent_texts(5).unwrap(), vec!["tusk"]);
    }
}
