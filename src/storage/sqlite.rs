//! SQLite backend for [`Store`].
//!
//! One connection guarded by a mutex. Timestamps are stored as fixed-width
//! RFC 3339 UTC strings (microsecond precision) so that text ordering matches
//! time ordering; thoughts are stored as a JSON array.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{Comment, Manifest, Monologue, Store};
use crate::error::StoreError;
use crate::interpretation::Classification;
use crate::state::StateVector;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        certainty REAL NOT NULL,
        intrusion REAL NOT NULL,
        coherence REAL NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_states_timestamp ON states(timestamp);

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        text TEXT,
        image_url TEXT,
        video_url TEXT,
        timestamp TEXT NOT NULL,
        classification TEXT,
        intrusion_score REAL,
        responded INTEGER NOT NULL DEFAULT 0,
        response_text TEXT
    );

    CREATE TABLE IF NOT EXISTS monologues (
        id TEXT PRIMARY KEY,
        thoughts TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_monologues_timestamp ON monologues(timestamp);

    CREATE TABLE IF NOT EXISTS manifests (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        published INTEGER NOT NULL DEFAULT 0,
        published_at TEXT,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_manifests_pending ON manifests(published, timestamp);
";

/// SQLite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    /// Database location; `None` for an in-memory database.
    pub db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        debug!(path = ?db_path, "SQLite store ready");
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }
}

fn encode_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            message: format!("bad timestamp '{}': {}", raw, e),
        })
}

fn decode_state(row: &Row<'_>) -> rusqlite::Result<(f64, f64, f64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn state_from_parts(parts: (f64, f64, f64, String)) -> Result<StateVector, StoreError> {
    let (certainty, intrusion, coherence, timestamp) = parts;
    let state = StateVector {
        certainty,
        intrusion,
        coherence,
        timestamp: decode_time("states", &timestamp)?,
    };
    for value in [state.certainty, state.intrusion, state.coherence] {
        if !(0.0..=1.0).contains(&value) {
            return Err(StoreError::Corrupt {
                table: "states",
                message: format!("value {} outside [0, 1]", value),
            });
        }
    }
    Ok(state)
}

struct CommentRow {
    id: String,
    post_id: String,
    author_id: String,
    text: Option<String>,
    image_url: Option<String>,
    video_url: Option<String>,
    timestamp: String,
    classification: Option<String>,
    intrusion_score: Option<f64>,
    responded: bool,
    response_text: Option<String>,
}

impl CommentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            author_id: row.get(2)?,
            text: row.get(3)?,
            image_url: row.get(4)?,
            video_url: row.get(5)?,
            timestamp: row.get(6)?,
            classification: row.get(7)?,
            intrusion_score: row.get(8)?,
            responded: row.get::<_, i64>(9)? != 0,
            response_text: row.get(10)?,
        })
    }

    fn into_comment(self) -> Result<Comment, StoreError> {
        let classification = match self.classification {
            Some(label) => Some(label.parse::<Classification>().map_err(|bad| {
                StoreError::Corrupt {
                    table: "comments",
                    message: format!("unknown classification '{}'", bad),
                }
            })?),
            None => None,
        };
        Ok(Comment {
            id: self.id,
            post_id: self.post_id,
            author_id: self.author_id,
            text: self.text,
            image_url: self.image_url,
            video_url: self.video_url,
            timestamp: decode_time("comments", &self.timestamp)?,
            classification,
            intrusion_score: self.intrusion_score,
            responded: self.responded,
            response_text: self.response_text,
        })
    }
}

fn manifest_from_row(
    parts: (String, String, bool, Option<String>, String),
) -> Result<Manifest, StoreError> {
    let (id, content, published, published_at, timestamp) = parts;
    Ok(Manifest {
        id,
        content,
        published,
        published_at: published_at
            .map(|raw| decode_time("manifests", &raw))
            .transpose()?,
        timestamp: decode_time("manifests", &timestamp)?,
    })
}

fn read_manifest(row: &Row<'_>) -> rusqlite::Result<(String, String, bool, Option<String>, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get::<_, i64>(2)? != 0,
        row.get(3)?,
        row.get(4)?,
    ))
}

impl Store for SqliteStore {
    fn append_state(&self, state: &StateVector) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO states (certainty, intrusion, coherence, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                state.certainty,
                state.intrusion,
                state.coherence,
                encode_time(&state.timestamp)
            ],
        )?;
        Ok(())
    }

    fn latest_state(&self) -> Result<Option<StateVector>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT certainty, intrusion, coherence, timestamp FROM states
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                [],
                decode_state,
            )
            .optional()?;
        row.map(state_from_parts).transpose()
    }

    fn state_history(&self, limit: usize) -> Result<Vec<StateVector>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT certainty, intrusion, coherence, timestamp FROM states
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], decode_state)?;
        let mut history = Vec::new();
        for row in rows {
            history.push(state_from_parts(row?)?);
        }
        Ok(history)
    }

    fn upsert_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO comments
             (id, post_id, author_id, text, image_url, video_url, timestamp,
              classification, intrusion_score, responded, response_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                comment.id,
                comment.post_id,
                comment.author_id,
                comment.text,
                comment.image_url,
                comment.video_url,
                encode_time(&comment.timestamp),
                comment.classification.map(|c| c.as_str()),
                comment.intrusion_score,
                comment.responded as i64,
                comment.response_text,
            ],
        )?;
        Ok(())
    }

    fn get_comment(&self, id: &str) -> Result<Option<Comment>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, post_id, author_id, text, image_url, video_url, timestamp,
                        classification, intrusion_score, responded, response_text
                 FROM comments WHERE id = ?1",
                params![id],
                CommentRow::read,
            )
            .optional()?;
        row.map(CommentRow::into_comment).transpose()
    }

    fn comment_exists(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row("SELECT 1 FROM comments WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn append_monologue(&self, monologue: &Monologue) -> Result<(), StoreError> {
        let thoughts = serde_json::to_string(&monologue.thoughts)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO monologues (id, thoughts, timestamp) VALUES (?1, ?2, ?3)",
            params![monologue.id, thoughts, encode_time(&monologue.timestamp)],
        )?;
        Ok(())
    }

    fn recent_monologues(&self, limit: usize) -> Result<Vec<Monologue>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, thoughts, timestamp FROM monologues
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut monologues = Vec::new();
        for row in rows {
            let (id, thoughts, timestamp) = row?;
            monologues.push(Monologue {
                id,
                thoughts: serde_json::from_str(&thoughts)?,
                timestamp: decode_time("monologues", &timestamp)?,
            });
        }
        Ok(monologues)
    }

    fn append_manifest(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO manifests (id, content, published, published_at, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                manifest.id,
                manifest.content,
                manifest.published as i64,
                manifest.published_at.as_ref().map(encode_time),
                encode_time(&manifest.timestamp),
            ],
        )?;
        Ok(())
    }

    fn get_manifest(&self, id: &str) -> Result<Option<Manifest>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, content, published, published_at, timestamp
                 FROM manifests WHERE id = ?1",
                params![id],
                read_manifest,
            )
            .optional()?;
        row.map(manifest_from_row).transpose()
    }

    fn unpublished_manifests(&self) -> Result<Vec<Manifest>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, published, published_at, timestamp
             FROM manifests
             WHERE published = 0
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], read_manifest)?;
        let mut manifests = Vec::new();
        for row in rows {
            manifests.push(manifest_from_row(row?)?);
        }
        Ok(manifests)
    }

    fn mark_manifest_published(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE manifests SET published = 1, published_at = ?2
             WHERE id = ?1 AND published = 0",
            params![id, encode_time(&at)],
        )?;
        Ok(changed == 1)
    }
}
