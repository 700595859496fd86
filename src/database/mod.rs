pub mod queries;
pub mod schema;

use crate::content::{ContentError, ContentSource};
use crate::payload::FillPayload;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening {}", db_path.display()))?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        schema::create_tables(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// `<data dir>/multi-platform-filler/content.db`
    pub fn default_path() -> Result<std::path::PathBuf> {
        let base = dirs::data_dir().context("Cannot find data directory")?;
        Ok(base.join("multi-platform-filler").join("content.db"))
    }
}

/// Serves payloads from the local article store.
pub struct LocalContentSource {
    db: Arc<Database>,
}

impl LocalContentSource {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContentSource for LocalContentSource {
    async fn fetch_payload(
        &self,
        content_id: &str,
        platform_id: &str,
    ) -> Result<FillPayload, ContentError> {
        let conn = self
            .db
            .conn
            .lock()
            .map_err(|e| ContentError::Store(e.to_string()))?;
        queries::load_payload(&conn, content_id, platform_id)
            .map_err(|e| ContentError::Store(e.to_string()))?
            .ok_or_else(|| ContentError::NotFound(content_id.to_string()))
    }
}
