use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timeline::PlacementResult;

pub mod config;
mod index;
pub mod library;
pub mod naming;
mod scan;
pub mod search;

pub use config::{Settings, MAX_RETRY_ATTEMPTS};
pub use index::{AssetIndex, IndexSnapshot};
pub use library::{output_dir, write_asset};
pub use naming::{asset_filename, normalize_prompt, parse_asset_name, sanitize_prompt, ParsedName};
pub use scan::{is_audio_file, merge_records, scan, scan_containers, scan_filesystem, AssetRecord, SourceKind, AUDIO_EXTENSIONS};
pub use search::{next_sequence_number, search_records};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("the host project has not been saved and no fallback directory is configured")]
    ProjectUnsaved,
    #[error("failed to write {}: {source}", path.display())]
    Persistence { path: PathBuf, source: io::Error },
    #[error("configuration error: {0}")]
    Config(String),
}

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("sfx_placer")
}

/// Lifecycle of one generation as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    Queued,
    Generating,
    Saving,
    Placing,
    Done,
    Failed,
}

impl LedgerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerState::Queued => "queued",
            LedgerState::Generating => "generating",
            LedgerState::Saving => "saving",
            LedgerState::Placing => "placing",
            LedgerState::Done => "done",
            LedgerState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => LedgerState::Queued,
            "generating" => LedgerState::Generating,
            "saving" => LedgerState::Saving,
            "placing" => LedgerState::Placing,
            "done" => LedgerState::Done,
            "failed" => LedgerState::Failed,
            _ => return None,
        })
    }
}

/// Everything known about a generation at the moment it was queued.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGeneration<'a> {
    pub id: &'a str,
    pub prompt: &'a str,
    pub duration_seconds: f64,
    pub prompt_influence: f64,
    pub mode: &'a str,
    pub target_time: Option<f64>,
    pub preferred_lane: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRow {
    pub id: String,
    pub prompt: String,
    pub duration_seconds: f64,
    pub mode: String,
    pub target_time: Option<f64>,
    pub state: LedgerState,
    pub saved_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: i64,
    pub placed: Option<bool>,
    pub lane_index: Option<usize>,
    pub final_time: Option<f64>,
    pub warning: Option<String>,
}

/// Local record of every generation and where it ended up on the timeline.
pub struct ProjectDb {
    conn: Connection,
    path: PathBuf,
}

impl ProjectDb {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() { fs::create_dir_all(dir)?; }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.pragma_update(None, "synchronous", &"NORMAL")?;
        conn.pragma_update(None, "foreign_keys", &"ON")?;
        let _ = conn.pragma_update(None, "cache_size", &"-4000");
        apply_migrations(&conn)?;
        Ok(Self { conn, path: path.to_path_buf() })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", &"ON")?;
        apply_migrations(&conn)?;
        Ok(Self { conn, path: PathBuf::from(":memory:") })
    }

    pub fn default_path() -> PathBuf { app_data_dir().join("generations.db") }

    pub fn path(&self) -> &Path { &self.path }

    pub fn record_job(&self, job: &NewGeneration<'_>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT OR REPLACE INTO generations(id, prompt, duration_seconds, prompt_influence, mode, target_time, preferred_lane, state, created_at, updated_at) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                job.id,
                job.prompt,
                job.duration_seconds,
                job.prompt_influence,
                job.mode,
                job.target_time,
                job.preferred_lane as i64,
                LedgerState::Queued.as_str(),
                now
            ],
        )?;
        Ok(())
    }

    pub fn update_job_state(&self, id: &str, state: LedgerState) -> Result<()> {
        self.conn.execute(
            "UPDATE generations SET state = ?2, updated_at = strftime('%s','now') WHERE id = ?1",
            params![id, state.as_str()],
        )?;
        Ok(())
    }

    pub fn record_saved(&self, id: &str, saved_path: &Path) -> Result<()> {
        self.conn.execute(
            "UPDATE generations SET saved_path = ?2, updated_at = strftime('%s','now') WHERE id = ?1",
            params![id, saved_path.to_string_lossy()],
        )?;
        Ok(())
    }

    /// Store the placement attempt and close out the generation.
    pub fn record_outcome(&self, id: &str, result: &PlacementResult) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO placements(generation_id, success, lane_index, final_time, created_new_lane, warning, error, recorded_at) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, strftime('%s','now'))",
            params![
                id,
                result.success,
                result.lane_index.map(|i| i as i64),
                result.final_time_seconds,
                result.created_new_lane,
                result.warning,
                result.error
            ],
        )?;
        let state = if result.success { LedgerState::Done } else { LedgerState::Failed };
        tx.execute(
            "UPDATE generations SET state = ?2, error = ?3, updated_at = strftime('%s','now') WHERE id = ?1",
            params![id, state.as_str(), result.error],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn record_failure(&self, id: &str, error: &str, saved_path: Option<&Path>) -> Result<()> {
        self.conn.execute(
            "UPDATE generations SET state = ?2, error = ?3, saved_path = COALESCE(?4, saved_path), updated_at = strftime('%s','now') WHERE id = ?1",
            params![id, LedgerState::Failed.as_str(), error, saved_path.map(|p| p.to_string_lossy())],
        )?;
        Ok(())
    }

    pub fn job(&self, id: &str) -> Result<Option<GenerationRow>> {
        let mut stmt = self.conn.prepare(&format!("{ROW_SELECT} WHERE g.id = ?1"))?;
        Ok(stmt.query_row(params![id], read_row).optional()?)
    }

    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<GenerationRow>> {
        let mut stmt = self.conn.prepare(&format!("{ROW_SELECT} ORDER BY g.created_at DESC, g.rowid DESC LIMIT ?1"))?;
        let rows = stmt.query_map(params![limit as i64], read_row)?;
        let mut out = Vec::new();
        for r in rows { out.push(r?); }
        Ok(out)
    }

    /// Saved files whose placement never succeeded, oldest first.
    pub fn unplaced_assets(&self) -> Result<Vec<PathBuf>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.saved_path FROM generations g LEFT JOIN placements p ON p.generation_id = g.id \
             WHERE g.saved_path IS NOT NULL AND COALESCE(p.success, 0) = 0 ORDER BY g.created_at ASC, g.rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows { out.push(PathBuf::from(r?)); }
        Ok(out)
    }
}

const ROW_SELECT: &str = "SELECT g.id, g.prompt, g.duration_seconds, g.mode, g.target_time, g.state, g.saved_path, g.error, g.created_at, \
     p.success, p.lane_index, p.final_time, p.warning \
     FROM generations g LEFT JOIN placements p ON p.generation_id = g.id";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationRow> {
    let state: String = row.get(5)?;
    Ok(GenerationRow {
        id: row.get(0)?,
        prompt: row.get(1)?,
        duration_seconds: row.get(2)?,
        mode: row.get(3)?,
        target_time: row.get(4)?,
        state: LedgerState::parse(&state).unwrap_or(LedgerState::Failed),
        saved_path: row.get::<_, Option<String>>(6)?.map(PathBuf::from),
        error: row.get(7)?,
        created_at: row.get(8)?,
        placed: row.get(9)?,
        lane_index: row.get::<_, Option<i64>>(10)?.map(|i| i as usize),
        final_time: row.get(11)?,
        warning: row.get(12)?,
    })
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(include_str!("../migrations/V0001__init.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0001__init"],
    )?;
    conn.execute_batch(include_str!("../migrations/V0002__placement.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0002__placement"],
    )?;
    Ok(())
}
