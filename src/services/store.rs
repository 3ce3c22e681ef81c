//! Append-only CSV record store.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::WriterBuilder;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::Record;

/// Column order of the store. Fixed; existing files depend on it.
const HEADER: [&str; 13] = [
    "link_m3u",
    "servidor",
    "porta",
    "username",
    "password",
    "data_criacao",
    "data_vencimento",
    "total_canais",
    "status",
    "data_teste",
    "observacoes",
    "canal_origem",
    "mensagem_id",
];

/// Durable store for validated playlist records.
///
/// Write-only from the pipeline's perspective: rows are appended, never
/// updated or removed. All mutation goes through an internal mutex so
/// overlapping handlers cannot interleave header and row writes.
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the store file with its header row when it does not
    /// exist yet. Idempotent; safe to call before every append.
    pub async fn ensure_initialized(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_initialized_locked()
    }

    fn ensure_initialized_locked(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;

        info!(path = %self.path.display(), "record store created");
        Ok(())
    }

    /// Append exactly one row. Existing rows are never rewritten.
    pub async fn append(&self, record: &Record) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_initialized_locked()?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .serialize(record)
            .context("serializing record row")?;
        writer.flush()?;

        debug!(link = %record.link_m3u, "record appended");
        Ok(())
    }
}
