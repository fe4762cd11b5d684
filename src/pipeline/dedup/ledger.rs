use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RunMode;
use crate::error::{PipelineError, Result};
use crate::pathmeta::PathIds;
use crate::pipeline::dedup::classify::DupeCounts;
use crate::types::StreamKind;

/// One audited row of the duplicate-handling log. Field order is the
/// on-disk column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ppt_id: String,
    pub dev_id: String,
    pub month: String,
    pub stream: String,
    pub perfect: u64,
    pub nan: u64,
    pub unclear: u64,
    pub total_rows: u64,
    pub total_dupes: u64,
}

impl LedgerEntry {
    pub fn new(ids: &PathIds, month: &str, stream: StreamKind, counts: DupeCounts) -> Self {
        Self {
            ppt_id: ids.ppt_id.clone(),
            dev_id: ids.device_id.clone(),
            month: month.to_string(),
            stream: stream.name().to_string(),
            perfect: counts.perfect,
            nan: counts.nan,
            unclear: counts.unclear,
            total_rows: counts.total_rows,
            total_dupes: counts.total_dupes,
        }
    }

    fn same_key(&self, other: &LedgerEntry) -> bool {
        self.ppt_id == other.ppt_id
            && self.dev_id == other.dev_id
            && self.month == other.month
            && self.stream == other.stream
    }
}

/// Where the ledger lives and which audit trail a run writes to. Sandbox
/// runs get their own file so test execution never touches the production
/// log.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub dir: PathBuf,
    pub mode: RunMode,
}

/// Durable, keyed log of classification counts: a human-inspectable CSV
/// with exactly one live row per (participant, device, month, stream).
///
/// The backing store is file-based but the ledger is a mapping, not an
/// append log: recording a key that already exists overwrites that row.
pub struct DuplicateLedger {
    path: PathBuf,
}

impl DuplicateLedger {
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir).map_err(|e| {
            PipelineError::Ledger(format!(
                "cannot create ledger directory {}: {e}",
                config.dir.display()
            ))
        })?;
        Ok(Self {
            path: config.dir.join(config.mode.ledger_file_name()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All live entries. A ledger that has never been written is empty.
    pub fn load(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| {
            PipelineError::Ledger(format!("cannot open {}: {e}", self.path.display()))
        })?;
        let mut entries = Vec::new();
        for entry in reader.deserialize() {
            entries.push(entry.map_err(|e| {
                PipelineError::Ledger(format!("corrupt row in {}: {e}", self.path.display()))
            })?);
        }
        Ok(entries)
    }

    /// Idempotent upsert: overwrite the row matching the entry's key, or
    /// append a new one. The whole read-modify-write happens within the
    /// call, so reprocessing the same key any number of times leaves one
    /// row carrying the latest counts.
    pub fn record_or_update(&self, entry: LedgerEntry) -> Result<()> {
        let mut entries = self.load()?;
        match entries.iter_mut().find(|e| e.same_key(&entry)) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.write_all(&entries)
    }

    fn write_all(&self, entries: &[LedgerEntry]) -> Result<()> {
        let tmp = self.path.with_extension("csv.tmp");
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| {
            PipelineError::Ledger(format!("cannot write {}: {e}", tmp.display()))
        })?;
        for entry in entries {
            writer.serialize(entry).map_err(|e| {
                PipelineError::Ledger(format!("cannot write {}: {e}", tmp.display()))
            })?;
        }
        writer.flush().map_err(|e| {
            PipelineError::Ledger(format!("cannot flush {}: {e}", tmp.display()))
        })?;
        drop(writer);
        fs::rename(&tmp, &self.path).map_err(|e| {
            PipelineError::Ledger(format!("cannot replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}
