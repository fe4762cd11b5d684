use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants;
use crate::error::Result;

/// Whether a run writes to the production audit trail or to a sandbox one.
/// The mode is explicit configuration; it is never inferred from paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Production,
    Sandbox,
}

impl RunMode {
    pub fn ledger_file_name(self) -> &'static str {
        match self {
            RunMode::Production => constants::LEDGER_FILE,
            RunMode::Sandbox => constants::SANDBOX_LEDGER_FILE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Root of the working trees (staging, pending uploads, run summaries).
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Target size of one combined partition file.
    #[serde(default = "default_partition_target_bytes")]
    pub partition_target_bytes: u64,

    /// Hard cap on the serialized size of one upload shard.
    #[serde(default = "default_max_shard_bytes")]
    pub max_shard_bytes: u64,

    /// Directory holding the duplicate ledger files.
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,

    /// Whether to emit a completion notice at the end of a run.
    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_partition_target_bytes() -> u64 {
    constants::DEFAULT_PARTITION_TARGET_BYTES
}

fn default_max_shard_bytes() -> u64 {
    constants::DEFAULT_MAX_SHARD_BYTES
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from("data").join("audit")
}

fn default_notifications() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            partition_target_bytes: default_partition_target_bytes(),
            max_shard_bytes: default_max_shard_bytes(),
            ledger_dir: default_ledger_dir(),
            notifications: default_notifications(),
        }
    }
}

impl PipelineConfig {
    /// Load `config.toml` from the working directory. A missing file is not
    /// an error; every field has a default.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Staging tree the raw files are copied into before cleaning.
    pub fn dedup_dir(&self) -> PathBuf {
        self.work_dir.join(constants::DEDUP_DIR)
    }

    /// Tree holding the combined partition files awaiting recombination.
    pub fn pending_dir(&self) -> PathBuf {
        self.work_dir.join(constants::PENDING_UPLOAD_DIR)
    }

    /// Where run summaries are persisted.
    pub fn runs_dir(&self) -> PathBuf {
        self.work_dir.join(constants::RUNS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_config_file_is_missing() {
        let config = PipelineConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("data"));
        assert_eq!(config.max_shard_bytes, constants::DEFAULT_MAX_SHARD_BYTES);
        assert!(config.notifications);
    }

    #[test]
    fn partial_config_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "work_dir = \"/tmp/wear\"\nmax_shard_bytes = 1000\n").unwrap();

        let config = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/wear"));
        assert_eq!(config.max_shard_bytes, 1000);
        assert_eq!(
            config.partition_target_bytes,
            constants::DEFAULT_PARTITION_TARGET_BYTES
        );
    }
}
