/// Stream name constants to ensure consistency across the codebase.
/// These are the sensor modalities an export can contain and double as
/// the file stems of the per-device CSVs.

// Stream names (used in CLI args, file stems, and ledger rows)
pub const ACC_STREAM: &str = "acc";
pub const EDA_STREAM: &str = "eda";
pub const TEMP_STREAM: &str = "temp";

/// Get all supported stream names
pub fn supported_streams() -> Vec<&'static str> {
    vec![ACC_STREAM, EDA_STREAM, TEMP_STREAM]
}

// Directory names for the working trees
pub const DEDUP_DIR: &str = "deduplication";
pub const PENDING_UPLOAD_DIR: &str = "pending_upload";
pub const RUNS_DIR: &str = "runs";

// Ledger file names; sandbox runs must never pollute the production audit trail
pub const LEDGER_FILE: &str = "duplicate_log.csv";
pub const SANDBOX_LEDGER_FILE: &str = "duplicate_log_sandbox.csv";

/// Maximum serialized size of one upload shard. The store caps bulk files
/// at 5 GB; the default leaves headroom below that cap.
pub const DEFAULT_MAX_SHARD_BYTES: u64 = 4_900_000_000;

/// Target size of one combined partition file. Hundreds of megabytes keeps
/// a partition re-readable without a memory blowup.
pub const DEFAULT_PARTITION_TARGET_BYTES: u64 = 250_000_000;

/// Rows read per chunk when merging staged files.
pub const COMBINE_CHUNK_ROWS: usize = 100_000;

/// Bytes accumulated per chunk when repacking combined files.
pub const RECOMBINE_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// Name of a combined partition file within `pending_upload/<month>/<stream>/`.
pub fn partition_file_name(index: usize) -> String {
    format!("combined_{index}.csv")
}

/// Name of a final upload shard within `<output_dir>/<stream>/`.
pub fn shard_file_name(stream: &str, index: usize) -> String {
    format!("{stream}_combined_{index}.csv")
}
