use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::{SensorTable, StreamKind};

/// Classification counts for one (participant, device, stream, month) file.
///
/// `total_dupes`, `perfect`, and `unclear` count every occurrence of a
/// colliding row, not one-less-than-the-group; `nan` is counted
/// independently, so a row can be both a duplicate and null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DupeCounts {
    pub total_rows: u64,
    pub total_dupes: u64,
    pub perfect: u64,
    pub nan: u64,
    pub unclear: u64,
}

/// Per-row verdicts plus the counts derived from them. Produced by
/// [`classify`] against one table; only valid for that table.
#[derive(Debug)]
pub struct Classification {
    pub counts: DupeCounts,
    mask_perfect: Vec<bool>,
    mask_unclear: Vec<bool>,
    mask_nan: Vec<bool>,
}

/// Cleaned rows plus the original indices that survived, in order.
#[derive(Debug)]
pub struct CleanOutcome {
    pub table: SensorTable,
    pub kept: Vec<usize>,
}

/// Rewrite known sensor-firmware quirks before classification. The EDA
/// stream emits sign-of-zero noise: a literal `-0.0` must not make two
/// otherwise identical rows look distinct.
pub fn normalize_quirks(table: &mut SensorTable) {
    if table.stream != StreamKind::Eda {
        return;
    }
    for row in &mut table.rows {
        if let Some(value) = row.values.first_mut() {
            if value == "-0.0" {
                *value = "0.0".to_string();
            }
        }
    }
}

/// Partition every row of one stream file into unique, exact-duplicate,
/// NaN, and ambiguous-duplicate categories.
///
/// A row collides when its `time` is not unique within the file. Colliding
/// rows that are identical across every column are perfect duplicates; the
/// rest are unclear, meaning the sensor reported different values for the
/// same timestamp and there is no principled way to pick one.
pub fn classify(table: &SensorTable) -> Result<Classification> {
    let rows = &table.rows;

    let mut time_counts: HashMap<&str, u32> = HashMap::with_capacity(rows.len());
    let mut row_counts: HashMap<(&str, &[String]), u32> = HashMap::with_capacity(rows.len());
    for row in rows {
        *time_counts.entry(row.time.as_str()).or_insert(0) += 1;
        *row_counts
            .entry((row.time.as_str(), row.values.as_slice()))
            .or_insert(0) += 1;
    }

    let mut counts = DupeCounts {
        total_rows: rows.len() as u64,
        ..DupeCounts::default()
    };
    let mut mask_perfect = Vec::with_capacity(rows.len());
    let mut mask_unclear = Vec::with_capacity(rows.len());
    let mut mask_nan = Vec::with_capacity(rows.len());

    for row in rows {
        let colliding = time_counts[row.time.as_str()] > 1;
        let perfect = row_counts[&(row.time.as_str(), row.values.as_slice())] > 1;
        let unclear = colliding && !perfect;
        let nan = row.is_null_measurement();

        if colliding {
            counts.total_dupes += 1;
        }
        if perfect {
            counts.perfect += 1;
        }
        if unclear {
            counts.unclear += 1;
        }
        if nan {
            counts.nan += 1;
        }
        mask_perfect.push(perfect);
        mask_unclear.push(unclear);
        mask_nan.push(nan);
    }

    if counts.perfect + counts.unclear != counts.total_dupes || counts.total_dupes > counts.total_rows
    {
        return Err(PipelineError::Inconsistency(format!(
            "perfect ({}) + unclear ({}) != total_dupes ({}) over {} rows",
            counts.perfect, counts.unclear, counts.total_dupes, counts.total_rows
        )));
    }

    Ok(Classification {
        counts,
        mask_perfect,
        mask_unclear,
        mask_nan,
    })
}

/// Drop rows according to the precedence policy: unclear duplicates go
/// first (all copies; there is no safe resolution), then rows with a null
/// primary measurement, then exact duplicates collapse to their last
/// occurrence. Later ingested copies are presumed corrective, hence
/// keep-last.
///
/// Unclear rows must leave before the collapse: once they are gone, the
/// remaining rows of any time collision are value-identical, so keeping
/// one of them loses nothing.
pub fn apply_drop_policy(table: &SensorTable, classification: &Classification) -> CleanOutcome {
    debug_assert_eq!(table.rows.len(), classification.mask_unclear.len());

    let rows = &table.rows;
    let mut last_of: HashMap<(&str, &[String]), usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if classification.mask_perfect[i] && !classification.mask_nan[i] {
            last_of.insert((row.time.as_str(), row.values.as_slice()), i);
        }
    }

    let mut kept = Vec::new();
    let mut cleaned = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if classification.mask_unclear[i] || classification.mask_nan[i] {
            continue;
        }
        if classification.mask_perfect[i]
            && last_of[&(row.time.as_str(), row.values.as_slice())] != i
        {
            continue;
        }
        kept.push(i);
        cleaned.push(row.clone());
    }

    CleanOutcome {
        table: SensorTable {
            stream: table.stream,
            rows: cleaned,
        },
        kept,
    }
}
