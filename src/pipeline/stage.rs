use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pathmeta;

#[derive(Debug, Default)]
pub struct StageReport {
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub months: BTreeSet<String>,
}

/// Copy discovered raw files into the deduplication staging tree.
///
/// The variable top-level export prefix (the directory whose name embeds
/// the month token, e.g. `Sensors_U02_ALLSITES_20190801_20190831`) is
/// collapsed into the canonical `<month>` prefix; every segment below it
/// is preserved unchanged so id extraction keeps working downstream. File
/// contents are copied as-is.
///
/// Any copy error aborts the run. A partially built staging tree is not
/// trustworthy and must be rebuilt, so there is no partial-success path.
pub fn stage_files(paths: &[PathBuf], dedup_dir: &Path) -> Result<StageReport> {
    let mut report = StageReport::default();
    for path in paths {
        let month = pathmeta::month_token(path)?;
        let rel = below_prefix(path, &month)?;
        let dest = dedup_dir.join(&month).join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::file(parent, e))?;
        }
        let bytes = fs::copy(path, &dest).map_err(|e| PipelineError::file(path, e))?;
        debug!("Staged {} -> {}", path.display(), dest.display());
        report.files_copied += 1;
        report.bytes_copied += bytes;
        report.months.insert(month);
    }
    info!(
        "Staged {} files ({} bytes) into {}",
        report.files_copied,
        report.bytes_copied,
        dedup_dir.display()
    );
    Ok(report)
}

/// The path segments below the export prefix directory, i.e. below the
/// first directory whose name carries the month token.
fn below_prefix(path: &Path, month: &str) -> Result<PathBuf> {
    let mut found = false;
    let mut rel = PathBuf::new();
    for segment in path.iter() {
        let text = segment.to_string_lossy();
        if found {
            rel.push(segment);
        } else if text.contains(month) && !text.ends_with(".csv") {
            found = true;
        }
    }
    if !found || rel.as_os_str().is_empty() {
        return Err(PipelineError::structural(
            path,
            "no export prefix directory carrying the month token",
        ));
    }
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_export_prefix_into_month_dir() {
        let src_root = tempfile::tempdir().unwrap();
        let dest_root = tempfile::tempdir().unwrap();
        let raw = src_root
            .path()
            .join("Sensors_U02_ALLSITES_20190801_20190831/U02/FC/096/DEV1/eda.csv");
        fs::create_dir_all(raw.parent().unwrap()).unwrap();
        fs::write(&raw, "time,measure_value\n1000,0.5\n").unwrap();

        let report = stage_files(&[raw], dest_root.path()).unwrap();
        assert_eq!(report.files_copied, 1);
        assert!(report.months.contains("20190801_20190831"));

        let staged = dest_root
            .path()
            .join("20190801_20190831/U02/FC/096/DEV1/eda.csv");
        assert!(staged.exists());
        assert_eq!(
            fs::read_to_string(&staged).unwrap(),
            "time,measure_value\n1000,0.5\n"
        );
    }

    #[test]
    fn canonical_month_prefix_stages_to_itself() {
        let src_root = tempfile::tempdir().unwrap();
        let dest_root = tempfile::tempdir().unwrap();
        let raw = src_root
            .path()
            .join("20190801_20190831/U02/FC/096/DEV1/temp.csv");
        fs::create_dir_all(raw.parent().unwrap()).unwrap();
        fs::write(&raw, "time,measure_value\n").unwrap();

        stage_files(&[raw], dest_root.path()).unwrap();
        assert!(dest_root
            .path()
            .join("20190801_20190831/U02/FC/096/DEV1/temp.csv")
            .exists());
    }

    #[test]
    fn path_without_month_token_aborts() {
        let dest_root = tempfile::tempdir().unwrap();
        let result = stage_files(
            &[PathBuf::from("/exports/U02/FC/096/DEV1/eda.csv")],
            dest_root.path(),
        );
        assert!(matches!(
            result,
            Err(PipelineError::StructuralPath { .. })
        ));
    }

    #[test]
    fn copy_failure_aborts_the_run() {
        let dest_root = tempfile::tempdir().unwrap();
        // the source path looks valid but does not exist
        let result = stage_files(
            &[PathBuf::from(
                "/nonexistent/20190801_20190831/U02/FC/096/DEV1/eda.csv",
            )],
            dest_root.path(),
        );
        assert!(matches!(result, Err(PipelineError::File { .. })));
    }
}
