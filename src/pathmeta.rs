use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result};

/// Date-range token embedded in every export path, e.g. `20190801_20190831`.
static MONTH_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{8}_\d{8}").unwrap());

/// Identifiers derived from a stream file's position in the export layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathIds {
    pub device_id: String,
    pub ppt_id: String,
}

/// Find the month-range token embedded somewhere in `path`.
///
/// Its absence is a hard precondition failure: a path without the token
/// indicates a data-layout bug upstream, not a recoverable case.
pub fn month_token(path: &Path) -> Result<String> {
    let text = path.to_string_lossy();
    MONTH_TOKEN_RE
        .find(&text)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PipelineError::structural(path, "no 8digit_8digit month token"))
}

/// Derive device and participant ids from the fixed export layout
/// `.../<month-token>/<site>/<ppt-suffix>/<device_id>/<stream>.csv`.
///
/// The device id sits exactly two segments above the file name; the
/// participant id is `lowercase(site)` concatenated with the participant
/// suffix from the two segments above that.
pub fn extract_ids(path: &Path) -> Result<PathIds> {
    let segments: Vec<&str> = path
        .iter()
        .map(|s| s.to_str().unwrap_or(""))
        .filter(|s| !s.is_empty() && *s != "/")
        .collect();

    // file name + device + ppt-suffix + site
    if segments.len() < 4 {
        return Err(PipelineError::structural(
            path,
            "too few path segments to derive device and participant ids",
        ));
    }

    let device_id = segments[segments.len() - 2].to_string();
    let site = segments[segments.len() - 4];
    let ppt_suffix = segments[segments.len() - 3];
    let ppt_id = format!("{}{}", site.to_lowercase(), ppt_suffix);

    Ok(PathIds { device_id, ppt_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extracts_ids_from_export_path() {
        let path =
            PathBuf::from("Sensors_U02_ALLSITES_20190801_20190831/U02/FC/096/2M4Y4111FK/temp.csv");
        let ids = extract_ids(&path).unwrap();
        assert_eq!(ids.device_id, "2M4Y4111FK");
        assert_eq!(ids.ppt_id, "fc096");
    }

    #[test]
    fn extracts_ids_from_staged_path() {
        let path = PathBuf::from("data/deduplication/20190801_20190831/U02/MGH/123/DEVICE1/eda.csv");
        let ids = extract_ids(&path).unwrap();
        assert_eq!(ids.device_id, "DEVICE1");
        assert_eq!(ids.ppt_id, "mgh123");
    }

    #[test]
    fn finds_month_token_anywhere_in_path() {
        let path =
            PathBuf::from("/exports/Sensors_U02_ALLSITES_20190801_20190831/U02/FC/096/D1/acc.csv");
        assert_eq!(month_token(&path).unwrap(), "20190801_20190831");
    }

    #[test]
    fn missing_month_token_is_a_structural_error() {
        let path = PathBuf::from("/exports/nothing/here/acc.csv");
        assert!(matches!(
            month_token(&path),
            Err(PipelineError::StructuralPath { .. })
        ));
    }

    #[test]
    fn short_path_is_a_structural_error() {
        let path = PathBuf::from("FC/096/temp.csv");
        assert!(matches!(
            extract_ids(&path),
            Err(PipelineError::StructuralPath { .. })
        ));
    }
}
