use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::tempdir;

use wearprep::config::{PipelineConfig, RunMode};
use wearprep::discovery;
use wearprep::notify::NoopNotifier;
use wearprep::pipeline::dedup::ledger::{DuplicateLedger, LedgerConfig};
use wearprep::pipeline::{self, combine, dedup, recombine, stage, RunRequest};
use wearprep::types::StreamKind;

const MONTH: &str = "20190801_20190831";

fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        work_dir: root.join("data"),
        partition_target_bytes: 10_000,
        max_shard_bytes: 100_000,
        ledger_dir: root.join("audit"),
        notifications: false,
    }
}

fn sandbox_ledger(config: &PipelineConfig) -> DuplicateLedger {
    DuplicateLedger::open(&LedgerConfig {
        dir: config.ledger_dir.clone(),
        mode: RunMode::Sandbox,
    })
    .unwrap()
}

fn write_raw(export_root: &Path, dev: &str, stream: &str, content: &str) -> PathBuf {
    let path = export_root
        .join(format!("Sensors_U02_ALLSITES_{MONTH}"))
        .join("U02/FC/096")
        .join(dev)
        .join(format!("{stream}.csv"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn full_run_cleans_tags_and_repacks() -> Result<()> {
    let temp = tempdir()?;
    let export_root = temp.path().join("export");
    let config = test_config(temp.path());
    let ledger = sandbox_ledger(&config);

    // one exact duplicate pair, one conflicting pair, one null row
    write_raw(
        &export_root,
        "DEV1",
        "eda",
        "time,measure_value\n1,0.5\n2,0.7\n2,0.7\n3,0.1\n3,0.2\n4,nan\n",
    );
    write_raw(
        &export_root,
        "DEV1",
        "temp",
        "time,measure_value\n10,30.0\n11,30.5\n",
    );
    write_raw(&export_root, "DEV2", "temp", "time,measure_value\n10,31.0\n");

    let request = RunRequest {
        root: export_root,
        streams: vec![StreamKind::Eda, StreamKind::Temp],
        month: None,
        output_dir: temp.path().join("upload"),
        scan_only: false,
    };
    let summary = pipeline::run_full(&config, &request, &ledger, &NoopNotifier)?;

    assert_eq!(summary.staged_files, 3);
    assert_eq!(summary.classified_files, 3);
    assert_eq!(summary.rows_seen, 9);
    assert_eq!(summary.rows_dropped, 4);
    assert!(summary.errors.is_empty(), "{:?}", summary.errors);

    // staging preserved the layout below the export prefix
    let staged_eda = config
        .dedup_dir()
        .join(MONTH)
        .join("U02/FC/096/DEV1/eda.csv");
    assert!(staged_eda.exists());

    // the staged file was cleaned in place
    assert_eq!(
        fs::read_to_string(&staged_eda)?,
        "time,measure_value\n1,0.5\n2,0.7\n"
    );

    // ledger got one row per (ppt, dev, month, stream) with the counts
    let entries = ledger.load()?;
    assert_eq!(entries.len(), 3);
    let eda_entry = entries
        .iter()
        .find(|e| e.stream == "eda" && e.dev_id == "DEV1")
        .unwrap();
    assert_eq!(eda_entry.ppt_id, "fc096");
    assert_eq!(eda_entry.month, MONTH);
    assert_eq!(eda_entry.total_rows, 6);
    assert_eq!(eda_entry.total_dupes, 4);
    assert_eq!(eda_entry.perfect, 2);
    assert_eq!(eda_entry.unclear, 2);
    assert_eq!(eda_entry.nan, 1);

    // upload shards carry the stream header and the id columns
    let eda_shard = temp
        .path()
        .join("upload")
        .join(MONTH)
        .join("eda/eda_combined_0.csv");
    assert_eq!(
        fs::read_to_string(&eda_shard)?,
        "time,measure_value,dev_id,ppt_id\n1,0.5,DEV1,fc096\n2,0.7,DEV1,fc096\n"
    );

    let temp_shard = temp
        .path()
        .join("upload")
        .join(MONTH)
        .join("temp/temp_combined_0.csv");
    let temp_content = fs::read_to_string(&temp_shard)?;
    assert_eq!(temp_content.lines().count(), 4); // header + three device rows
    assert!(temp_content.contains("10,31.0,DEV2,fc096"));

    // the run summary was persisted as JSON
    let summary_json = fs::read_to_string(&summary.summary_file)?;
    let parsed: serde_json::Value = serde_json::from_str(&summary_json)?;
    assert_eq!(parsed["staged_files"], 3);

    Ok(())
}

#[test]
fn reprocessing_overwrites_the_ledger_entry() -> Result<()> {
    let temp = tempdir()?;
    let export_root = temp.path().join("export");
    let config = test_config(temp.path());
    let ledger = sandbox_ledger(&config);

    write_raw(
        &export_root,
        "DEV1",
        "eda",
        "time,measure_value\n1,0.5\n1,0.5\n2,0.7\n",
    );

    let files = discovery::discover_stream_files(&export_root)?;
    stage::stage_files(&files, &config.dedup_dir())?;

    let streams = [StreamKind::Eda];
    dedup::dedup_staged(&config, None, &streams, &ledger, false)?;
    let first = ledger.load()?;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].total_rows, 3);
    assert_eq!(first[0].perfect, 2);

    // second pass sees the already-cleaned file; same key, new counts
    dedup::dedup_staged(&config, None, &streams, &ledger, false)?;
    let second = ledger.load()?;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].total_rows, 2);
    assert_eq!(second[0].total_dupes, 0);
    assert_eq!(second[0].perfect, 0);

    Ok(())
}

#[test]
fn scan_only_records_counts_without_mutating_files() -> Result<()> {
    let temp = tempdir()?;
    let export_root = temp.path().join("export");
    let config = test_config(temp.path());
    let ledger = sandbox_ledger(&config);

    write_raw(
        &export_root,
        "DEV1",
        "temp",
        "time,measure_value\n1,30.0\n1,30.0\n2,nan\n",
    );

    let files = discovery::discover_stream_files(&export_root)?;
    stage::stage_files(&files, &config.dedup_dir())?;
    let staged = config
        .dedup_dir()
        .join(MONTH)
        .join("U02/FC/096/DEV1/temp.csv");
    let before = fs::read_to_string(&staged)?;

    let report = dedup::dedup_staged(&config, None, &[StreamKind::Temp], &ledger, true)?;
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.rows_dropped, 0);

    assert_eq!(fs::read_to_string(&staged)?, before);

    let entries = ledger.load()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].total_rows, 3);
    assert_eq!(entries[0].perfect, 2);
    assert_eq!(entries[0].nan, 1);

    Ok(())
}

#[test]
fn month_filter_restricts_deduplication() -> Result<()> {
    let temp = tempdir()?;
    let export_root = temp.path().join("export");
    let config = test_config(temp.path());
    let ledger = sandbox_ledger(&config);

    write_raw(&export_root, "DEV1", "eda", "time,measure_value\n1,0.5\n");
    let other_month = export_root
        .join("Sensors_U02_ALLSITES_20190901_20190930/U02/FC/096/DEV1/eda.csv");
    fs::create_dir_all(other_month.parent().unwrap())?;
    fs::write(&other_month, "time,measure_value\n1,0.6\n")?;

    let files = discovery::discover_stream_files(&export_root)?;
    stage::stage_files(&files, &config.dedup_dir())?;

    let report = dedup::dedup_staged(&config, Some(MONTH), &[StreamKind::Eda], &ledger, false)?;
    assert_eq!(report.files_processed, 1);

    let entries = ledger.load()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].month, MONTH);

    Ok(())
}

#[test]
fn rotation_conserves_rows_across_partitions_and_shards() -> Result<()> {
    let temp = tempdir()?;
    let config = PipelineConfig {
        work_dir: temp.path().join("data"),
        partition_target_bytes: 300,
        max_shard_bytes: 260,
        ledger_dir: temp.path().join("audit"),
        notifications: false,
    };

    // six devices, five rows each, staged directly as already-cleaned files
    let mut total_rows = 0u64;
    for dev in 0..6 {
        let path = config
            .dedup_dir()
            .join(MONTH)
            .join("U02/FC/096")
            .join(format!("DEV{dev}"))
            .join("temp.csv");
        fs::create_dir_all(path.parent().unwrap())?;
        let mut content = String::from("time,measure_value\n");
        for i in 0..5 {
            content.push_str(&format!("{},{}.0\n", 500 + dev * 10 + i, i));
            total_rows += 1;
        }
        fs::write(&path, content)?;
    }

    let combined = combine::combine_stream(&config, MONTH, StreamKind::Temp)?;
    assert_eq!(combined.rows, total_rows);
    assert!(combined.partitions.len() > 1);
    for partition in &combined.partitions {
        let size = fs::metadata(partition)?.len();
        assert!(size <= 300, "{} is {} bytes", partition.display(), size);
    }

    let output_dir = temp.path().join("upload").join(MONTH);
    let report = recombine::recombine_stream(
        &combined.partitions,
        StreamKind::Temp,
        &output_dir,
        config.max_shard_bytes,
    )?;
    assert_eq!(report.rows_in, total_rows);
    assert_eq!(report.rows_out, total_rows);
    assert!(report.shards.len() > 1);

    let header = StreamKind::Temp.combined_header_line();
    let mut rows_seen = 0u64;
    for shard in &report.shards {
        let size = fs::metadata(shard)?.len();
        assert!(size <= config.max_shard_bytes, "{} is {} bytes", shard.display(), size);
        let content = fs::read_to_string(shard)?;
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), header);
        rows_seen += lines.count() as u64;
    }
    assert_eq!(rows_seen, total_rows);

    Ok(())
}
