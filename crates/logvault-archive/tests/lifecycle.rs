//! End-to-end rotation and archival scenarios

use chrono::{Duration, Utc};
use logvault_archive::{bundle, list_bundles, ArchiveOutcome, Archiver};
use logvault_core::{ConfigModel, RotatedName};
use logvault_logs::LogWriter;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn load_config(dir: &Path, extra_archive: &str) -> ConfigModel {
    let yaml = format!(
        "log-directory: ./logs\n\
         active-file-name: app.log\n\
         level: info\n\
         rotation:\n  max-size-bytes: 1024\n\
         archive:\n  interval-seconds: 60\n  grace-seconds: 60\n  destination-directory: ./archive\n{}",
        extra_archive
    );
    let path = dir.join("logvault.yaml");
    fs::write(&path, yaml).unwrap();
    let config = ConfigModel::from_file(&path).unwrap();
    config.ensure_directories().unwrap();
    config
}

fn rotated_files(config: &ConfigModel) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(&config.log_directory)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            RotatedName::parse(&config.active_file_name, &e.file_name().to_string_lossy())
                .is_some()
        })
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

fn write_records(writer: &LogWriter, count: usize) {
    for i in 0..count {
        let line = format!("{:<99}\n", format!("record {}", i));
        writer.append(line.as_bytes()).unwrap();
    }
}

fn after_grace() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::seconds(62)
}

#[test]
fn test_rotation_then_archival() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path(), "");
    let writer = LogWriter::open(&config).unwrap();

    write_records(&writer, 20);

    let rotated = rotated_files(&config);
    assert_eq!(rotated.len(), 1);
    let rotated_content = fs::read(&rotated[0]).unwrap();
    assert!(rotated_content.len() <= 1024);
    assert_eq!(
        rotated_content.len() as u64 + fs::metadata(config.active_path()).unwrap().len(),
        2000
    );

    let archiver = Archiver::new(&config);

    // Still in grace
    let report = archiver.run_once();
    assert!(matches!(report.outcome, ArchiveOutcome::NoOp));
    assert_eq!(report.in_grace, 1);
    assert!(rotated[0].exists());

    let report = archiver.run_once_at(after_grace());
    let bundle_path = report.bundle().unwrap().to_path_buf();
    assert_eq!(report.archived, rotated);
    assert!(!rotated[0].exists());
    assert!(config.active_path().exists());

    let bundles = list_bundles(&config.archive.destination_directory).unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].1, bundle_path);

    let members = bundle::read_members(&bundle_path).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(
        members[0].name,
        rotated[0].file_name().unwrap().to_string_lossy()
    );
    assert_eq!(members[0].crc32, crc32fast::hash(&rotated_content));

    writer.close().unwrap();
}

#[test]
fn test_empty_runs_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path(), "");
    let archiver = Archiver::new(&config);

    for _ in 0..2 {
        let report = archiver.run_once_at(after_grace());
        assert!(matches!(report.outcome, ArchiveOutcome::NoOp));
        assert!(report.errors.is_empty());
    }
    assert!(list_bundles(&config.archive.destination_directory)
        .unwrap()
        .is_empty());
}

#[test]
fn test_crash_before_source_deletion_is_reconciled() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path(), "");
    let writer = LogWriter::open(&config).unwrap();
    write_records(&writer, 20);
    writer.rotate().unwrap().unwrap();

    let rotated = rotated_files(&config);
    assert_eq!(rotated.len(), 2);

    // Keep copies so the run looks like it died right after committing the bundle
    let saved = dir.path().join("saved");
    fs::create_dir_all(&saved).unwrap();
    for file in &rotated {
        fs::copy(file, saved.join(file.file_name().unwrap())).unwrap();
    }

    let archiver = Archiver::new(&config);
    let now = after_grace();
    let report = archiver.run_once_at(now);
    assert!(report.bundle().is_some());

    for file in &rotated {
        fs::copy(saved.join(file.file_name().unwrap()), file).unwrap();
    }

    let report = archiver.run_once_at(now + Duration::seconds(60));
    assert!(matches!(report.outcome, ArchiveOutcome::NoOp));
    assert_eq!(report.reconciled.len(), 2);
    assert!(rotated_files(&config).is_empty());
    assert_eq!(
        list_bundles(&config.archive.destination_directory)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_modified_leftover_is_archived_again() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path(), "");
    let writer = LogWriter::open(&config).unwrap();
    write_records(&writer, 20);

    let rotated = rotated_files(&config);
    let original = fs::read(&rotated[0]).unwrap();

    let archiver = Archiver::new(&config);
    let now = after_grace();
    archiver.run_once_at(now).bundle().unwrap();

    // Same name, different content: not a copy of the bundled member
    fs::write(&rotated[0], [original.as_slice(), b"extra\n"].concat()).unwrap();

    let report = archiver.run_once_at(now + Duration::seconds(1));
    assert!(report.reconciled.is_empty());
    assert!(report.bundle().is_some());
    assert_eq!(
        list_bundles(&config.archive.destination_directory)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_retention_keeps_newest_bundles() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path(), "  retention-count: 3\n");
    let destination = &config.archive.destination_directory;

    for i in 1..=5 {
        fs::write(
            destination.join(format!("20261018-12000{}-000.archive", i)),
            b"bundle",
        )
        .unwrap();
    }

    let report = Archiver::new(&config).run_once_at(after_grace());
    assert!(matches!(report.outcome, ArchiveOutcome::NoOp));
    assert_eq!(report.pruned.len(), 2);

    let left: Vec<String> = list_bundles(destination)
        .unwrap()
        .into_iter()
        .map(|(name, _)| name.file_name())
        .collect();
    assert_eq!(
        left,
        vec![
            "20261018-120003-000.archive",
            "20261018-120004-000.archive",
            "20261018-120005-000.archive"
        ]
    );
}

#[test]
fn test_scheduled_archival_with_live_writer() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path(), "");
    let writer = LogWriter::open(&config).unwrap();
    let archiver = Archiver::new(&config);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let scheduler = logvault_archive::ArchiveScheduler::start(
            std::time::Duration::from_millis(50),
            move || {
                archiver.run_once();
            },
        );

        write_records(&writer, 30);
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        scheduler.stop();
        scheduler.drain().await;
    });

    // Everything rotated is still inside the 60s grace period
    assert_eq!(rotated_files(&config).len(), 2);
    assert!(list_bundles(&config.archive.destination_directory)
        .unwrap()
        .is_empty());
}
