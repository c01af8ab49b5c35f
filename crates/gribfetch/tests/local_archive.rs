//! End-to-end acquisition against a local archive.
//!
//! A user-provided YAML template points a `local` source at a synthetic
//! GRIB-like file with a matching wgrib2-style index, which exercises
//! the whole pipeline (template evaluation, resolution, inventory,
//! coalescing, ranged reads, assembly, naming) without any network.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use gribfetch::{AppConfig, FetchError, Fetcher, Request};
use tempfile::TempDir;

/// Synthetic messages with distinct content and lengths.
const MESSAGES: [&[u8]; 4] = [
    b"GRIB-alpha-payload-7777",
    b"GRIB-bravo-7777",
    b"GRIB-charlie-long-payload-7777",
    b"GRIB-delta-77",
];

struct LocalArchive {
    _dir: TempDir,
    grib_path: PathBuf,
    save_dir: PathBuf,
    full_content: Vec<u8>,
    offsets: Vec<u64>,
}

fn build_archive() -> LocalArchive {
    let dir = TempDir::new().unwrap();

    let day_dir = dir.path().join("archive").join("testwrf.20230101");
    std::fs::create_dir_all(&day_dir).unwrap();
    let grib_path = day_dir.join("testwrf.t06z.f00.grib2");

    let mut full_content = Vec::new();
    let mut offsets = Vec::new();
    for message in MESSAGES {
        offsets.push(full_content.len() as u64);
        full_content.extend_from_slice(message);
    }
    std::fs::write(&grib_path, &full_content).unwrap();

    let variables = ["REFC", "TMP", "UGRD", "VGRD"];
    let levels = [
        "entire atmosphere",
        "2 m above ground",
        "10 m above ground",
        "10 m above ground",
    ];
    let mut idx = String::new();
    for (i, offset) in offsets.iter().enumerate() {
        idx.push_str(&format!(
            "{}:{}:d=2023010106:{}:{}:anl:\n",
            i + 1,
            offset,
            variables[i],
            levels[i]
        ));
    }
    std::fs::write(day_dir.join("testwrf.t06z.f00.grib2.idx"), idx).unwrap();

    let template_dir = dir.path().join("templates");
    std::fs::create_dir_all(&template_dir).unwrap();
    let template = format!(
        r#"
model: testwrf
description: "Test WRF archive"
products:
  - name: sfc
    description: "surface fields"
sources:
  - name: local
    url: "{}/testwrf.{{date}}/testwrf.t{{cycle:02}}z.f{{fxx:02}}.grib2"
idx_suffixes: [".grib2.idx"]
idx_dialect: wgrib2
"#,
        dir.path().join("archive").display()
    );
    std::fs::write(template_dir.join("testwrf.yaml"), template).unwrap();

    let save_dir = dir.path().join("save");

    LocalArchive {
        grib_path,
        save_dir,
        full_content,
        offsets,
        _dir: dir,
    }
}

fn fetcher_for(archive: &LocalArchive) -> Fetcher {
    let mut config = AppConfig::default();
    config.save_dir = archive.save_dir.clone();
    config.template_dir = Some(
        archive
            .grib_path
            .ancestors()
            .nth(3)
            .unwrap()
            .join("templates"),
    );
    Fetcher::with_config(config).unwrap()
}

fn request() -> Request {
    Request::builder("testwrf")
        .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
        .build()
        .unwrap()
}

fn message_len(msg: usize) -> u64 {
    MESSAGES[msg - 1].len() as u64
}

fn subset_file_in(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with("subset_"))
                .unwrap_or(false)
        })
}

#[tokio::test]
async fn resolves_local_source_for_grib_and_index() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let resolved = fetcher.resolve(&req).await.unwrap();
    assert_eq!(resolved.grib_source.as_deref(), Some("local"));
    assert_eq!(resolved.idx_source.as_deref(), Some("local"));
    assert_eq!(
        resolved.grib.unwrap().as_local_path(),
        Some(&archive.grib_path)
    );
}

#[tokio::test]
async fn inventory_rows_follow_the_index_invariants() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let inventory = fetcher.inventory(&req, None).await.unwrap();
    assert_eq!(inventory.messages(), vec![1, 2, 3, 4]);
    for (record, offset) in inventory.records.iter().zip(&archive.offsets) {
        assert_eq!(record.start_byte, *offset);
    }
    assert_eq!(inventory.records.last().unwrap().end_byte, None);
}

#[tokio::test]
async fn inventory_is_memoized_per_request() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let first = fetcher.inventory(&req, None).await.unwrap();

    // Remove the index from disk; the memoized table must still serve.
    let idx_path = archive.grib_path.with_file_name("testwrf.t06z.f00.grib2.idx");
    std::fs::remove_file(&idx_path).unwrap();

    let second = fetcher.inventory(&req, Some(":TMP:2 m above ground:")).await.unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 1);
    assert_eq!(second.records[0].message, 2);
}

#[tokio::test]
async fn single_row_subset_matches_its_byte_range() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let path = fetcher
        .download(&req, Some(":TMP:2 m above ground:"))
        .await
        .unwrap();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("subset_"));
    assert!(name.ends_with("__testwrf.t06z.f00.grib2"));

    let content = std::fs::read(&path).unwrap();
    assert_eq!(content.len() as u64, message_len(2));
    assert_eq!(content, MESSAGES[1]);
}

#[tokio::test]
async fn two_row_subset_concatenates_in_message_order() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let path = fetcher
        .download(&req, Some(":(?:U|V)GRD:10 m"))
        .await
        .unwrap();

    let content = std::fs::read(&path).unwrap();
    let mut expected = Vec::new();
    expected.extend_from_slice(MESSAGES[2]);
    expected.extend_from_slice(MESSAGES[3]);
    assert_eq!(content, expected);
    assert_eq!(
        content.len() as u64,
        message_len(3) + message_len(4)
    );
}

#[tokio::test]
async fn selecting_every_row_reproduces_the_full_file() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let path = fetcher.download(&req, Some(":")).await.unwrap();
    // ":" is a pass-through selector, so this is the full-file path.
    assert_eq!(path, archive.grib_path);

    let path = fetcher.download(&req, Some(":anl")).await.unwrap();
    let content = std::fs::read(&path).unwrap();
    assert_eq!(content, archive.full_content);
}

#[tokio::test]
async fn subset_filename_is_stable_across_equivalent_selectors() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    // Different regex text, same selected messages.
    let a = fetcher
        .local_subset_path(&req, Some(":(?:U|V)GRD:10 m"))
        .await
        .unwrap();
    let b = fetcher
        .local_subset_path(&req, Some(":(UGRD|VGRD):"))
        .await
        .unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn second_download_uses_the_cached_subset() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let first = fetcher.download(&req, Some(":REFC:")).await.unwrap();
    let before = std::fs::metadata(&first).unwrap().modified().unwrap();

    let second = fetcher.download(&req, Some(":REFC:")).await.unwrap();
    assert_eq!(first, second);
    let after = std::fs::metadata(&second).unwrap().modified().unwrap();
    assert_eq!(before, after);

    let parent = first.parent().unwrap();
    assert!(subset_file_in(parent).is_some());
}

#[tokio::test]
async fn unknown_model_is_rejected() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = Request::builder("nosuchmodel")
        .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
        .build()
        .unwrap();
    assert!(matches!(
        fetcher.resolve(&req).await.unwrap_err(),
        FetchError::UnknownModel(_)
    ));
}

#[tokio::test]
async fn empty_selection_downloads_nothing() {
    let archive = build_archive();
    let fetcher = fetcher_for(&archive);
    let req = request();

    let outcome = fetcher
        .download_with_policy(&req, Some(":NOPE:"), gribfetch::ErrorPolicy::Warn)
        .await
        .unwrap();
    assert!(outcome.is_none());
}
