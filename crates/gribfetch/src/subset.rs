//! Byte-range subsetting and file transfer.
//!
//! Selected inventory rows are coalesced into contiguous byte-range
//! groups, each group is fetched with one ranged read (concurrently,
//! under a bounded pool), and the groups are written out in GRIB
//! message order. GRIB2 framing is self-describing, so concatenating
//! the raw ranges yields a valid file. Ranged reads work uniformly
//! against HTTP mirrors and local files.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::{header, Client, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{FetchError, Result};
use crate::inventory::InventoryRecord;

/// Concurrent ranged reads per subset download.
pub const MAX_CONCURRENT_RANGES: usize = 4;

/// One contiguous run of selected messages, fetched with a single
/// ranged read.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadGroup {
    pub start_byte: u64,
    /// `None` means "to end of file".
    pub end_byte: Option<u64>,
    pub messages: Vec<u32>,
}

impl DownloadGroup {
    fn range_header(&self) -> String {
        match self.end_byte {
            Some(end) => format!("bytes={}-{end}", self.start_byte),
            None => format!("bytes={}-", self.start_byte),
        }
    }
}

/// Coalesce rows (sorted by message number) into maximal runs of
/// consecutive messages. Groups whose computed range is inverted are
/// dropped with a warning; some RAP indexes produce these for GRIB
/// sub-messages.
pub fn coalesce(records: &[InventoryRecord]) -> Vec<DownloadGroup> {
    let mut sorted: Vec<&InventoryRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.message);

    let mut groups: Vec<DownloadGroup> = Vec::new();
    for record in sorted {
        let start_new = match groups.last() {
            Some(group) => record.message != group.messages.last().unwrap() + 1,
            None => true,
        };
        if start_new {
            groups.push(DownloadGroup {
                start_byte: record.start_byte,
                end_byte: record.end_byte,
                messages: vec![record.message],
            });
        } else {
            let group = groups.last_mut().unwrap();
            group.start_byte = group.start_byte.min(record.start_byte);
            group.end_byte = match (group.end_byte, record.end_byte) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            };
            group.messages.push(record.message);
        }
    }

    groups.retain(|group| {
        let inverted = matches!(group.end_byte, Some(end) if end < group.start_byte);
        if inverted {
            warn!(
                messages = ?group.messages,
                start = group.start_byte,
                end = ?group.end_byte,
                "Skipping group with inverted byte range"
            );
        }
        !inverted
    });

    groups
}

/// A source that serves byte ranges, remote or local.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Read `[start, end]` inclusive, or from `start` to EOF when `end`
    /// is `None`.
    async fn read_range(&self, start: u64, end: Option<u64>) -> Result<Bytes>;

    /// Total size of the underlying file, if knowable.
    async fn total_len(&self) -> Result<Option<u64>>;

    fn describe(&self) -> String;
}

/// Ranged reads against a local GRIB file.
pub struct LocalRangeSource {
    path: PathBuf,
}

impl LocalRangeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalRangeSource { path: path.into() }
    }
}

#[async_trait]
impl RangeSource for LocalRangeSource {
    async fn read_range(&self, start: u64, end: Option<u64>) -> Result<Bytes> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let data = match end {
            Some(end) => {
                let len = (end + 1).saturating_sub(start) as usize;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf).await?;
                buf
            }
            None => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).await?;
                buf
            }
        };
        Ok(Bytes::from(data))
    }

    async fn total_len(&self) -> Result<Option<u64>> {
        Ok(Some(fs::metadata(&self.path).await?.len()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Ranged reads against an HTTP mirror.
pub struct HttpRangeSource {
    client: Client,
    url: String,
    timeout: std::time::Duration,
}

impl HttpRangeSource {
    pub fn new(client: Client, url: impl Into<String>, timeout: std::time::Duration) -> Self {
        HttpRangeSource {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn read_range(&self, start: u64, end: Option<u64>) -> Result<Bytes> {
        let range = match end {
            Some(end) => format!("bytes={start}-{end}"),
            None => format!("bytes={start}-"),
        };
        debug!(url = %self.url, range = %range, "Ranged GET");

        let response = self
            .client
            .get(&self.url)
            .header(header::RANGE, range)
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(FetchError::RangeUnsupported {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.bytes().await?)
    }

    async fn total_len(&self) -> Result<Option<u64>> {
        let response = self.client.head(&self.url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok()))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Fetch the coalesced groups and assemble them, in message order, into
/// `dest`. Writes go through a `.partial` sibling that is renamed on
/// success and unlinked on any failure.
pub async fn download_groups(
    source: &dyn RangeSource,
    groups: &[DownloadGroup],
    dest: &Path,
) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp = partial_path(dest);

    let fetched: Vec<(usize, Result<Bytes>)> = stream::iter(groups.iter().enumerate())
        .map(|(i, group)| {
            let source = &source;
            async move {
                debug!(
                    group = i + 1,
                    messages = group.messages.len(),
                    range = %group.range_header(),
                    "Fetching subset group"
                );
                (i, source.read_range(group.start_byte, group.end_byte).await)
            }
        })
        .buffer_unordered(MAX_CONCURRENT_RANGES)
        .collect()
        .await;

    let mut parts: Vec<(usize, Bytes)> = Vec::with_capacity(fetched.len());
    for (i, result) in fetched {
        match result {
            Ok(bytes) => parts.push((i, bytes)),
            Err(e) => {
                fs::remove_file(&temp).await.ok();
                return Err(e);
            }
        }
    }
    // Assembly order is message order, not completion order.
    parts.sort_by_key(|(i, _)| *i);

    let write_result = async {
        let mut file = File::create(&temp).await?;
        for (_, bytes) in &parts {
            file.write_all(bytes).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok::<_, FetchError>(())
    }
    .await;

    if let Err(e) = write_result {
        fs::remove_file(&temp).await.ok();
        return Err(e);
    }

    fs::rename(&temp, dest).await?;

    let total: usize = parts.iter().map(|(_, b)| b.len()).sum();
    info!(
        path = %dest.display(),
        groups = groups.len(),
        bytes = total,
        source = %source.describe(),
        "Saved subset"
    );
    Ok(())
}

/// Stream a full file to `dest` with periodic progress logging.
pub async fn download_full(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp = partial_path(dest);

    let result = stream_to_file(client, url, &temp).await;
    match result {
        Ok(bytes) => {
            fs::rename(&temp, dest).await?;
            info!(url = %url, path = %dest.display(), bytes, "Download completed");
            Ok(bytes)
        }
        Err(e) => {
            fs::remove_file(&temp).await.ok();
            Err(e)
        }
    }
}

async fn stream_to_file(client: &Client, url: &str, temp: &Path) -> Result<u64> {
    let response = client.get(url).send().await?.error_for_status()?;

    let mut progress = DownloadProgress {
        total_bytes: response.content_length(),
        downloaded_bytes: 0,
        started_at: Utc::now(),
    };

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(temp)
        .await?;

    let mut stream = response.bytes_stream();
    let mut bytes_since_update = 0u64;
    let update_interval = 10_000_000; // log every 10 MB

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        progress.downloaded_bytes += chunk.len() as u64;
        bytes_since_update += chunk.len() as u64;

        if bytes_since_update >= update_interval {
            bytes_since_update = 0;
            debug!(
                downloaded = progress.downloaded_bytes,
                total = ?progress.total_bytes,
                percent = ?progress.percent_complete().map(|p| format!("{p:.1}%")),
                speed = format!("{:.1} MB/s", progress.bytes_per_second() / 1e6),
                "Download progress"
            );
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(progress.downloaded_bytes)
}

/// Progress counters for a streaming download.
#[derive(Debug, Clone)]
struct DownloadProgress {
    total_bytes: Option<u64>,
    downloaded_bytes: u64,
    started_at: DateTime<Utc>,
}

impl DownloadProgress {
    fn percent_complete(&self) -> Option<f64> {
        self.total_bytes
            .map(|total| (self.downloaded_bytes as f64 / total as f64) * 100.0)
    }

    fn bytes_per_second(&self) -> f64 {
        let elapsed = (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 {
            self.downloaded_bytes as f64 / elapsed
        } else {
            0.0
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!("{name}.partial"))
}
