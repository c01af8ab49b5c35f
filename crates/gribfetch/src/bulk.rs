//! Bulk acquisition: many cycles and lead times at once.
//!
//! The cross product of a date list and a lead list becomes one request
//! per pair, executed under a bounded worker pool. Results come back
//! sorted by `(lead, init_time)` no matter the completion order, and a
//! failure in one request never aborts the batch.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::error::{FetchError, Result};
use crate::fetcher::Fetcher;
use crate::request::Request;
use crate::resolver::Resolved;

/// Default worker-pool size for bulk operations.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Outcome of one request within a batch.
#[derive(Debug)]
pub struct BulkItem<T> {
    pub init_time: DateTime<Utc>,
    pub lead: u32,
    pub outcome: Result<T>,
}

/// The proto request cloned onto one `(init_time, lead)` pair.
fn instantiate(proto: &Request, init_time: DateTime<Utc>, lead: u32) -> Request {
    let mut req = proto.clone();
    req.init_time = init_time;
    req.lead = lead;
    req
}

async fn run_batch<T, F, Fut>(
    dates: &[DateTime<Utc>],
    leads: &[u32],
    proto: &Request,
    max_workers: usize,
    op: F,
) -> Vec<BulkItem<T>>
where
    F: Fn(Request) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let pairs: Vec<(DateTime<Utc>, u32)> = leads
        .iter()
        .flat_map(|&lead| dates.iter().map(move |&date| (date, lead)))
        .collect();

    info!(
        tasks = pairs.len(),
        workers = max_workers.min(pairs.len().max(1)),
        "Running bulk operation"
    );

    let mut items: Vec<BulkItem<T>> = stream::iter(pairs)
        .map(|(init_time, lead)| {
            let req = instantiate(proto, init_time, lead);
            let op = &op;
            async move {
                let outcome = op(req).await;
                if let Err(e) = &outcome {
                    warn!(init = %init_time, lead, "Bulk item failed: {e}");
                }
                BulkItem {
                    init_time,
                    lead,
                    outcome,
                }
            }
        })
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await;

    // Deterministic ordering regardless of completion order.
    items.sort_by_key(|item| (item.lead, item.init_time));
    items
}

/// Resolve every `(date, lead)` pair of the batch.
#[instrument(skip_all, fields(model = %proto.model, dates = dates.len(), leads = leads.len()))]
pub async fn resolve_many(
    fetcher: &Fetcher,
    dates: &[DateTime<Utc>],
    leads: &[u32],
    proto: &Request,
    max_workers: usize,
) -> Vec<BulkItem<Resolved>> {
    run_batch(dates, leads, proto, max_workers, |req| async move {
        fetcher.resolve(&req).await
    })
    .await
}

/// Download every `(date, lead)` pair of the batch, optionally
/// subsetting with a selector regex.
#[instrument(skip_all, fields(model = %proto.model, dates = dates.len(), leads = leads.len()))]
pub async fn download_many(
    fetcher: &Fetcher,
    dates: &[DateTime<Utc>],
    leads: &[u32],
    proto: &Request,
    selector: Option<&str>,
    max_workers: usize,
) -> Vec<BulkItem<PathBuf>> {
    run_batch(dates, leads, proto, max_workers, |req| async move {
        fetcher.download(&req, selector).await
    })
    .await
}

/// Cycle cadence for the "latest" sweep: short-range models publish
/// hourly, global models six-hourly.
fn cycle_cadence_hours(model: &str) -> u32 {
    match model {
        "hrrr" | "hrrrak" | "rap" | "rrfs" => 1,
        _ => 6,
    }
}

fn floor_to_cadence(t: DateTime<Utc>, cadence: u32) -> DateTime<Utc> {
    let t = t
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t);
    let back = t.hour() % cadence;
    t - chrono::Duration::hours(back as i64)
}

/// Find the most recent cycle whose GRIB exists, sweeping back through
/// `periods` cycles at the model's cadence.
#[instrument(skip_all, fields(model = %proto.model))]
pub async fn latest(fetcher: &Fetcher, proto: &Request, periods: usize) -> Result<(Request, Resolved)> {
    let cadence = cycle_cadence_hours(&proto.model);
    let newest = floor_to_cadence(Utc::now(), cadence);

    for i in 0..periods {
        let init_time = newest - chrono::Duration::hours((cadence as i64) * i as i64);
        let req = instantiate(proto, init_time, proto.lead);
        match fetcher.resolve(&req).await {
            Ok(resolved) if resolved.grib.is_some() => {
                info!(init = %init_time, "Found latest cycle");
                return Ok((req, resolved));
            }
            Ok(_) => debug!(init = %init_time, "Cycle has no GRIB yet"),
            Err(FetchError::Unresolvable { .. }) => {
                debug!(init = %init_time, "Cycle not available yet");
            }
            Err(e) => return Err(e),
        }
    }

    Err(FetchError::Unresolvable {
        model: proto.model.clone(),
        init_time: newest,
        lead: proto.lead,
    })
}

/// Poll one cycle until its GRIB appears or the timeout elapses.
#[instrument(skip_all, fields(model = %req.model))]
pub async fn wait_for(
    fetcher: &Fetcher,
    req: &Request,
    check_interval: Duration,
    timeout: Duration,
) -> Result<Resolved> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match fetcher.resolve(req).await {
            Ok(resolved) if resolved.grib.is_some() => return Ok(resolved),
            Ok(_) | Err(FetchError::Unresolvable { .. }) => {}
            Err(e) => return Err(e),
        }

        if tokio::time::Instant::now() + check_interval > deadline {
            return Err(FetchError::Unresolvable {
                model: req.model.clone(),
                init_time: req.init_time,
                lead: req.lead,
            });
        }
        debug!(interval = ?check_interval, "Data not available yet, waiting");
        tokio::time::sleep(check_interval).await;
    }
}
