//! Periodic window aggregation
//!
//! One cycle: refresh the device list, then for every configured device walk
//! the `tracks` collection for the trailing window, fold it into a fresh
//! `WindowAccumulator` and persist the summary. Cycles never overlap.

use super::devices::refresh_devices;
use super::traversal::{CursorTraversal, StopReason, TraversalRequest};
use super::window::{WindowAccumulator, WindowSummary};
use crate::api::types::TrackNode;
use crate::api::QueryTransport;
use crate::config::DashboardConfig;
use crate::error::TraversalError;
use crate::storage::PersistenceGateway;
use crate::timestamps::iso_millis;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Outcome of aggregating one device window
#[derive(Debug)]
pub struct WindowReport {
    pub summary: WindowSummary,
    pub pages: usize,
    pub stop_reason: Option<StopReason>,
    /// Set when paging aborted; `summary` then holds the partial aggregation
    pub failure: Option<TraversalError>,
    pub persisted: bool,
}

/// `{dataSourceId: {eq}, time: {between: [start, end]}}`
pub fn window_filter(device_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Value {
    json!({
        "dataSourceId": { "eq": device_id },
        "time": { "between": [iso_millis(start), iso_millis(end)] }
    })
}

/// Aggregate the window ending at `window_end` for one device and persist it.
///
/// A fetch failure stops paging; whatever was aggregated up to that point is
/// still persisted and the failure is returned in the report. Persistence
/// failures are logged and reflected in `persisted`.
pub async fn aggregate_window(
    transport: &dyn QueryTransport,
    gateway: &dyn PersistenceGateway,
    device_id: &str,
    window_end: DateTime<Utc>,
    config: &DashboardConfig,
) -> WindowReport {
    let window_start = window_end - ChronoDuration::minutes(config.window_minutes);
    let request = TraversalRequest::new(
        "tracks",
        window_filter(device_id, window_start, window_end),
        config.page_size,
        config.max_pages,
    );

    let mut accumulator = WindowAccumulator::new(device_id, window_end);
    let mut traversal = CursorTraversal::<TrackNode>::new(transport, request);
    let mut failure = None;

    while let Some(result) = traversal.next_page().await {
        match result {
            Ok(page) => {
                log::debug!(
                    "📄 {} page {}: {} tracks",
                    device_id,
                    traversal.pages_fetched(),
                    page.records.len()
                );
                accumulator.add_undecodable(page.rejected);
                accumulator.add_page(page.records);
            }
            Err(e) => {
                log::error!("❌ Failed to fetch tracks for {}: {}", device_id, e);
                failure = Some(e);
            }
        }
    }

    let pages = traversal.pages_fetched();
    let stop_reason = traversal.stop_reason();
    let summary = accumulator.finish(config.top_tracks);
    let persisted = persist_summary(gateway, &summary).await;

    WindowReport {
        summary,
        pages,
        stop_reason,
        failure,
        persisted,
    }
}

async fn persist_summary(gateway: &dyn PersistenceGateway, summary: &WindowSummary) -> bool {
    let mut ok = true;

    if let Err(e) = gateway.upsert_window_tags(&summary.window_tags()).await {
        log::error!("❌ Failed to store tag counts for {}: {}", summary.device_id, e);
        ok = false;
    }
    if let Err(e) = gateway
        .replace_top_tracks(&summary.device_id, &summary.top_tracks)
        .await
    {
        log::error!("❌ Failed to store top tracks for {}: {}", summary.device_id, e);
        ok = false;
    }
    if let Err(e) = gateway
        .upsert_zones(&summary.device_id, &summary.zones, summary.timestamp)
        .await
    {
        log::error!("❌ Failed to store zones for {}: {}", summary.device_id, e);
        ok = false;
    }

    ok
}

/// One full cycle over every configured device, in order
pub async fn run_cycle(
    transport: &dyn QueryTransport,
    gateway: &dyn PersistenceGateway,
    config: &DashboardConfig,
    window_end: DateTime<Utc>,
) -> Vec<WindowReport> {
    refresh_devices(
        transport,
        gateway,
        &config.device_address_filter,
        config.page_size,
        config.max_pages,
    )
    .await;

    let mut reports = Vec::with_capacity(config.device_ids.len());
    for device_id in &config.device_ids {
        log::info!("📊 Aggregating tracks for device {}", device_id);
        let report = aggregate_window(transport, gateway, device_id, window_end, config).await;

        log::info!(
            "   ├─ {} tracks over {} pages ({:?})",
            report.summary.records_processed,
            report.pages,
            report.stop_reason
        );
        log::info!(
            "   └─ {} tags, {} top tracks, {} zones",
            report.summary.tag_counts.len(),
            report.summary.top_tracks.len(),
            report.summary.zones.len()
        );
        reports.push(report);
    }

    reports
}

/// Run aggregation cycles every `poll_interval` until `shutdown` fires.
///
/// The first cycle starts immediately. Shutdown is only observed between
/// cycles, so an in-flight cycle always completes. A panicking cycle is
/// logged and the loop carries on.
pub async fn run_poll_cycles(
    transport: Arc<dyn QueryTransport>,
    gateway: Arc<dyn PersistenceGateway>,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> u64 {
    log::info!(
        "⏰ Starting dashboard poll loop (interval: {}s, window: {}m, devices: {})",
        config.poll_interval.as_secs(),
        config.window_minutes,
        config.device_ids.len()
    );

    let mut timer = interval(config.poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => {}
        }

        let cycle = {
            let transport = Arc::clone(&transport);
            let gateway = Arc::clone(&gateway);
            let config = config.clone();
            tokio::spawn(async move {
                run_cycle(transport.as_ref(), gateway.as_ref(), &config, Utc::now()).await;
            })
        };

        match cycle.await {
            Ok(()) => log::info!("✅ Cycle finished, next in {}s", config.poll_interval.as_secs()),
            Err(e) => log::error!("❌ Unexpected failure in aggregation cycle: {}", e),
        }
        cycles += 1;
    }

    log::info!("🛑 Dashboard poll loop stopped after {} cycles", cycles);
    cycles
}
