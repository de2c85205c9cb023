//! Device list refresh
//!
//! Devices are fetched through the same cursor traversal as tracks, filtered
//! by address, and each node's nested `dataSource` object is flattened into
//! the device record. Data source keys win on collision, so the stored id is
//! the data source id used by the `tracks` filter.

use super::traversal::{CursorTraversal, TraversalRequest};
use crate::api::types::DeviceNode;
use crate::api::QueryTransport;
use crate::error::TraversalError;
use crate::storage::models::DeviceRecord;
use crate::storage::PersistenceGateway;
use serde_json::{json, Value};

/// Flatten one device node; `None` when no id survives flattening
pub fn flatten_device(mut node: DeviceNode) -> Option<DeviceRecord> {
    if let Some(Value::Object(data_source)) = node.remove("dataSource") {
        node.extend(data_source);
    }

    let id = node.get("id").and_then(Value::as_str)?.to_string();
    let name = node.get("name").and_then(Value::as_str).map(str::to_string);

    Some(DeviceRecord {
        id,
        name,
        attributes: node,
    })
}

/// Fetch all devices matching `address_filter`. On a mid-traversal failure
/// the devices gathered so far are returned alongside the error.
pub async fn fetch_devices(
    transport: &dyn QueryTransport,
    address_filter: &str,
    page_size: usize,
    max_pages: usize,
) -> (Vec<DeviceRecord>, Option<TraversalError>) {
    let request = TraversalRequest::new(
        "devices",
        json!({ "address": { "like": address_filter } }),
        page_size,
        max_pages,
    );
    let mut traversal = CursorTraversal::<DeviceNode>::new(transport, request);
    let mut devices = Vec::new();

    while let Some(result) = traversal.next_page().await {
        match result {
            Ok(page) => {
                for node in page.records {
                    match flatten_device(node) {
                        Some(device) => devices.push(device),
                        None => log::debug!("⚠️  Skipping device without id"),
                    }
                }
            }
            Err(e) => return (devices, Some(e)),
        }
    }

    (devices, None)
}

/// Fetch and persist the device list. An empty or failed fetch leaves the
/// stored list untouched until the next cycle.
pub async fn refresh_devices(
    transport: &dyn QueryTransport,
    gateway: &dyn PersistenceGateway,
    address_filter: &str,
    page_size: usize,
    max_pages: usize,
) -> usize {
    log::info!("📋 Fetching device list (address like '{}')", address_filter);
    let (devices, failure) = fetch_devices(transport, address_filter, page_size, max_pages).await;

    if let Some(e) = failure {
        log::error!("❌ Failed to fetch devices: {}", e);
        return 0;
    }

    if devices.is_empty() {
        log::warn!("⚠️  No devices returned from API, skipping device refresh this cycle");
        return 0;
    }

    match gateway.replace_device_list(&devices).await {
        Ok(()) => {
            log::info!("✅ Saved {} devices", devices.len());
            devices.len()
        }
        Err(e) => {
            log::error!("❌ Failed to save device list: {}", e);
            0
        }
    }
}
