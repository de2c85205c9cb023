//! trackflow - detection activity aggregation and ingestion
//!
//! Two pipelines share one persistence gateway:
//! - `dashboard`: periodic cursor traversal of the `tracks` collection over a
//!   trailing window, folded into tag counts, top tracks and zones
//! - `ingest`: a supervised live subscription feeding a bounded queue that a
//!   batch flusher drains into the datastore

pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod storage;
pub mod timestamps;
