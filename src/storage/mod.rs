//! Persistence gateway: trait, record types and backends

pub mod gateway;
pub mod memory;
pub mod models;
pub mod sqlite;

pub use gateway::PersistenceGateway;
pub use memory::MemoryGateway;
pub use models::{AlertEvent, DetectionRecord, DeviceRecord, TagCount, TrackSummary, WindowTags};
pub use sqlite::{run_schema_migrations, SqliteGateway};
