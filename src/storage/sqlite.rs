//! SQLite implementation of `PersistenceGateway`
//!
//! One connection behind a mutex; WAL journal mode. Replace operations run
//! inside a single transaction so readers never see a half-replaced list.

use super::gateway::PersistenceGateway;
use super::models::{AlertEvent, DetectionRecord, DeviceRecord, TrackSummary, WindowTags};
use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir`, sorted by filename (01_, 02_, ...),
/// and executes them. Every file uses `IF NOT EXISTS`, so this is idempotent.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), PersistenceError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(PersistenceError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Schema directory not found: {}", schema_dir),
        )));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().to_string();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Open (creating parent directories) and migrate the database
    pub fn open(db_path: &str, schema_dir: &str) -> Result<Self, PersistenceError> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(db_path)?;
        run_schema_migrations(&mut conn, schema_dir)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::Database("connection mutex poisoned".to_string()))
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn upsert_window_tags(&self, summary: &WindowTags) -> Result<(), PersistenceError> {
        let tags_json = serde_json::to_string(&summary.tags)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO tags_series (device_id, timestamp, tags_json, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(device_id, timestamp) DO UPDATE SET
                tags_json = excluded.tags_json
            "#,
            params![summary.device_id, iso(summary.timestamp), tags_json, Utc::now().timestamp()],
        )?;

        Ok(())
    }

    async fn replace_top_tracks(
        &self,
        device_id: &str,
        tracks: &[TrackSummary],
    ) -> Result<(), PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM top_tracks WHERE device_id = ?1", params![device_id])?;

        for (rank, track) in tracks.iter().enumerate() {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO top_tracks (
                    id, device_id, timestamp, rank, length, detections, tag,
                    thumbnail_url, track_confidence_average, zones_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    track.id,
                    device_id,
                    iso(track.timestamp),
                    rank as i64,
                    track.duration_secs,
                    track.detections as i64,
                    track.tag,
                    track.thumbnail_url,
                    track.mean_confidence,
                    serde_json::to_string(&track.zones)?,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn upsert_zones(
        &self,
        device_id: &str,
        zones: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let zones_json = serde_json::to_string(zones)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO zones (device_id, timestamp, zones_json)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(device_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                zones_json = excluded.zones_json
            "#,
            params![device_id, iso(timestamp), zones_json],
        )?;

        Ok(())
    }

    async fn insert_detection_batch(&self, batch: &[DetectionRecord]) -> Result<(), PersistenceError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for record in batch {
            tx.execute(
                r#"
                INSERT INTO detection_activity (timestamp, source_id, source_name, tag, event_count)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    iso(record.timestamp),
                    record.source_id,
                    record.source_name,
                    record.tag,
                    record.event_count,
                ],
            )?;
        }

        tx.commit()?;
        log::debug!("✅ Inserted {} detection records", batch.len());
        Ok(())
    }

    async fn upsert_event(&self, event: &AlertEvent) -> Result<(), PersistenceError> {
        let metadata_json = serde_json::to_string(&event.metadata)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO events (
                id, event_producer_id, type, sub_type, start_time, end_time,
                metadata_json, draft, priority
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                event_producer_id = excluded.event_producer_id,
                type = excluded.type,
                sub_type = excluded.sub_type,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                metadata_json = excluded.metadata_json,
                draft = excluded.draft,
                priority = excluded.priority
            "#,
            params![
                event.id,
                event.event_producer_id,
                event.event_type,
                event.sub_type,
                iso(event.start_time),
                iso(event.end_time),
                metadata_json,
                event.draft,
                event.priority,
            ],
        )?;

        Ok(())
    }

    async fn replace_device_list(&self, devices: &[DeviceRecord]) -> Result<(), PersistenceError> {
        let now = Utc::now().timestamp();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM devices", [])?;
        for device in devices {
            tx.execute(
                "INSERT OR REPLACE INTO devices (id, name, attributes_json, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    device.id,
                    device.name,
                    serde_json::to_string(&device.attributes)?,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::TagCount;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, SqliteGateway) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();
        let gateway = SqliteGateway::open(&db_path, "sql").unwrap();
        (temp_file, gateway)
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn track(id: &str, duration: f64) -> TrackSummary {
        TrackSummary {
            id: id.to_string(),
            device_id: "dev".to_string(),
            timestamp: ts(1_700_000_000),
            duration_secs: duration,
            detections: 3,
            tag: "car".to_string(),
            thumbnail_url: None,
            mean_confidence: Some(0.5),
            zones: vec!["lane".to_string()],
        }
    }

    fn count(gateway: &SqliteGateway, sql: &str) -> i64 {
        let conn = gateway.conn.lock().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_window_tags_is_idempotent() {
        let (_temp, gateway) = create_test_db();
        let mut summary = WindowTags {
            device_id: "dev".to_string(),
            timestamp: ts(1_700_000_000),
            tags: vec![TagCount::new("car", 2)],
        };

        gateway.upsert_window_tags(&summary).await.unwrap();
        summary.tags = vec![TagCount::new("car", 3), TagCount::new("person", 1)];
        gateway.upsert_window_tags(&summary).await.unwrap();

        assert_eq!(count(&gateway, "SELECT COUNT(*) FROM tags_series"), 1);

        let conn = gateway.conn.lock().unwrap();
        let stored: String = conn
            .query_row("SELECT tags_json FROM tags_series", [], |row| row.get(0))
            .unwrap();
        let parsed: Vec<TagCount> = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, summary.tags);
    }

    #[tokio::test]
    async fn test_replace_top_tracks_drops_previous_window() {
        let (_temp, gateway) = create_test_db();

        gateway
            .replace_top_tracks("dev", &[track("a", 10.0), track("b", 5.0)])
            .await
            .unwrap();
        gateway.replace_top_tracks("dev", &[track("c", 30.0)]).await.unwrap();

        assert_eq!(count(&gateway, "SELECT COUNT(*) FROM top_tracks"), 1);
        let conn = gateway.conn.lock().unwrap();
        let id: String = conn
            .query_row("SELECT id FROM top_tracks WHERE device_id = 'dev'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, "c");
    }

    #[tokio::test]
    async fn test_upsert_zones_overwrites() {
        let (_temp, gateway) = create_test_db();

        gateway
            .upsert_zones("dev", &["a".to_string()], ts(100))
            .await
            .unwrap();
        gateway
            .upsert_zones("dev", &["a".to_string(), "b".to_string()], ts(200))
            .await
            .unwrap();

        let conn = gateway.conn.lock().unwrap();
        let (stamp, zones): (String, String) = conn
            .query_row("SELECT timestamp, zones_json FROM zones WHERE device_id = 'dev'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(stamp, iso(ts(200)));
        assert_eq!(zones, r#"["a","b"]"#);
    }

    #[tokio::test]
    async fn test_insert_detection_batch() {
        let (_temp, gateway) = create_test_db();
        let batch: Vec<DetectionRecord> = (0..5)
            .map(|i| DetectionRecord {
                timestamp: ts(1_700_000_000 + i),
                source_id: "ds".to_string(),
                source_name: "Cam".to_string(),
                tag: Some("person".to_string()),
                event_count: 1,
            })
            .collect();

        gateway.insert_detection_batch(&batch).await.unwrap();
        gateway.insert_detection_batch(&[]).await.unwrap();

        assert_eq!(count(&gateway, "SELECT COUNT(*) FROM detection_activity"), 5);
    }

    #[tokio::test]
    async fn test_upsert_event_and_devices() {
        let (_temp, gateway) = create_test_db();
        let event = AlertEvent {
            id: "evt-1".to_string(),
            event_producer_id: "producer".to_string(),
            event_type: "object-of-interest".to_string(),
            sub_type: "yellow_vest".to_string(),
            start_time: ts(100),
            end_time: ts(100),
            metadata: json!({"notes": "n"}),
            draft: false,
            priority: "high".to_string(),
        };
        gateway.upsert_event(&event).await.unwrap();
        gateway.upsert_event(&event).await.unwrap();
        assert_eq!(count(&gateway, "SELECT COUNT(*) FROM events"), 1);

        let device = DeviceRecord {
            id: "ds".to_string(),
            name: Some("Cam".to_string()),
            attributes: serde_json::Map::new(),
        };
        gateway.replace_device_list(&[device.clone()]).await.unwrap();
        gateway.replace_device_list(&[device]).await.unwrap();
        assert_eq!(count(&gateway, "SELECT COUNT(*) FROM devices"), 1);
    }

    #[test]
    fn test_missing_schema_dir() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = run_schema_migrations(&mut conn, "definitely/not/here");
        assert!(matches!(result, Err(PersistenceError::Io(_))));
    }
}
