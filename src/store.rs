//! Append-only persistence for events and alerts.
//!
//! The core only ever inserts. Review and export tooling reads this log;
//! nothing here updates or deletes. The tiny `app_state` table holds the
//! active-profile record so the switch cooldown survives restarts.

use crate::types::{Alert, LiquidityEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
            StoreError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Persisted active-profile record: the selected name and when it was
/// selected, used to enforce the switch cooldown across restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveProfileRecord {
    pub name: String,
    pub switched_at: Option<DateTime<Utc>>,
}

/// Append-only write seam. Production uses SQLite; tests substitute an
/// in-memory store.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn write_event(&self, event: &LiquidityEvent) -> Result<(), StoreError>;
    async fn write_alert(&self, alert: &Alert) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Io(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                pool_account TEXT NOT NULL,
                token_mint TEXT NOT NULL,
                base_symbol TEXT,
                sol_delta REAL NOT NULL,
                token_delta REAL NOT NULL,
                sol_before REAL NOT NULL,
                signature TEXT NOT NULL,
                observed_at INTEGER NOT NULL,
                is_new_pool INTEGER NOT NULL,
                spike_multiplier REAL,
                spike_baseline_sol REAL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_pool
             ON events(pool_account, observed_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                pair TEXT NOT NULL,
                token_mint TEXT NOT NULL,
                pool_account TEXT NOT NULL,
                signature TEXT NOT NULL,
                value_sol REAL NOT NULL,
                value_usd REAL,
                sol_before REAL,
                sol_after REAL,
                market_cap REAL,
                pair_age_hours REAL,
                is_new_pool INTEGER NOT NULL,
                early_stage_passed INTEGER NOT NULL,
                dispatched INTEGER NOT NULL,
                priority TEXT NOT NULL,
                quota_exhausted INTEGER NOT NULL,
                triggered_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_alerts_triggered
             ON alerts(triggered_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        log::info!("✅ SQLite store initialized with WAL mode");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn load_active_profile(&self) -> Result<Option<ActiveProfileRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM app_state WHERE key = 'active_profile'")?;
        let mut rows = stmt.query([])?;

        let row = match rows.next()? {
            Some(row) => row,
            None => return Ok(None),
        };

        let raw: String = row.get(0)?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Database(format!("bad active_profile record: {}", e)))?;

        let name = value
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("balanced")
            .to_string();
        let switched_at = value
            .get("switched_at")
            .and_then(serde_json::Value::as_i64)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        Ok(Some(ActiveProfileRecord { name, switched_at }))
    }

    pub fn save_active_profile(&self, record: &ActiveProfileRecord) -> Result<(), StoreError> {
        let value = serde_json::json!({
            "name": record.name,
            "switched_at": record.switched_at.map(|ts| ts.timestamp()),
        });

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO app_state (key, value) VALUES ('active_profile', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![value.to_string()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn write_event(&self, event: &LiquidityEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events
             (kind, pool_account, token_mint, base_symbol, sol_delta, token_delta,
              sol_before, signature, observed_at, is_new_pool,
              spike_multiplier, spike_baseline_sol)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                event.kind.as_str(),
                event.pool_account,
                event.token_mint,
                event.base_symbol,
                event.sol_delta,
                event.token_delta,
                event.sol_before,
                event.signature,
                event.observed_at.timestamp(),
                event.is_new_pool,
                event.spike.map(|s| s.multiplier),
                event.spike.map(|s| s.baseline_sol),
            ],
        )?;
        Ok(())
    }

    async fn write_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts
             (kind, pair, token_mint, pool_account, signature, value_sol, value_usd,
              sol_before, sol_after, market_cap, pair_age_hours, is_new_pool,
              early_stage_passed, dispatched, priority, quota_exhausted, triggered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                alert.kind.as_str(),
                alert.pair,
                alert.token_mint,
                alert.pool_account,
                alert.signature,
                alert.value_sol,
                alert.value_usd,
                alert.sol_before,
                alert.sol_after,
                alert.market_cap,
                alert.pair_age_hours,
                alert.is_new_pool,
                alert.early_stage_passed,
                alert.dispatched,
                alert.priority.as_str(),
                alert.quota_exhausted,
                alert.triggered_at.timestamp(),
            ],
        )?;
        Ok(())
    }
}

/// In-memory store for tests: records everything, loses everything.
#[derive(Default)]
pub struct MemoryStore {
    pub events: Mutex<Vec<LiquidityEvent>>,
    pub alerts: Mutex<Vec<Alert>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts_snapshot(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn events_snapshot(&self) -> Vec<LiquidityEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn write_event(&self, event: &LiquidityEvent) -> Result<(), StoreError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn write_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, Priority};
    use tempfile::tempdir;

    fn test_event(signature: &str) -> LiquidityEvent {
        LiquidityEvent {
            kind: EventKind::LpAdd,
            pool_account: "pool_1".to_string(),
            token_mint: "mint_1".to_string(),
            base_symbol: Some("TEST".to_string()),
            sol_delta: 450.0,
            token_delta: 1_000_000.0,
            sol_before: 3.0,
            signature: signature.to_string(),
            observed_at: DateTime::<Utc>::from_timestamp(1_722_470_400, 0).unwrap(),
            is_new_pool: true,
            spike: None,
        }
    }

    fn test_alert(signature: &str) -> Alert {
        Alert {
            kind: EventKind::LpAdd,
            pair: "TEST/SOL".to_string(),
            token_mint: "mint_1".to_string(),
            pool_account: "pool_1".to_string(),
            signature: signature.to_string(),
            value_sol: 450.0,
            value_usd: Some(67_500.0),
            sol_before: Some(3.0),
            sol_after: Some(453.0),
            market_cap: Some(500_000.0),
            pair_age_hours: Some(0.3),
            is_new_pool: true,
            early_stage_passed: true,
            dispatched: true,
            priority: Priority::High,
            quota_exhausted: false,
            triggered_at: DateTime::<Utc>::from_timestamp(1_722_470_400, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_event_round_trip() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();

        store.write_event(&test_event("sig_1")).await.unwrap();
        store.write_event(&test_event("sig_2")).await.unwrap();

        let conn = Connection::open(dir.path().join("test.db")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let (kind, sol_delta, is_new_pool): (String, f64, bool) = conn
            .query_row(
                "SELECT kind, sol_delta, is_new_pool FROM events WHERE signature = 'sig_1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(kind, "lp_add");
        assert_eq!(sol_delta, 450.0);
        assert!(is_new_pool);
    }

    #[tokio::test]
    async fn test_alert_written_with_decision_fields() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();

        store.write_alert(&test_alert("sig_1")).await.unwrap();

        let conn = Connection::open(dir.path().join("test.db")).unwrap();
        let (passed, dispatched, priority, quota): (bool, bool, String, bool) = conn
            .query_row(
                "SELECT early_stage_passed, dispatched, priority, quota_exhausted
                 FROM alerts WHERE signature = 'sig_1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();

        assert!(passed);
        assert!(dispatched);
        assert_eq!(priority, "high");
        assert!(!quota);
    }

    #[tokio::test]
    async fn test_rejected_events_still_persisted() {
        // The audit trail keeps every event and every decision, accepted
        // or not.
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();

        let mut rejected = test_alert("sig_r");
        rejected.early_stage_passed = false;
        rejected.dispatched = false;

        store.write_event(&test_event("sig_r")).await.unwrap();
        store.write_alert(&rejected).await.unwrap();

        let conn = Connection::open(dir.path().join("test.db")).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM alerts WHERE early_stage_passed = 0",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_active_profile_record_round_trip() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();

        assert!(store.load_active_profile().unwrap().is_none());

        let record = ActiveProfileRecord {
            name: "aggressive".to_string(),
            switched_at: DateTime::<Utc>::from_timestamp(1_722_470_400, 0),
        };
        store.save_active_profile(&record).unwrap();
        assert_eq!(store.load_active_profile().unwrap(), Some(record.clone()));

        // Saving again replaces the single record.
        let newer = ActiveProfileRecord {
            name: "balanced".to_string(),
            switched_at: DateTime::<Utc>::from_timestamp(1_723_000_000, 0),
        };
        store.save_active_profile(&newer).unwrap();
        assert_eq!(store.load_active_profile().unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_memory_store_snapshots() {
        let store = MemoryStore::new();
        store.write_event(&test_event("sig_m")).await.unwrap();
        store.write_alert(&test_alert("sig_m")).await.unwrap();

        assert_eq!(store.events_snapshot().len(), 1);
        assert_eq!(store.alerts_snapshot().len(), 1);
        assert_eq!(store.alerts_snapshot()[0].signature, "sig_m");
    }
}
