//! Signal persistence
//!
//! SQLite-backed history of fired signals and their outcomes.
//! The engine only needs `persist`; the outcome tracker, stats and export
//! commands read the rest back.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::criteria::CriteriaResult;
use crate::record::{Outcome, Resolution, SignalRecord};
use crate::Symbol;

/// Storage sink for signal records
pub trait SignalStore: Send + Sync {
    /// Durable once it returns; yields the assigned id
    fn persist(&self, record: &SignalRecord) -> Result<i64>;

    /// All PENDING records, oldest first
    fn pending(&self) -> Result<Vec<SignalRecord>>;

    /// Apply a terminal resolution; false when the record is unknown or already resolved
    fn resolve(&self, id: i64, resolution: &Resolution) -> Result<bool>;

    /// Newest first
    fn recent(&self, limit: usize) -> Result<Vec<SignalRecord>>;

    /// Records at or after `ts`, oldest first
    fn since(&self, ts: DateTime<Utc>) -> Result<Vec<SignalRecord>>;
}

fn ts_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// SQLite
// =============================================================================

const SELECT_COLUMNS: &str = "id, timestamp, symbol, direction, entry_price, score,
    criteria_met, total_criteria, rsi_1m, rsi_5m, rsi_15m, ema_fast, ema_slow,
    volume_ratio, atr, adx, candle_change_pct, take_profit, stop_loss,
    expected_move_pct, risk_reward, market_trend, criteria, notified, outcome,
    exit_price, exit_timestamp, actual_return_pct, minutes_to_resolution, notes";

pub struct SqliteSignalStore {
    conn: Mutex<Connection>,
}

impl SqliteSignalStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self::from_connection(conn)?;
        info!("Signal store opened at {}", db_path.display());
        Ok(store)
    }

    /// Private in-memory database, used by tests and `--dry-run`
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = SqliteSignalStore {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = lock(&self.conn);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price REAL NOT NULL,
                score REAL NOT NULL,
                criteria_met INTEGER NOT NULL,
                total_criteria INTEGER NOT NULL,
                rsi_1m REAL,
                rsi_5m REAL,
                rsi_15m REAL,
                ema_fast REAL,
                ema_slow REAL,
                volume_ratio REAL,
                atr REAL,
                adx REAL,
                candle_change_pct REAL,
                take_profit REAL NOT NULL,
                stop_loss REAL NOT NULL,
                expected_move_pct REAL,
                risk_reward REAL,
                market_trend TEXT NOT NULL,
                criteria TEXT NOT NULL DEFAULT '{}',
                notified INTEGER NOT NULL DEFAULT 0,
                outcome TEXT NOT NULL DEFAULT 'PENDING',
                exit_price REAL,
                exit_timestamp TEXT,
                actual_return_pct REAL,
                minutes_to_resolution INTEGER,
                notes TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_signals_outcome ON signals(outcome)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_signals_symbol ON signals(symbol, timestamp)",
            [],
        )?;

        debug!("Signal tables created/verified");
        Ok(())
    }

    fn query(&self, sql_tail: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<SignalRecord>> {
        let conn = lock(&self.conn);
        let sql = format!("SELECT {} FROM signals {}", SELECT_COLUMNS, sql_tail);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args, row_to_record)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn get(&self, id: i64) -> Result<Option<SignalRecord>> {
        let conn = lock(&self.conn);
        let sql = format!("SELECT {} FROM signals WHERE id = ?1", SELECT_COLUMNS);
        let record = conn
            .query_row(&sql, params![id], row_to_record)
            .optional()?;
        Ok(record)
    }
}

fn bad_column<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn parse_ts(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| bad_column(idx, e))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SignalRecord> {
    let timestamp: String = row.get(1)?;
    let direction: String = row.get(3)?;
    let trend: String = row.get(21)?;
    let criteria: String = row.get(22)?;
    let outcome: String = row.get(24)?;
    let exit_timestamp: Option<String> = row.get(26)?;

    Ok(SignalRecord {
        id: Some(row.get(0)?),
        timestamp: parse_ts(1, &timestamp)?,
        symbol: Symbol::new(row.get::<_, String>(2)?),
        direction: direction.parse().map_err(|e: String| bad_column(3, e))?,
        entry_price: row.get(4)?,
        score: row.get(5)?,
        criteria_met: row.get::<_, i64>(6)? as usize,
        total_criteria: row.get::<_, i64>(7)? as usize,
        rsi_1m: row.get(8)?,
        rsi_5m: row.get(9)?,
        rsi_15m: row.get(10)?,
        ema_fast: row.get(11)?,
        ema_slow: row.get(12)?,
        volume_ratio: row.get(13)?,
        atr: row.get(14)?,
        adx: row.get(15)?,
        candle_change_pct: row.get(16)?,
        take_profit: row.get(17)?,
        stop_loss: row.get(18)?,
        expected_move_pct: row.get(19)?,
        risk_reward: row.get(20)?,
        market_trend: trend.parse().map_err(|e: String| bad_column(21, e))?,
        criteria: serde_json::from_str::<CriteriaResult>(&criteria)
            .map_err(|e| bad_column(22, e))?,
        notified: row.get::<_, i64>(23)? != 0,
        outcome: outcome.parse().map_err(|e: String| bad_column(24, e))?,
        exit_price: row.get(25)?,
        exit_timestamp: exit_timestamp
            .as_deref()
            .map(|t| parse_ts(26, t))
            .transpose()?,
        actual_return_pct: row.get(27)?,
        minutes_to_resolution: row.get(28)?,
        notes: row.get(29)?,
    })
}

impl SignalStore for SqliteSignalStore {
    fn persist(&self, record: &SignalRecord) -> Result<i64> {
        let criteria = serde_json::to_string(&record.criteria)?;
        let conn = lock(&self.conn);

        conn.execute(
            "INSERT INTO signals (
                timestamp, symbol, direction, entry_price, score, criteria_met,
                total_criteria, rsi_1m, rsi_5m, rsi_15m, ema_fast, ema_slow,
                volume_ratio, atr, adx, candle_change_pct, take_profit, stop_loss,
                expected_move_pct, risk_reward, market_trend, criteria, notified,
                outcome, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
            params![
                ts_text(&record.timestamp),
                record.symbol.as_str(),
                record.direction.as_str(),
                record.entry_price,
                record.score,
                record.criteria_met as i64,
                record.total_criteria as i64,
                record.rsi_1m,
                record.rsi_5m,
                record.rsi_15m,
                record.ema_fast,
                record.ema_slow,
                record.volume_ratio,
                record.atr,
                record.adx,
                record.candle_change_pct,
                record.take_profit,
                record.stop_loss,
                record.expected_move_pct,
                record.risk_reward,
                record.market_trend.as_str(),
                criteria,
                record.notified as i64,
                record.outcome.as_str(),
                record.notes,
            ],
        )
        .context("Failed to insert signal")?;

        let id = conn.last_insert_rowid();
        debug!("Persisted {} {} signal #{}", record.symbol, record.direction, id);
        Ok(id)
    }

    fn pending(&self) -> Result<Vec<SignalRecord>> {
        self.query(
            "WHERE outcome = 'PENDING' ORDER BY timestamp ASC, id ASC",
            &[],
        )
    }

    fn resolve(&self, id: i64, resolution: &Resolution) -> Result<bool> {
        let conn = lock(&self.conn);
        let changed = conn.execute(
            "UPDATE signals SET
                outcome = ?1,
                exit_price = ?2,
                exit_timestamp = ?3,
                actual_return_pct = ?4,
                minutes_to_resolution = ?5
             WHERE id = ?6 AND outcome = 'PENDING'",
            params![
                resolution.outcome.as_str(),
                resolution.exit_price,
                ts_text(&resolution.exit_timestamp),
                resolution.actual_return_pct,
                resolution.minutes_to_resolution,
                id,
            ],
        )?;
        Ok(changed == 1)
    }

    fn recent(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        self.query(
            "ORDER BY timestamp DESC, id DESC LIMIT ?1",
            &[&(limit as i64)],
        )
    }

    fn since(&self, ts: DateTime<Utc>) -> Result<Vec<SignalRecord>> {
        self.query(
            "WHERE timestamp >= ?1 ORDER BY timestamp ASC, id ASC",
            &[&ts_text(&ts)],
        )
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Volatile store for dry runs and tests
#[derive(Default)]
pub struct MemorySignalStore {
    records: Mutex<Vec<SignalRecord>>,
    fail_on_persist: AtomicBool,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `persist` fail
    pub fn set_fail_on_persist(&self, fail: bool) {
        self.fail_on_persist.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<SignalRecord> {
        lock(&self.records).clone()
    }
}

impl SignalStore for MemorySignalStore {
    fn persist(&self, record: &SignalRecord) -> Result<i64> {
        if self.fail_on_persist.load(Ordering::SeqCst) {
            anyhow::bail!("memory store configured to fail");
        }
        let mut records = lock(&self.records);
        let id = records.len() as i64 + 1;
        let mut stored = record.clone();
        stored.id = Some(id);
        records.push(stored);
        Ok(id)
    }

    fn pending(&self) -> Result<Vec<SignalRecord>> {
        let mut pending: Vec<SignalRecord> = lock(&self.records)
            .iter()
            .filter(|r| r.outcome == Outcome::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.timestamp);
        Ok(pending)
    }

    fn resolve(&self, id: i64, resolution: &Resolution) -> Result<bool> {
        let mut records = lock(&self.records);
        match records
            .iter_mut()
            .find(|r| r.id == Some(id) && r.outcome == Outcome::Pending)
        {
            Some(record) => {
                record.apply(resolution);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn recent(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        let mut records = lock(&self.records).clone();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    fn since(&self, ts: DateTime<Utc>) -> Result<Vec<SignalRecord>> {
        let mut records: Vec<SignalRecord> = lock(&self.records)
            .iter()
            .filter(|r| r.timestamp >= ts)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::evaluate_criteria;
    use crate::{Direction, MarketTrend};
    use chrono::Duration;

    fn record(minutes: i64, direction: Direction) -> SignalRecord {
        SignalRecord {
            id: None,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap()
                + Duration::minutes(minutes),
            symbol: Symbol::new("ETHUSDT"),
            direction,
            entry_price: 2000.0,
            score: 91.5,
            criteria_met: 6,
            total_criteria: 8,
            rsi_1m: 55.0,
            rsi_5m: 54.0,
            rsi_15m: 57.0,
            ema_fast: 1999.0,
            ema_slow: 1995.0,
            volume_ratio: 1.4,
            atr: 10.0,
            adx: 27.0,
            candle_change_pct: 0.15,
            take_profit: 2028.0,
            stop_loss: 1987.0,
            expected_move_pct: 1.4,
            risk_reward: 2.15,
            market_trend: MarketTrend::Bullish,
            criteria: CriteriaResult::empty(direction),
            notified: true,
            outcome: Outcome::Pending,
            exit_price: None,
            exit_timestamp: None,
            actual_return_pct: None,
            minutes_to_resolution: None,
            notes: None,
        }
    }

    fn resolution(outcome: Outcome) -> Resolution {
        Resolution {
            outcome,
            exit_price: 2030.0,
            exit_timestamp: DateTime::from_timestamp(1_700_003_600, 0).unwrap(),
            actual_return_pct: 1.5,
            minutes_to_resolution: 60,
        }
    }

    #[test]
    fn test_sqlite_round_trip() {
        let store = SqliteSignalStore::open_in_memory().unwrap();
        let mut rec = record(0, Direction::Buy);
        let gate = crate::config::GateConfig::default();
        let candles: Vec<crate::Candle> = Vec::new();
        rec.criteria = evaluate_criteria(
            Direction::Buy,
            &crate::criteria::CriteriaInputs {
                price: 2001.0,
                rsi_1m: 55.0,
                rsi_15m: 57.0,
                ema_fast: 1999.0,
                ema_slow: 1995.0,
                volume: 140.0,
                volume_avg: 100.0,
                score: 91.5,
                candle_change_pct: 0.15,
                trend: MarketTrend::Bullish,
                one_minute: &candles,
            },
            &gate,
        );

        let id = store.persist(&rec).unwrap();
        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.symbol, rec.symbol);
        assert_eq!(loaded.timestamp, rec.timestamp);
        assert_eq!(loaded.criteria, rec.criteria);
        assert_eq!(loaded.market_trend, MarketTrend::Bullish);
        assert!(loaded.notified);
        assert!(store.get(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_resolve_only_pending() {
        let store = SqliteSignalStore::open_in_memory().unwrap();
        let id = store.persist(&record(0, Direction::Buy)).unwrap();
        store.persist(&record(5, Direction::Sell)).unwrap();

        assert_eq!(store.pending().unwrap().len(), 2);
        assert!(store.resolve(id, &resolution(Outcome::WinTp)).unwrap());
        assert!(!store.resolve(id, &resolution(Outcome::LossSl)).unwrap());

        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.outcome, Outcome::WinTp);
        assert_eq!(loaded.exit_price, Some(2030.0));
        assert_eq!(loaded.minutes_to_resolution, Some(60));
        assert_eq!(store.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_recent_and_since() {
        let store = SqliteSignalStore::open_in_memory().unwrap();
        for m in [0, 10, 20, 30] {
            store.persist(&record(m, Direction::Buy)).unwrap();
        }
        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp > recent[1].timestamp);

        let cutoff = DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(15);
        let since = store.since(cutoff).unwrap();
        assert_eq!(since.len(), 2);
        assert!(since[0].timestamp < since[1].timestamp);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySignalStore::new();
        let id = store.persist(&record(0, Direction::Sell)).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.resolve(id, &resolution(Outcome::LossTime)).unwrap());
        assert!(store.pending().unwrap().is_empty());

        store.set_fail_on_persist(true);
        assert!(store.persist(&record(1, Direction::Sell)).is_err());
        assert_eq!(store.len(), 1);
    }
}
