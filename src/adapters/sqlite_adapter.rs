//! SQLite adapter: bar store, ledger store, and analysis sink.
//!
//! One pooled connection set backs all three ports. Ledger mutations run
//! inside transactions so a position and its holding land together; the
//! holdings upsert accumulates realized P&L instead of overwriting it.

use crate::domain::bar::Bar;
use crate::domain::error::OitraderError;
use crate::domain::holding::Holding;
use crate::domain::oi::{Confidence, Direction, Interpretation, OiAnalysis};
use crate::domain::position::{Position, PositionStatus, Side};
use crate::ports::analysis_port::{AnalysisSinkPort, BarKey};
use crate::ports::bar_port::BarPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerStorePort, NewPosition};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Transaction, params};

fn pool_err(e: r2d2::Error) -> OitraderError {
    OitraderError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> OitraderError {
    OitraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn text_column<T>(
    index: usize,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, rusqlite::Error> {
    parse(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            format!("unrecognized value: {value}").into(),
        )
    })
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, OitraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| OitraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4);
        if !(1..=i64::from(u32::MAX)).contains(&pool_size) {
            return Err(OitraderError::ConfigInvalid {
                section: "sqlite".into(),
                key: "pool_size".into(),
                reason: format!("must be a positive connection count, got {pool_size}"),
            });
        }
        let pool_size = pool_size as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, OitraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                instrument TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                epoch_time INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                open_interest REAL NOT NULL,
                PRIMARY KEY (instrument, timeframe, epoch_time)
            );
            CREATE INDEX IF NOT EXISTS idx_bars_series ON bars(instrument, timeframe);

            CREATE TABLE IF NOT EXISTS holdings (
                instrument TEXT PRIMARY KEY,
                quantity REAL NOT NULL,
                avg_price REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                unrealized_pnl REAL NOT NULL,
                total_value REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                entry_time INTEGER NOT NULL,
                quantity REAL NOT NULL,
                status TEXT NOT NULL,
                exit_price REAL,
                exit_time INTEGER,
                pnl REAL,
                strategy_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_positions_instrument ON positions(instrument, status);
            CREATE INDEX IF NOT EXISTS idx_positions_strategy ON positions(strategy_id);

            CREATE TABLE IF NOT EXISTS oi_analysis (
                instrument TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                epoch_time INTEGER NOT NULL,
                price_change REAL NOT NULL,
                price_change_pct REAL NOT NULL,
                oi_change REAL NOT NULL,
                oi_change_pct REAL NOT NULL,
                price_direction TEXT NOT NULL,
                oi_direction TEXT NOT NULL,
                interpretation TEXT NOT NULL,
                confidence TEXT NOT NULL,
                PRIMARY KEY (instrument, timeframe, epoch_time)
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn upsert_bars(&self, bars: &[Bar]) -> Result<(), OitraderError> {
        let mut conn = self.pool.get().map_err(pool_err)?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars
                 (instrument, timeframe, epoch_time, open, high, low, close, volume, open_interest)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    bar.instrument,
                    bar.timeframe,
                    bar.epoch_time,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.open_interest
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    /// Stored classification for one bar, if any.
    pub fn fetch_analysis(&self, key: &BarKey) -> Result<Option<OiAnalysis>, OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT price_change, price_change_pct, oi_change, oi_change_pct,
                        price_direction, oi_direction, interpretation, confidence
                 FROM oi_analysis
                 WHERE instrument = ?1 AND timeframe = ?2 AND epoch_time = ?3",
            )
            .map_err(query_err)?;

        let mut rows = stmt
            .query_map(
                params![key.instrument, key.timeframe, key.epoch_time],
                |row| {
                    let price_direction: String = row.get(4)?;
                    let oi_direction: String = row.get(5)?;
                    let interpretation: String = row.get(6)?;
                    let confidence: String = row.get(7)?;
                    Ok(OiAnalysis {
                        price_change: row.get(0)?,
                        price_change_pct: row.get(1)?,
                        oi_change: row.get(2)?,
                        oi_change_pct: row.get(3)?,
                        price_direction: text_column(4, &price_direction, Direction::parse)?,
                        oi_direction: text_column(5, &oi_direction, Direction::parse)?,
                        interpretation: text_column(6, &interpretation, Interpretation::parse)?,
                        confidence: text_column(7, &confidence, Confidence::parse)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.next().transpose().map_err(query_err)
    }

    fn upsert_holding_tx(
        tx: &Transaction,
        holding: &Holding,
        realized_delta: f64,
    ) -> Result<(), OitraderError> {
        tx.execute(
            "INSERT INTO holdings
             (instrument, quantity, avg_price, realized_pnl, unrealized_pnl, total_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(instrument) DO UPDATE SET
                 quantity = excluded.quantity,
                 avg_price = excluded.avg_price,
                 realized_pnl = holdings.realized_pnl + ?4,
                 unrealized_pnl = excluded.unrealized_pnl,
                 total_value = excluded.total_value",
            params![
                holding.instrument,
                holding.quantity,
                holding.avg_price,
                realized_delta,
                holding.unrealized_pnl,
                holding.total_value
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn row_to_position(row: &rusqlite::Row<'_>) -> Result<Position, rusqlite::Error> {
        let side: String = row.get(2)?;
        let status: String = row.get(6)?;
        Ok(Position {
            id: row.get(0)?,
            instrument: row.get(1)?,
            side: text_column(2, &side, Side::parse)?,
            entry_price: row.get(3)?,
            entry_time: row.get(4)?,
            quantity: row.get(5)?,
            status: text_column(6, &status, PositionStatus::parse)?,
            exit_price: row.get(7)?,
            exit_time: row.get(8)?,
            pnl: row.get(9)?,
            strategy_id: row.get(10)?,
        })
    }

    fn query_positions(
        &self,
        query: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Position>, OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;
        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt
            .query_map(params, |row| Self::row_to_position(row))
            .map_err(query_err)?;

        let mut positions = Vec::new();
        for row in rows {
            positions.push(row.map_err(query_err)?);
        }
        Ok(positions)
    }
}

const POSITION_COLUMNS: &str = "id, instrument, side, entry_price, entry_time, quantity, \
                                status, exit_price, exit_time, pnl, strategy_id";

impl BarPort for SqliteAdapter {
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;

        // LIMIT -1 is SQLite for "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn
            .prepare(
                "SELECT instrument, timeframe, epoch_time, open, high, low, close, volume, open_interest
                 FROM bars
                 WHERE instrument = ?1 AND timeframe = ?2 AND epoch_time >= ?3 AND epoch_time <= ?4
                 ORDER BY epoch_time ASC
                 LIMIT ?5",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    instrument,
                    timeframe,
                    from.unwrap_or(i64::MIN),
                    to.unwrap_or(i64::MAX),
                    limit
                ],
                |row| {
                    Ok(Bar {
                        instrument: row.get(0)?,
                        timeframe: row.get(1)?,
                        epoch_time: row.get(2)?,
                        open: row.get(3)?,
                        high: row.get(4)?,
                        low: row.get(5)?,
                        close: row.get(6)?,
                        volume: row.get(7)?,
                        open_interest: row.get(8)?,
                    })
                },
            )
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_err)?);
        }
        Ok(bars)
    }

    fn fetch_previous_bar(
        &self,
        instrument: &str,
        timeframe: &str,
        before_epoch: i64,
    ) -> Result<Option<Bar>, OitraderError> {
        let bars = self.fetch_bars(instrument, timeframe, None, Some(before_epoch - 1), None)?;
        Ok(bars.into_iter().next_back())
    }

    fn list_instruments(&self) -> Result<Vec<String>, OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT instrument FROM bars ORDER BY instrument")
            .map_err(query_err)?;

        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;

        let mut instruments = Vec::new();
        for row in rows {
            instruments.push(row.map_err(query_err)?);
        }
        Ok(instruments)
    }

    fn data_range(
        &self,
        instrument: &str,
        timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;

        let result: (Option<i64>, Option<i64>, i64) = conn
            .query_row(
                "SELECT MIN(epoch_time), MAX(epoch_time), COUNT(*)
                 FROM bars WHERE instrument = ?1 AND timeframe = ?2",
                params![instrument, timeframe],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}

impl LedgerStorePort for SqliteAdapter {
    fn get_holding(&self, instrument: &str) -> Result<Option<Holding>, OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT instrument, quantity, avg_price, realized_pnl, unrealized_pnl, total_value
                 FROM holdings WHERE instrument = ?1",
            )
            .map_err(query_err)?;

        let mut rows = stmt
            .query_map(params![instrument], |row| {
                Ok(Holding {
                    instrument: row.get(0)?,
                    quantity: row.get(1)?,
                    avg_price: row.get(2)?,
                    realized_pnl: row.get(3)?,
                    unrealized_pnl: row.get(4)?,
                    total_value: row.get(5)?,
                })
            })
            .map_err(query_err)?;

        rows.next().transpose().map_err(query_err)
    }

    fn put_holding(&self, holding: &Holding) -> Result<(), OitraderError> {
        let conn = self.pool.get().map_err(pool_err)?;

        conn.execute(
            "INSERT INTO holdings
             (instrument, quantity, avg_price, realized_pnl, unrealized_pnl, total_value)
             VALUES (?1, ?2, ?3, 0.0, ?4, ?5)
             ON CONFLICT(instrument) DO UPDATE SET
                 quantity = excluded.quantity,
                 avg_price = excluded.avg_price,
                 unrealized_pnl = excluded.unrealized_pnl,
                 total_value = excluded.total_value",
            params![
                holding.instrument,
                holding.quantity,
                holding.avg_price,
                holding.unrealized_pnl,
                holding.total_value
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn get_position(&self, id: i64) -> Result<Option<Position>, OitraderError> {
        let query = format!("SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?1");
        Ok(self.query_positions(&query, params![id])?.into_iter().next())
    }

    fn open_positions(&self, instrument: &str) -> Result<Vec<Position>, OitraderError> {
        let query = format!(
            "SELECT {POSITION_COLUMNS} FROM positions
             WHERE instrument = ?1 AND status = 'OPEN'
             ORDER BY entry_time ASC"
        );
        self.query_positions(&query, params![instrument])
    }

    fn positions_for_strategy(&self, strategy_id: &str) -> Result<Vec<Position>, OitraderError> {
        let query = format!(
            "SELECT {POSITION_COLUMNS} FROM positions
             WHERE strategy_id = ?1
             ORDER BY id ASC"
        );
        self.query_positions(&query, params![strategy_id])
    }

    fn apply_open(
        &self,
        position: NewPosition,
        holding: &Holding,
        realized_delta: f64,
    ) -> Result<Position, OitraderError> {
        let mut conn = self.pool.get().map_err(pool_err)?;
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute(
            "INSERT INTO positions
             (instrument, side, entry_price, entry_time, quantity, status, strategy_id)
             VALUES (?1, ?2, ?3, ?4, ?5, 'OPEN', ?6)",
            params![
                position.instrument,
                position.side.to_string(),
                position.entry_price,
                position.entry_time,
                position.quantity,
                position.strategy_id
            ],
        )
        .map_err(query_err)?;
        let id = tx.last_insert_rowid();

        Self::upsert_holding_tx(&tx, holding, realized_delta)?;
        tx.commit().map_err(query_err)?;

        Ok(Position {
            id,
            instrument: position.instrument,
            side: position.side,
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            quantity: position.quantity,
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            pnl: None,
            strategy_id: position.strategy_id,
        })
    }

    fn apply_close(
        &self,
        position: &Position,
        holding: &Holding,
        realized_delta: f64,
    ) -> Result<(), OitraderError> {
        let mut conn = self.pool.get().map_err(pool_err)?;
        let tx = conn.transaction().map_err(query_err)?;

        let updated = tx
            .execute(
                "UPDATE positions
                 SET status = ?1, exit_price = ?2, exit_time = ?3, pnl = ?4
                 WHERE id = ?5",
                params![
                    position.status.to_string(),
                    position.exit_price,
                    position.exit_time,
                    position.pnl,
                    position.id
                ],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(OitraderError::not_found("position", position.id));
        }

        Self::upsert_holding_tx(&tx, holding, realized_delta)?;
        tx.commit().map_err(query_err)?;
        Ok(())
    }
}

impl AnalysisSinkPort for SqliteAdapter {
    fn upsert_batch(&self, entries: &[(BarKey, OiAnalysis)]) -> Result<(), OitraderError> {
        let mut conn = self.pool.get().map_err(pool_err)?;
        let tx = conn.transaction().map_err(query_err)?;

        for (key, analysis) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO oi_analysis
                 (instrument, timeframe, epoch_time, price_change, price_change_pct,
                  oi_change, oi_change_pct, price_direction, oi_direction,
                  interpretation, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    key.instrument,
                    key.timeframe,
                    key.epoch_time,
                    analysis.price_change,
                    analysis.price_change_pct,
                    analysis.oi_change,
                    analysis.oi_change_pct,
                    analysis.price_direction.to_string(),
                    analysis.oi_direction.to_string(),
                    analysis.interpretation.to_string(),
                    analysis.confidence.to_string(),
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }
}
