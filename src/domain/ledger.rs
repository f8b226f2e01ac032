//! Position ledger: fills in, realized/unrealized P&L out.
//!
//! The ledger owns every Holding and Position lifecycle transition. All
//! arithmetic happens here against an in-memory snapshot; the store's
//! `apply_open`/`apply_close` primitives then persist the position and the
//! holding in one atomic step, so a failure leaves neither side mutated.
//!
//! Each mutating operation runs under a per-instrument lock held across
//! the whole read-compute-write sequence. Store-level atomicity only
//! covers single calls; without the lock, two concurrent fills on the
//! same instrument would both read the same holding snapshot and one
//! update would be lost. Different instruments never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::error::OitraderError;
use crate::domain::holding::{apply_fill, Holding};
use crate::domain::position::{Position, PositionStatus, Side};
use crate::ports::ledger_port::{LedgerStorePort, NewPosition};

pub struct PositionLedger<'a> {
    store: &'a dyn LedgerStorePort,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<'a> PositionLedger<'a> {
    pub fn new(store: &'a dyn LedgerStorePort) -> Self {
        PositionLedger {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn instrument_lock(&self, instrument: &str) -> Result<Arc<Mutex<()>>, OitraderError> {
        let mut map = self.locks.lock().map_err(|_| OitraderError::Database {
            reason: "instrument lock map poisoned".into(),
        })?;
        Ok(map.entry(instrument.to_string()).or_default().clone())
    }

    fn guard(lock: &Arc<Mutex<()>>) -> Result<MutexGuard<'_, ()>, OitraderError> {
        lock.lock().map_err(|_| OitraderError::Database {
            reason: "instrument lock poisoned".into(),
        })
    }

    /// Record one fill: always a new lot (same-direction fills are not
    /// merged), plus the weighted-average holding update.
    pub fn open_or_add(
        &self,
        instrument: &str,
        side: Side,
        price: f64,
        quantity: f64,
        time: i64,
        strategy_id: Option<&str>,
    ) -> Result<Position, OitraderError> {
        validate_fill(price, quantity)?;

        let lock = self.instrument_lock(instrument)?;
        let _guard = Self::guard(&lock)?;

        let mut holding = self
            .store
            .get_holding(instrument)?
            .unwrap_or_else(|| Holding::flat(instrument));

        let signed_qty = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let outcome = apply_fill(holding.quantity, holding.avg_price, signed_qty, price);
        holding.quantity = outcome.quantity;
        holding.avg_price = outcome.avg_price;
        holding.mark(price);

        let position = NewPosition {
            instrument: instrument.to_string(),
            side,
            entry_price: price,
            entry_time: time,
            quantity,
            strategy_id: strategy_id.map(str::to_string),
        };

        self.store
            .apply_open(position, &holding, outcome.realized_delta)
    }

    /// Close an OPEN lot: fix its pnl from its own entry price and fold
    /// the exit through the holding's weighted-average transition.
    pub fn close(
        &self,
        position_id: i64,
        exit_price: f64,
        exit_time: i64,
    ) -> Result<Position, OitraderError> {
        if exit_price <= 0.0 || !exit_price.is_finite() {
            return Err(OitraderError::validation(format!(
                "exit price must be positive, got {exit_price}"
            )));
        }

        let instrument = self
            .store
            .get_position(position_id)?
            .ok_or_else(|| OitraderError::not_found("position", position_id))?
            .instrument;
        let lock = self.instrument_lock(&instrument)?;
        let _guard = Self::guard(&lock)?;

        // Re-read under the lock: a concurrent close of the same lot must
        // not slip past the OPEN check.
        let mut position = self
            .store
            .get_position(position_id)?
            .ok_or_else(|| OitraderError::not_found("position", position_id))?;

        if !position.is_open() {
            return Err(OitraderError::validation(format!(
                "position {position_id} is already closed"
            )));
        }
        if exit_time < position.entry_time {
            return Err(OitraderError::validation(format!(
                "exit time {exit_time} precedes entry time {}",
                position.entry_time
            )));
        }

        let pnl = position.close_pnl(exit_price);
        position.status = PositionStatus::Closed;
        position.exit_price = Some(exit_price);
        position.exit_time = Some(exit_time);
        position.pnl = Some(pnl);

        let mut holding = self
            .store
            .get_holding(&position.instrument)?
            .unwrap_or_else(|| Holding::flat(&position.instrument));

        // The exit is the opposite-direction fill of the lot's quantity.
        let exit_qty = -position.signed_quantity();
        let outcome = apply_fill(holding.quantity, holding.avg_price, exit_qty, exit_price);
        holding.quantity = outcome.quantity;
        holding.avg_price = outcome.avg_price;
        holding.mark(exit_price);

        self.store
            .apply_close(&position, &holding, outcome.realized_delta)?;

        Ok(position)
    }

    /// Recompute unrealized P&L over the instrument's OPEN lots and
    /// refresh the holding's unrealized/total-value figures. Realized
    /// figures, quantity and average price are untouched.
    pub fn mark_to_market(
        &self,
        instrument: &str,
        current_price: f64,
    ) -> Result<Holding, OitraderError> {
        if current_price <= 0.0 || !current_price.is_finite() {
            return Err(OitraderError::validation(format!(
                "marking price must be positive, got {current_price}"
            )));
        }

        let lock = self.instrument_lock(instrument)?;
        let _guard = Self::guard(&lock)?;

        let open = self.store.open_positions(instrument)?;
        let unrealized: f64 = open.iter().map(|p| p.unrealized_pnl(current_price)).sum();

        let mut holding = self
            .store
            .get_holding(instrument)?
            .unwrap_or_else(|| Holding::flat(instrument));
        holding.unrealized_pnl = unrealized;
        holding.total_value = holding.quantity * current_price;

        self.store.put_holding(&holding)?;
        Ok(holding)
    }
}

fn validate_fill(price: f64, quantity: f64) -> Result<(), OitraderError> {
    if price <= 0.0 || !price.is_finite() {
        return Err(OitraderError::validation(format!(
            "fill price must be positive, got {price}"
        )));
    }
    if quantity <= 0.0 || !quantity.is_finite() {
        return Err(OitraderError::validation(format!(
            "fill quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryLedgerStore;
    use approx::assert_relative_eq;

    fn holding_of(store: &MemoryLedgerStore, instrument: &str) -> Holding {
        store.get_holding(instrument).unwrap().unwrap()
    }

    #[test]
    fn open_creates_position_and_holding() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        let pos = ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();

        assert!(pos.id > 0);
        assert!(pos.is_open());
        assert_relative_eq!(pos.entry_price, 100.0);

        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.quantity, 10.0);
        assert_relative_eq!(holding.avg_price, 100.0);
        assert_relative_eq!(holding.realized_pnl, 0.0);
    }

    #[test]
    fn each_fill_is_its_own_lot() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        ledger
            .open_or_add("NIFTY", Side::Buy, 110.0, 10.0, 1060, None)
            .unwrap();

        assert_eq!(store.open_positions("NIFTY").unwrap().len(), 2);
        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.quantity, 20.0);
        assert_relative_eq!(holding.avg_price, 105.0);
    }

    #[test]
    fn close_realizes_pnl_into_holding() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        let pos = ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        let closed = ledger.close(pos.id, 110.0, 1060).unwrap();

        assert_eq!(closed.status, PositionStatus::Closed);
        assert_relative_eq!(closed.pnl.unwrap(), 100.0);
        assert_eq!(closed.exit_time, Some(1060));

        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.quantity, 0.0);
        assert_relative_eq!(holding.avg_price, 0.0);
        assert_relative_eq!(holding.realized_pnl, 100.0);
    }

    #[test]
    fn close_short_position() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        let pos = ledger
            .open_or_add("NIFTY", Side::Sell, 100.0, 10.0, 1000, None)
            .unwrap();
        let closed = ledger.close(pos.id, 90.0, 1060).unwrap();

        assert_relative_eq!(closed.pnl.unwrap(), 100.0);
        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.quantity, 0.0);
        assert_relative_eq!(holding.realized_pnl, 100.0);
    }

    #[test]
    fn opposite_fill_realizes_partial() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        ledger
            .open_or_add("NIFTY", Side::Sell, 120.0, 4.0, 1060, None)
            .unwrap();

        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.quantity, 6.0);
        assert_relative_eq!(holding.avg_price, 100.0);
        assert_relative_eq!(holding.realized_pnl, 80.0);
    }

    #[test]
    fn realized_pnl_accumulates_additively() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        let a = ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        ledger.close(a.id, 110.0, 1060).unwrap();
        let b = ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1120, None)
            .unwrap();
        ledger.close(b.id, 95.0, 1180).unwrap();

        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.realized_pnl, 100.0 - 50.0);
    }

    #[test]
    fn close_unknown_position_is_not_found() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        assert!(matches!(
            ledger.close(99, 100.0, 1000),
            Err(OitraderError::NotFound { .. })
        ));
    }

    #[test]
    fn close_twice_fails_and_leaves_state() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        let pos = ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        ledger.close(pos.id, 110.0, 1060).unwrap();

        assert!(matches!(
            ledger.close(pos.id, 120.0, 1120),
            Err(OitraderError::Validation { .. })
        ));
        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.realized_pnl, 100.0);
        assert_relative_eq!(holding.quantity, 0.0);
    }

    #[test]
    fn close_before_entry_time_rejected() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        let pos = ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        assert!(ledger.close(pos.id, 110.0, 999).is_err());
        // Equal timestamps are allowed (synthetic backtest bars).
        assert!(ledger.close(pos.id, 110.0, 1000).is_ok());
    }

    #[test]
    fn invalid_fill_rejected_before_mutation() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        assert!(ledger
            .open_or_add("NIFTY", Side::Buy, 0.0, 10.0, 1000, None)
            .is_err());
        assert!(ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, -1.0, 1000, None)
            .is_err());
        assert!(store.get_holding("NIFTY").unwrap().is_none());
        assert!(store.open_positions("NIFTY").unwrap().is_empty());
    }

    #[test]
    fn mark_to_market_refreshes_unrealized_only() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        let holding = ledger.mark_to_market("NIFTY", 108.0).unwrap();

        assert_relative_eq!(holding.unrealized_pnl, 80.0);
        assert_relative_eq!(holding.total_value, 1080.0);
        assert_relative_eq!(holding.realized_pnl, 0.0);
        assert_relative_eq!(holding.avg_price, 100.0);
    }

    #[test]
    fn mark_to_market_sums_open_lots() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        ledger
            .open_or_add("NIFTY", Side::Sell, 120.0, 4.0, 1060, None)
            .unwrap();

        // BUY lot: 10×(110−100)=100; SELL lot: −4×(110−120)=40
        let holding = ledger.mark_to_market("NIFTY", 110.0).unwrap();
        assert_relative_eq!(holding.unrealized_pnl, 140.0);
    }

    #[test]
    fn strategy_fills_are_queryable() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, Some("sma-x"))
            .unwrap();
        ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1060, None)
            .unwrap();

        assert_eq!(store.positions_for_strategy("sma-x").unwrap().len(), 1);
    }

    #[test]
    fn concurrent_fills_keep_signed_quantity() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..50 {
                        ledger
                            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000 + i, None)
                            .unwrap();
                    }
                });
            }
        });

        // 8 threads × 50 fills × 10 units, none lost to interleaving.
        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.quantity, 4000.0);
        assert_relative_eq!(holding.avg_price, 100.0);
        assert_eq!(store.open_positions("NIFTY").unwrap().len(), 400);
    }

    #[test]
    fn concurrent_round_trips_accumulate_realized() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for i in 0..25 {
                        let pos = ledger
                            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000 + i, None)
                            .unwrap();
                        ledger.close(pos.id, 110.0, 1000 + i).unwrap();
                    }
                });
            }
        });

        // Every buy is at 100, so the average never moves and each close
        // of 10 units at 110 realizes exactly 100.
        let holding = holding_of(&store, "NIFTY");
        assert_relative_eq!(holding.quantity, 0.0);
        assert_relative_eq!(holding.realized_pnl, 4.0 * 25.0 * 100.0);
        assert!(store.open_positions("NIFTY").unwrap().is_empty());
    }

    #[test]
    fn instruments_do_not_interfere() {
        let store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&store);

        ledger
            .open_or_add("NIFTY", Side::Buy, 100.0, 10.0, 1000, None)
            .unwrap();
        ledger
            .open_or_add("BANKNIFTY", Side::Sell, 200.0, 5.0, 1000, None)
            .unwrap();

        assert_relative_eq!(holding_of(&store, "NIFTY").quantity, 10.0);
        assert_relative_eq!(holding_of(&store, "BANKNIFTY").quantity, -5.0);
    }
}
