//! In-memory ledger store and analysis sink.
//!
//! Backs backtests (fresh ledger scope per run) and tests. One mutex
//! guards all state, which serializes mutating operations as the ledger
//! requires.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::error::OitraderError;
use crate::domain::holding::Holding;
use crate::domain::oi::OiAnalysis;
use crate::domain::position::{Position, PositionStatus};
use crate::ports::analysis_port::{AnalysisSinkPort, BarKey};
use crate::ports::ledger_port::{LedgerStorePort, NewPosition};

#[derive(Default)]
struct LedgerState {
    holdings: HashMap<String, Holding>,
    positions: Vec<Position>,
    next_id: i64,
}

pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        MemoryLedgerStore {
            state: Mutex::new(LedgerState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, OitraderError> {
        self.state.lock().map_err(|_| OitraderError::Database {
            reason: "ledger state mutex poisoned".into(),
        })
    }

    fn write_holding(state: &mut LedgerState, holding: &Holding, realized_delta: f64) {
        let entry = state
            .holdings
            .entry(holding.instrument.clone())
            .or_insert_with(|| Holding::flat(&holding.instrument));
        entry.quantity = holding.quantity;
        entry.avg_price = holding.avg_price;
        entry.unrealized_pnl = holding.unrealized_pnl;
        entry.total_value = holding.total_value;
        // Accumulate, never overwrite.
        entry.realized_pnl += realized_delta;
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStorePort for MemoryLedgerStore {
    fn get_holding(&self, instrument: &str) -> Result<Option<Holding>, OitraderError> {
        Ok(self.lock()?.holdings.get(instrument).cloned())
    }

    fn put_holding(&self, holding: &Holding) -> Result<(), OitraderError> {
        let mut state = self.lock()?;
        let realized = state
            .holdings
            .get(&holding.instrument)
            .map(|h| h.realized_pnl)
            .unwrap_or(0.0);
        let mut stored = holding.clone();
        stored.realized_pnl = realized;
        state.holdings.insert(holding.instrument.clone(), stored);
        Ok(())
    }

    fn get_position(&self, id: i64) -> Result<Option<Position>, OitraderError> {
        Ok(self
            .lock()?
            .positions
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    fn open_positions(&self, instrument: &str) -> Result<Vec<Position>, OitraderError> {
        let state = self.lock()?;
        let mut open: Vec<Position> = state
            .positions
            .iter()
            .filter(|p| p.instrument == instrument && p.status == PositionStatus::Open)
            .cloned()
            .collect();
        open.sort_by_key(|p| p.entry_time);
        Ok(open)
    }

    fn positions_for_strategy(&self, strategy_id: &str) -> Result<Vec<Position>, OitraderError> {
        Ok(self
            .lock()?
            .positions
            .iter()
            .filter(|p| p.strategy_id.as_deref() == Some(strategy_id))
            .cloned()
            .collect())
    }

    fn apply_open(
        &self,
        position: NewPosition,
        holding: &Holding,
        realized_delta: f64,
    ) -> Result<Position, OitraderError> {
        let mut state = self.lock()?;
        let id = state.next_id;
        state.next_id += 1;

        let stored = Position {
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
        };
        state.positions.push(stored.clone());
        Self::write_holding(&mut state, holding, realized_delta);
        Ok(stored)
    }

    fn apply_close(
        &self,
        position: &Position,
        holding: &Holding,
        realized_delta: f64,
    ) -> Result<(), OitraderError> {
        let mut state = self.lock()?;
        let slot = state
            .positions
            .iter_mut()
            .find(|p| p.id == position.id)
            .ok_or_else(|| OitraderError::not_found("position", position.id))?;
        *slot = position.clone();
        Self::write_holding(&mut state, holding, realized_delta);
        Ok(())
    }
}

/// Collects classifier output in memory, keyed by bar identity.
#[derive(Default)]
pub struct MemoryAnalysisSink {
    entries: Mutex<HashMap<BarKey, OiAnalysis>>,
    batches: Mutex<Vec<usize>>,
}

impl MemoryAnalysisSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &BarKey) -> Option<OiAnalysis> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sizes of the batches received, in arrival order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl AnalysisSinkPort for MemoryAnalysisSink {
    fn upsert_batch(&self, entries: &[(BarKey, OiAnalysis)]) -> Result<(), OitraderError> {
        let mut map = self.entries.lock().map_err(|_| OitraderError::Database {
            reason: "analysis sink mutex poisoned".into(),
        })?;
        for (key, analysis) in entries {
            map.insert(key.clone(), analysis.clone());
        }
        drop(map);
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(entries.len());
        }
        Ok(())
    }
}
