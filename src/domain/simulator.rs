//! Backtest simulator: SMA-crossover replay over historical bars.
//!
//! Every simulated open/close is a real mutation through the ledger, so
//! callers must scope simulations with a distinguishing strategy id (and
//! typically a dedicated store) if they share accounting with live fills.

use std::time::Instant;

use crate::domain::bar::Bar;
use crate::domain::error::OitraderError;
use crate::domain::ledger::PositionLedger;
use crate::domain::metrics::TradeMetrics;
use crate::domain::position::{Position, Side};
use crate::domain::sma::sma_at;
use crate::domain::strategy::{SmaCrossParams, StrategyResult};

/// Replay the crossover rule over `bars` (already filtered to the window
/// and sorted ascending), driving `ledger` with synthetic fills.
///
/// One lot is active at a time: a golden cross while a lot is open is
/// ignored. Deterministic for identical inputs and a fresh ledger scope.
pub fn run(
    params: &SmaCrossParams,
    instrument: &str,
    bars: &[Bar],
    ledger: &PositionLedger,
) -> Result<StrategyResult, OitraderError> {
    if bars.is_empty() {
        return Err(OitraderError::validation(format!(
            "no bars to backtest for {instrument}"
        )));
    }
    if params.short_period == 0 || params.long_period == 0 {
        return Err(OitraderError::validation(
            "SMA periods must be positive integers",
        ));
    }
    if params.quantity <= 0.0 {
        return Err(OitraderError::validation(
            "simulation quantity must be positive",
        ));
    }

    let started = Instant::now();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let mut active: Option<i64> = None;
    let mut closed: Vec<Position> = Vec::new();

    for i in params.long_period..bars.len() {
        if let Some(budget) = params.time_budget {
            if started.elapsed() >= budget {
                return Err(OitraderError::Timeout {
                    budget_secs: budget.as_secs(),
                });
            }
        }

        let short = sma_at(&closes, i, params.short_period);
        let long = sma_at(&closes, i, params.long_period);
        let prev_short = sma_at(&closes, i - 1, params.short_period);
        let prev_long = sma_at(&closes, i - 1, params.long_period);

        let golden = prev_short <= prev_long && short > long;
        let death = prev_short >= prev_long && short < long;

        if golden && active.is_none() {
            let pos = ledger.open_or_add(
                instrument,
                Side::Buy,
                bars[i].close,
                params.quantity,
                bars[i].epoch_time,
                Some(&params.strategy_id),
            )?;
            active = Some(pos.id);
        } else if death {
            if let Some(id) = active.take() {
                let pos = ledger.close(id, bars[i].close, bars[i].epoch_time)?;
                closed.push(pos);
            }
        }
    }

    let metrics = TradeMetrics::compute(&closed);

    Ok(StrategyResult {
        strategy_id: params.strategy_id.clone(),
        instrument: instrument.to_string(),
        total_trades: metrics.total_trades,
        winning_trades: metrics.winning_trades,
        total_pnl: metrics.total_pnl,
        max_drawdown: metrics.max_drawdown,
        win_rate: metrics.win_rate,
        sharpe_ratio: metrics.sharpe_ratio,
        start_time: bars[0].epoch_time,
        end_time: bars[bars.len() - 1].epoch_time,
    })
}
