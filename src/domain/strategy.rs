//! Strategy parameters and run summaries.

use std::time::Duration;

/// Fixed lot size used for simulated fills.
pub const SIMULATION_QUANTITY: f64 = 100.0;

/// SMA-crossover parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SmaCrossParams {
    pub strategy_id: String,
    pub short_period: usize,
    pub long_period: usize,
    pub quantity: f64,
    /// Soft wall-clock budget for one run; None = unbounded.
    pub time_budget: Option<Duration>,
}

impl Default for SmaCrossParams {
    fn default() -> Self {
        SmaCrossParams {
            strategy_id: "sma-crossover".into(),
            short_period: 10,
            long_period: 20,
            quantity: SIMULATION_QUANTITY,
            time_budget: None,
        }
    }
}

/// One backtest run's summary. Created once per (strategy, instrument)
/// invocation, never mutated afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub strategy_id: String,
    pub instrument: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    /// Covered range, epoch seconds.
    pub start_time: i64,
    pub end_time: i64,
}
