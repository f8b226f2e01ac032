//! Performance metrics over a run's closed positions.

use crate::domain::position::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

impl TradeMetrics {
    /// Compute over CLOSED positions in chronological close order.
    /// Zero trades yields all-zero ratios, never NaN.
    pub fn compute(closed: &[Position]) -> Self {
        let total_trades = closed.len();
        let pnls: Vec<f64> = closed.iter().map(|p| p.pnl.unwrap_or(0.0)).collect();

        let winning_trades = pnls.iter().filter(|&&p| p > 0.0).count();
        let total_pnl: f64 = pnls.iter().sum();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let sharpe_ratio = compute_sharpe(closed);
        let max_drawdown = compute_drawdown(&pnls);

        TradeMetrics {
            total_trades,
            winning_trades,
            total_pnl,
            win_rate,
            sharpe_ratio,
            max_drawdown,
        }
    }
}

/// Per-trade return = pnl / (entry notional); sharpe = mean / population
/// stddev of those returns, 0 when the spread is zero.
fn compute_sharpe(closed: &[Position]) -> f64 {
    if closed.is_empty() {
        return 0.0;
    }

    let returns: Vec<f64> = closed
        .iter()
        .map(|p| p.pnl.unwrap_or(0.0) / (p.entry_price * p.quantity))
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 { mean / stddev } else { 0.0 }
}

/// Walk cumulative pnl against its running peak. The max(peak, 1)
/// denominator tolerates the common zero-peak start and must not be
/// replaced with a generic clamp.
fn compute_drawdown(pnls: &[f64]) -> f64 {
    let mut running = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;

    for pnl in pnls {
        running += pnl;
        if running > peak {
            peak = running;
        }
        let dd = (peak - running) / peak.max(1.0);
        if dd > max_dd {
            max_dd = dd;
        }
    }

    max_dd
}
