//! Discrete trade lots.

use std::fmt;

/// Direction that opened the lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl Side {
    pub fn parse(s: &str) -> Option<Side> {
        match s {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

impl PositionStatus {
    pub fn parse(s: &str) -> Option<PositionStatus> {
        match s {
            "OPEN" => Some(PositionStatus::Open),
            "CLOSED" => Some(PositionStatus::Closed),
            _ => None,
        }
    }
}

/// One opened (and eventually closed) trade lot.
///
/// OPEN → CLOSED is the only transition, taken exactly once; a closed lot
/// is immutable and `exit_time >= entry_time` (equality allowed for
/// synthetic backtest bars).
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: i64,
    pub instrument: String,
    pub side: Side,
    pub entry_price: f64,
    /// Epoch seconds.
    pub entry_time: i64,
    pub quantity: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<i64>,
    /// Set once on close: (exit − entry) × qty for BUY, negated for SELL.
    pub pnl: Option<f64>,
    pub strategy_id: Option<String>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Positive for BUY-opened lots, negative for SELL-opened.
    pub fn signed_quantity(&self) -> f64 {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.signed_quantity() * (price - self.entry_price)
    }

    pub fn close_pnl(&self, exit_price: f64) -> f64 {
        self.signed_quantity() * (exit_price - self.entry_price)
    }
}
