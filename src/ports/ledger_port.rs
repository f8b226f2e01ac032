//! Ledger persistence port trait.

use crate::domain::error::OitraderError;
use crate::domain::holding::Holding;
use crate::domain::position::{Position, Side};

/// Fields of a position about to be created; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub instrument: String,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: i64,
    pub quantity: f64,
    pub strategy_id: Option<String>,
}

/// Storage contract for holdings and positions.
///
/// `apply_open` and `apply_close` persist the position and the holding in
/// one atomic step. The holding's realized P&L is accumulated from
/// `realized_delta` (`stored + delta`), never overwritten from the passed
/// snapshot; the snapshot's other fields (quantity, avg price, unrealized,
/// total value) are written as given. Stores must be shareable across
/// threads; the ledger serializes same-instrument mutations above them.
pub trait LedgerStorePort: Send + Sync {
    fn get_holding(&self, instrument: &str) -> Result<Option<Holding>, OitraderError>;

    /// Overwrite the non-realized holding fields (mark-to-market refresh).
    fn put_holding(&self, holding: &Holding) -> Result<(), OitraderError>;

    fn get_position(&self, id: i64) -> Result<Option<Position>, OitraderError>;

    /// OPEN positions for an instrument, ascending by entry time.
    fn open_positions(&self, instrument: &str) -> Result<Vec<Position>, OitraderError>;

    /// All positions tagged with a strategy id, in creation order.
    fn positions_for_strategy(&self, strategy_id: &str) -> Result<Vec<Position>, OitraderError>;

    fn apply_open(
        &self,
        position: NewPosition,
        holding: &Holding,
        realized_delta: f64,
    ) -> Result<Position, OitraderError>;

    fn apply_close(
        &self,
        position: &Position,
        holding: &Holding,
        realized_delta: f64,
    ) -> Result<(), OitraderError>;
}
