//! Weighted-average holding state and the fill transition function.

/// Aggregate exposure for one instrument.
///
/// `avg_price` is meaningless (held at 0) while `quantity` is 0. Holdings
/// are zeroed on full close, never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub instrument: String,
    /// Signed: positive = net long, negative = net short, zero = flat.
    pub quantity: f64,
    pub avg_price: f64,
    /// Cumulative realized P&L; only ever accumulated into, never overwritten.
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    /// quantity × last marking price.
    pub total_value: f64,
}

impl Holding {
    pub fn flat(instrument: impl Into<String>) -> Self {
        Holding {
            instrument: instrument.into(),
            quantity: 0.0,
            avg_price: 0.0,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            total_value: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    /// Refresh unrealized P&L and total value against a marking price.
    /// Realized figures are untouched.
    pub fn mark(&mut self, price: f64) {
        self.unrealized_pnl = if self.is_flat() {
            0.0
        } else {
            self.quantity * (price - self.avg_price)
        };
        self.total_value = self.quantity * price;
    }
}

/// Result of applying one signed fill to a `(quantity, avg_price)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub quantity: f64,
    pub avg_price: f64,
    /// Realized P&L contributed by the closing portion of the fill.
    pub realized_delta: f64,
}

/// The weighted-average-cost accounting transition.
///
/// `fill_qty` is signed: positive for a buy, negative for a sell. Rules:
/// - flat holding: take the fill's quantity and price, nothing realized;
/// - same sign: quantity-weighted average price, nothing realized;
/// - opposite sign: the overlapping quantity realizes against the average
///   price; average resets to 0 at a flat result, becomes the fill price
///   on a sign flip, and is otherwise unchanged.
///
/// This is deliberately not lot matching — FIFO/LIFO diverge from it on
/// partial closes.
pub fn apply_fill(quantity: f64, avg_price: f64, fill_qty: f64, fill_price: f64) -> FillOutcome {
    if quantity == 0.0 {
        return FillOutcome {
            quantity: fill_qty,
            avg_price: fill_price,
            realized_delta: 0.0,
        };
    }

    if quantity.signum() == fill_qty.signum() {
        let new_qty = quantity + fill_qty;
        let new_avg = (quantity * avg_price + fill_qty * fill_price) / new_qty;
        return FillOutcome {
            quantity: new_qty,
            avg_price: new_avg,
            realized_delta: 0.0,
        };
    }

    let closing_qty = quantity.abs().min(fill_qty.abs());
    let realized_delta = if quantity > 0.0 {
        closing_qty * (fill_price - avg_price)
    } else {
        closing_qty * (avg_price - fill_price)
    };

    let new_qty = quantity + fill_qty;
    let new_avg = if new_qty == 0.0 {
        0.0
    } else if fill_qty.abs() > quantity.abs() {
        // Sign flipped: the residual opposite-direction quantity opened at
        // the fill price.
        fill_price
    } else {
        avg_price
    };

    FillOutcome {
        quantity: new_qty,
        avg_price: new_avg,
        realized_delta,
    }
}
