//! Bar source port trait.

use crate::domain::bar::Bar;
use crate::domain::error::OitraderError;

pub trait BarPort {
    /// Bars for one (instrument, timeframe), ascending by epoch time,
    /// optionally bounded by `[from, to]` (inclusive, epoch seconds) and
    /// truncated to `limit`.
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, OitraderError>;

    /// Latest bar strictly before `before_epoch`, if any.
    fn fetch_previous_bar(
        &self,
        instrument: &str,
        timeframe: &str,
        before_epoch: i64,
    ) -> Result<Option<Bar>, OitraderError>;

    fn list_instruments(&self) -> Result<Vec<String>, OitraderError>;

    /// (first epoch, last epoch, bar count) for a series, None when empty.
    fn data_range(
        &self,
        instrument: &str,
        timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, OitraderError>;
}
