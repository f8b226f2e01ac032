//! Classification persistence port trait.

use crate::domain::bar::Bar;
use crate::domain::error::OitraderError;
use crate::domain::oi::OiAnalysis;

/// Identity of the bar an analysis belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarKey {
    pub instrument: String,
    pub timeframe: String,
    pub epoch_time: i64,
}

impl BarKey {
    pub fn of(bar: &Bar) -> Self {
        BarKey {
            instrument: bar.instrument.clone(),
            timeframe: bar.timeframe.clone(),
            epoch_time: bar.epoch_time,
        }
    }
}

/// Sink for classifier output. Upserts keyed by bar identity, so
/// reprocessing a series is idempotent.
pub trait AnalysisSinkPort {
    fn upsert_batch(&self, entries: &[(BarKey, OiAnalysis)]) -> Result<(), OitraderError>;
}
