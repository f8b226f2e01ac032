//! Price/volume/open-interest bar representation.

use crate::domain::error::OitraderError;

/// One time-bucketed observation for an (instrument, timeframe) series.
///
/// Bars are keyed by (instrument, timeframe, epoch_time); a later write at
/// the same key replaces the prior bar, never duplicates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub instrument: String,
    pub timeframe: String,
    /// Epoch seconds, strictly increasing within a series.
    pub epoch_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_interest: f64,
}

impl Bar {
    /// Reject bars that violate the OHLC/volume/OI constraints.
    pub fn validate(&self) -> Result<(), OitraderError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(OitraderError::data_quality(format!(
                "{} @ {}: prices must be positive finite numbers",
                self.instrument, self.epoch_time
            )));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(OitraderError::data_quality(format!(
                "{} @ {}: high/low do not bound open/close",
                self.instrument, self.epoch_time
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(OitraderError::data_quality(format!(
                "{} @ {}: volume must be non-negative",
                self.instrument, self.epoch_time
            )));
        }
        if !self.open_interest.is_finite() || self.open_interest < 0.0 {
            return Err(OitraderError::data_quality(format!(
                "{} @ {}: open interest must be non-negative",
                self.instrument, self.epoch_time
            )));
        }
        Ok(())
    }
}
