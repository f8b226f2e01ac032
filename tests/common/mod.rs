#![allow(dead_code)]

use oitrader::domain::bar::Bar;
use oitrader::domain::error::OitraderError;
use oitrader::ports::bar_port::BarPort;
use std::collections::HashMap;

pub struct MockBarPort {
    pub data: HashMap<(String, String), Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockBarPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, instrument: &str, timeframe: &str, bars: Vec<Bar>) -> Self {
        self.data
            .insert((instrument.to_string(), timeframe.to_string()), bars);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors
            .insert(instrument.to_string(), reason.to_string());
        self
    }

    fn series(&self, instrument: &str, timeframe: &str) -> Result<Vec<Bar>, OitraderError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(OitraderError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(&(instrument.to_string(), timeframe.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

impl BarPort for MockBarPort {
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, OitraderError> {
        let mut bars: Vec<Bar> = self
            .series(instrument, timeframe)?
            .into_iter()
            .filter(|b| from.is_none_or(|f| b.epoch_time >= f))
            .filter(|b| to.is_none_or(|t| b.epoch_time <= t))
            .collect();
        bars.sort_by_key(|b| b.epoch_time);
        if let Some(limit) = limit {
            bars.truncate(limit);
        }
        Ok(bars)
    }

    fn fetch_previous_bar(
        &self,
        instrument: &str,
        timeframe: &str,
        before_epoch: i64,
    ) -> Result<Option<Bar>, OitraderError> {
        let bars = self.fetch_bars(instrument, timeframe, None, Some(before_epoch - 1), None)?;
        Ok(bars.into_iter().next_back())
    }

    fn list_instruments(&self) -> Result<Vec<String>, OitraderError> {
        let mut instruments: Vec<String> =
            self.data.keys().map(|(i, _)| i.clone()).collect();
        instruments.sort();
        instruments.dedup();
        Ok(instruments)
    }

    fn data_range(
        &self,
        instrument: &str,
        timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, OitraderError> {
        let bars = self.fetch_bars(instrument, timeframe, None, None, None)?;
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => {
                Ok(Some((first.epoch_time, last.epoch_time, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub const DAY: i64 = 86_400;
pub const T0: i64 = 1_700_000_000;

pub fn make_bar(instrument: &str, epoch: i64, close: f64, oi: f64) -> Bar {
    Bar {
        instrument: instrument.to_string(),
        timeframe: "1d".to_string(),
        epoch_time: epoch,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000.0,
        open_interest: oi,
    }
}

/// Daily bars with given closes, constant OI.
pub fn bars_from_closes(instrument: &str, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(instrument, T0 + i as i64 * DAY, close, 10_000.0))
        .collect()
}

/// Daily bars zipped from parallel close and OI series.
pub fn bars_from_series(instrument: &str, closes: &[f64], ois: &[f64]) -> Vec<Bar> {
    assert_eq!(closes.len(), ois.len());
    closes
        .iter()
        .zip(ois)
        .enumerate()
        .map(|(i, (&close, &oi))| make_bar(instrument, T0 + i as i64 * DAY, close, oi))
        .collect()
}

/// Close series with a clean golden cross then a death cross for SMA 2/4.
pub fn crossing_closes() -> Vec<f64> {
    let mut closes = Vec::new();
    closes.extend((0..8).map(|i| 100.0 - i as f64));
    closes.extend((0..8).map(|i| 94.0 + 3.0 * i as f64));
    closes.extend((0..8).map(|i| 112.0 - 3.0 * i as f64));
    closes
}
