//! CSV file bar adapter.
//!
//! One file per (instrument, timeframe), named `{instrument}_{timeframe}.csv`,
//! columns: epoch_time,open,high,low,close,volume,open_interest. Duplicate
//! epochs keep the last row in the file.

use crate::domain::bar::Bar;
use crate::domain::error::OitraderError;
use crate::ports::bar_port::BarPort;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub struct CsvBarAdapter {
    base_path: PathBuf,
}

impl CsvBarAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str, timeframe: &str) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", instrument, timeframe))
    }

    fn parse_field<T: std::str::FromStr>(
        record: &csv::StringRecord,
        index: usize,
        name: &str,
    ) -> Result<T, OitraderError>
    where
        T::Err: std::fmt::Display,
    {
        record
            .get(index)
            .ok_or_else(|| OitraderError::data_quality(format!("missing {} column", name)))?
            .trim()
            .parse()
            .map_err(|e| OitraderError::data_quality(format!("invalid {} value: {}", name, e)))
    }

    /// All bars for a series, deduplicated by epoch and sorted ascending.
    fn load_series(&self, instrument: &str, timeframe: &str) -> Result<Vec<Bar>, OitraderError> {
        let path = self.csv_path(instrument, timeframe);
        let content = fs::read_to_string(&path).map_err(|e| OitraderError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut by_epoch: BTreeMap<i64, Bar> = BTreeMap::new();

        for result in rdr.records() {
            let record = result.map_err(|e| OitraderError::Database {
                reason: format!("CSV parse error: {}", e),
            })?;

            let epoch_time: i64 = Self::parse_field(&record, 0, "epoch_time")?;
            let bar = Bar {
                instrument: instrument.to_string(),
                timeframe: timeframe.to_string(),
                epoch_time,
                open: Self::parse_field(&record, 1, "open")?,
                high: Self::parse_field(&record, 2, "high")?,
                low: Self::parse_field(&record, 3, "low")?,
                close: Self::parse_field(&record, 4, "close")?,
                volume: Self::parse_field(&record, 5, "volume")?,
                open_interest: Self::parse_field(&record, 6, "open_interest")?,
            };
            by_epoch.insert(epoch_time, bar);
        }

        Ok(by_epoch.into_values().collect())
    }
}

impl BarPort for CsvBarAdapter {
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, OitraderError> {
        let mut bars: Vec<Bar> = self
            .load_series(instrument, timeframe)?
            .into_iter()
            .filter(|b| from.is_none_or(|f| b.epoch_time >= f))
            .filter(|b| to.is_none_or(|t| b.epoch_time <= t))
            .collect();

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
        Ok(self
            .load_series(instrument, timeframe)?
            .into_iter()
            .filter(|b| b.epoch_time < before_epoch)
            .next_back())
    }

    fn list_instruments(&self) -> Result<Vec<String>, OitraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| OitraderError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| OitraderError::Database {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            // {instrument}_{timeframe}.csv; instrument may itself contain '_'
            if let Some(stem) = name_str.strip_suffix(".csv") {
                if let Some((instrument, _timeframe)) = stem.rsplit_once('_') {
                    if !instruments.contains(&instrument.to_string()) {
                        instruments.push(instrument.to_string());
                    }
                }
            }
        }

        instruments.sort();
        Ok(instruments)
    }

    fn data_range(
        &self,
        instrument: &str,
        timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, OitraderError> {
        let bars = self.load_series(instrument, timeframe)?;
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((first.epoch_time, last.epoch_time, bars.len()))),
            _ => Ok(None),
        }
    }
}
