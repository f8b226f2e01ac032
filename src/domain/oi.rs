//! Open-interest interpretation classifier.
//!
//! Joint price/OI movement between two consecutive bars maps to a market
//! positioning regime: rising price on rising OI is fresh long exposure,
//! falling price on rising OI is fresh shorts, and falling OI unwinds
//! whichever side had built up.

use std::fmt;

use crate::domain::bar::Bar;
use crate::domain::error::OitraderError;
use crate::ports::analysis_port::{AnalysisSinkPort, BarKey};

/// Price moves under 0.1% are treated as flat.
pub const PRICE_FLAT_THRESHOLD_PCT: f64 = 0.1;
/// OI moves under 1% are treated as flat.
pub const OI_FLAT_THRESHOLD_PCT: f64 = 1.0;
/// Batch size for persisting enrichment results; performance-only.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Flat => write!(f, "FLAT"),
        }
    }
}

impl Direction {
    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "UP" => Some(Direction::Up),
            "DOWN" => Some(Direction::Down),
            "FLAT" => Some(Direction::Flat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation {
    LongBuildup,
    ShortBuildup,
    LongUnwinding,
    ShortCovering,
    Inconclusive,
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpretation::LongBuildup => write!(f, "LONG_BUILDUP"),
            Interpretation::ShortBuildup => write!(f, "SHORT_BUILDUP"),
            Interpretation::LongUnwinding => write!(f, "LONG_UNWINDING"),
            Interpretation::ShortCovering => write!(f, "SHORT_COVERING"),
            Interpretation::Inconclusive => write!(f, "INCONCLUSIVE"),
        }
    }
}

impl Interpretation {
    pub fn parse(s: &str) -> Option<Interpretation> {
        match s {
            "LONG_BUILDUP" => Some(Interpretation::LongBuildup),
            "SHORT_BUILDUP" => Some(Interpretation::ShortBuildup),
            "LONG_UNWINDING" => Some(Interpretation::LongUnwinding),
            "SHORT_COVERING" => Some(Interpretation::ShortCovering),
            "INCONCLUSIVE" => Some(Interpretation::Inconclusive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Confidence> {
        match s {
            "HIGH" => Some(Confidence::High),
            "MEDIUM" => Some(Confidence::Medium),
            "LOW" => Some(Confidence::Low),
            _ => None,
        }
    }
}

/// Derived classification of one ordered bar pair. Stateless: always
/// recomputable from the two source bars, so persisting it is a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct OiAnalysis {
    pub price_change: f64,
    pub price_change_pct: f64,
    pub oi_change: f64,
    pub oi_change_pct: f64,
    pub price_direction: Direction,
    pub oi_direction: Direction,
    pub interpretation: Interpretation,
    pub confidence: Confidence,
}

/// Classify the transition from `previous` to `current`.
///
/// Pure and deterministic. Fails with a data-quality error for malformed
/// pairs (mismatched series, non-monotonic timestamps, invalid bars)
/// rather than defaulting an interpretation.
pub fn classify(previous: &Bar, current: &Bar) -> Result<OiAnalysis, OitraderError> {
    if previous.instrument != current.instrument || previous.timeframe != current.timeframe {
        return Err(OitraderError::data_quality(format!(
            "bar pair mixes series: {}/{} vs {}/{}",
            previous.instrument, previous.timeframe, current.instrument, current.timeframe
        )));
    }
    if current.epoch_time <= previous.epoch_time {
        return Err(OitraderError::data_quality(format!(
            "{} {}: non-monotonic timestamps {} -> {}",
            current.instrument, current.timeframe, previous.epoch_time, current.epoch_time
        )));
    }
    previous.validate()?;
    current.validate()?;

    let price_change = current.close - previous.close;
    let price_change_pct = price_change / previous.close * 100.0;

    let oi_change = current.open_interest - previous.open_interest;
    let oi_change_pct = if previous.open_interest > 0.0 {
        oi_change / previous.open_interest * 100.0
    } else {
        0.0
    };

    let price_direction = direction(price_change_pct, PRICE_FLAT_THRESHOLD_PCT);
    let oi_direction = direction(oi_change_pct, OI_FLAT_THRESHOLD_PCT);

    let interpretation = match (price_direction, oi_direction) {
        (Direction::Up, Direction::Up) => Interpretation::LongBuildup,
        (Direction::Down, Direction::Up) => Interpretation::ShortBuildup,
        (Direction::Down, Direction::Down) => Interpretation::LongUnwinding,
        (Direction::Up, Direction::Down) => Interpretation::ShortCovering,
        _ => Interpretation::Inconclusive,
    };

    let confidence = if interpretation == Interpretation::Inconclusive {
        Confidence::Low
    } else if price_change_pct.abs() > 0.5 && oi_change_pct.abs() > 2.0 {
        Confidence::High
    } else if price_change_pct.abs() > 0.2 && oi_change_pct.abs() > 1.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Ok(OiAnalysis {
        price_change,
        price_change_pct,
        oi_change,
        oi_change_pct,
        price_direction,
        oi_direction,
        interpretation,
        confidence,
    })
}

fn direction(change_pct: f64, flat_threshold: f64) -> Direction {
    if change_pct.abs() < flat_threshold {
        Direction::Flat
    } else if change_pct > 0.0 {
        Direction::Up
    } else {
        Direction::Down
    }
}

/// Counts from one enrichment pass over a bar series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub classified: usize,
    pub skipped: usize,
}

/// Classify every consecutive pair of an ordered series and push the
/// results to `sink` in batches.
///
/// Batching never changes an individual classification. Pairs that fail
/// validation are skipped and counted as a data-quality signal; the rest
/// of the series still goes through.
pub fn enrich_series(
    bars: &[Bar],
    sink: &dyn AnalysisSinkPort,
    batch_size: usize,
) -> Result<EnrichmentSummary, OitraderError> {
    if batch_size == 0 {
        return Err(OitraderError::validation("batch size must be positive"));
    }

    let mut summary = EnrichmentSummary {
        classified: 0,
        skipped: 0,
    };
    let mut batch: Vec<(BarKey, OiAnalysis)> = Vec::with_capacity(batch_size.min(bars.len()));

    for pair in bars.windows(2) {
        match classify(&pair[0], &pair[1]) {
            Ok(analysis) => {
                batch.push((BarKey::of(&pair[1]), analysis));
                summary.classified += 1;
                if batch.len() == batch_size {
                    sink.upsert_batch(&batch)?;
                    batch.clear();
                }
            }
            Err(e) => {
                eprintln!("warning: skipping pair ending at {}: {}", pair[1].epoch_time, e);
                summary.skipped += 1;
            }
        }
    }

    if !batch.is_empty() {
        sink.upsert_batch(&batch)?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair(prev_close: f64, prev_oi: f64, close: f64, oi: f64) -> (Bar, Bar) {
        let make = |epoch: i64, close: f64, oi: f64| Bar {
            instrument: "NIFTY".into(),
            timeframe: "5m".into(),
            epoch_time: epoch,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1000.0,
            open_interest: oi,
        };
        (make(1000, prev_close, prev_oi), make(1300, close, oi))
    }

    #[test]
    fn long_buildup_high_confidence() {
        // +1.2% price, +5% OI
        let (prev, cur) = pair(100.0, 1000.0, 101.2, 1050.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.interpretation, Interpretation::LongBuildup);
        assert_eq!(analysis.confidence, Confidence::High);
        assert_relative_eq!(analysis.price_change, 1.2, epsilon = 1e-9);
        assert_relative_eq!(analysis.oi_change, 50.0);
        assert_relative_eq!(analysis.price_change_pct, 1.2, epsilon = 1e-9);
        assert_relative_eq!(analysis.oi_change_pct, 5.0);
    }

    #[test]
    fn short_buildup() {
        let (prev, cur) = pair(100.0, 1000.0, 99.0, 1050.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.interpretation, Interpretation::ShortBuildup);
        assert_eq!(analysis.price_direction, Direction::Down);
        assert_eq!(analysis.oi_direction, Direction::Up);
    }

    #[test]
    fn long_unwinding() {
        let (prev, cur) = pair(100.0, 1000.0, 99.0, 950.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.interpretation, Interpretation::LongUnwinding);
    }

    #[test]
    fn short_covering() {
        let (prev, cur) = pair(100.0, 1000.0, 101.0, 950.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.interpretation, Interpretation::ShortCovering);
    }

    #[test]
    fn flat_price_is_inconclusive_regardless_of_oi() {
        // +0.05% price is under the flat threshold
        let (prev, cur) = pair(100.0, 1000.0, 100.05, 1500.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.price_direction, Direction::Flat);
        assert_eq!(analysis.interpretation, Interpretation::Inconclusive);
        assert_eq!(analysis.confidence, Confidence::Low);
    }

    #[test]
    fn flat_oi_is_inconclusive() {
        // +2% price, +0.5% OI
        let (prev, cur) = pair(100.0, 1000.0, 102.0, 1005.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.oi_direction, Direction::Flat);
        assert_eq!(analysis.interpretation, Interpretation::Inconclusive);
    }

    #[test]
    fn medium_confidence_band() {
        // +0.3% price, +1.5% OI
        let (prev, cur) = pair(100.0, 1000.0, 100.3, 1015.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.interpretation, Interpretation::LongBuildup);
        assert_eq!(analysis.confidence, Confidence::Medium);
    }

    #[test]
    fn low_confidence_when_definite_but_small() {
        // +0.15% price, +1.2% OI: definite quadrant, under the medium band
        let (prev, cur) = pair(100.0, 1000.0, 100.15, 1012.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_eq!(analysis.interpretation, Interpretation::LongBuildup);
        assert_eq!(analysis.confidence, Confidence::Low);
    }

    #[test]
    fn zero_previous_oi_treated_as_flat_oi() {
        let (prev, cur) = pair(100.0, 0.0, 102.0, 500.0);
        let analysis = classify(&prev, &cur).unwrap();
        assert_relative_eq!(analysis.oi_change_pct, 0.0);
        assert_eq!(analysis.oi_direction, Direction::Flat);
        assert_eq!(analysis.interpretation, Interpretation::Inconclusive);
    }

    #[test]
    fn rejects_non_monotonic_pair() {
        let (prev, mut cur) = pair(100.0, 1000.0, 101.0, 1050.0);
        cur.epoch_time = prev.epoch_time;
        assert!(matches!(
            classify(&prev, &cur),
            Err(OitraderError::DataQuality { .. })
        ));
    }

    #[test]
    fn rejects_mixed_series() {
        let (prev, mut cur) = pair(100.0, 1000.0, 101.0, 1050.0);
        cur.instrument = "BANKNIFTY".into();
        assert!(matches!(
            classify(&prev, &cur),
            Err(OitraderError::DataQuality { .. })
        ));
    }

    #[test]
    fn rejects_malformed_bar() {
        let (prev, mut cur) = pair(100.0, 1000.0, 101.0, 1050.0);
        cur.open_interest = f64::NAN;
        assert!(classify(&prev, &cur).is_err());
    }

    #[test]
    fn classification_is_deterministic() {
        let (prev, cur) = pair(100.0, 1000.0, 101.2, 1050.0);
        assert_eq!(classify(&prev, &cur).unwrap(), classify(&prev, &cur).unwrap());
    }

    #[test]
    fn interpretation_display_and_parse() {
        for interp in [
            Interpretation::LongBuildup,
            Interpretation::ShortBuildup,
            Interpretation::LongUnwinding,
            Interpretation::ShortCovering,
            Interpretation::Inconclusive,
        ] {
            assert_eq!(Interpretation::parse(&interp.to_string()), Some(interp));
        }
        assert_eq!(Interpretation::parse("SIDEWAYS"), None);
    }
}
