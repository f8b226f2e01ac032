//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::OitraderError;
use crate::domain::oi::DEFAULT_BATCH_SIZE;
use crate::domain::strategy::{SIMULATION_QUANTITY, SmaCrossParams};
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "oitrader", about = "Open-interest analytics and backtesting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import bars from CSV files into the bar store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        timeframe: String,
        /// Directory holding {instrument}_{timeframe}.csv files
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
    /// Run an SMA-crossover backtest over stored bars
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        timeframe: String,
        #[arg(long)]
        short: Option<usize>,
        #[arg(long)]
        long: Option<usize>,
        /// Window start, YYYY-MM-DD or epoch seconds
        #[arg(long)]
        from: Option<String>,
        /// Window end, YYYY-MM-DD or epoch seconds
        #[arg(long)]
        to: Option<String>,
    },
    /// Classify price/OI movement for every stored bar pair
    Classify {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        timeframe: String,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Show data range for stored instrument(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: Option<String>,
        #[arg(long)]
        timeframe: String,
    },
    /// List instruments present in the bar store
    ListInstruments {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Import {
            config,
            instrument,
            timeframe,
            csv_dir,
        } => run_import(&config, &instrument, &timeframe, csv_dir.as_ref()),
        Command::Backtest {
            config,
            instrument,
            timeframe,
            short,
            long,
            from,
            to,
        } => run_backtest(
            &config,
            &instrument,
            &timeframe,
            short,
            long,
            from.as_deref(),
            to.as_deref(),
        ),
        Command::Classify {
            config,
            instrument,
            timeframe,
            from,
            to,
            batch_size,
        } => run_classify(
            &config,
            &instrument,
            &timeframe,
            from.as_deref(),
            to.as_deref(),
            batch_size,
        ),
        Command::Info {
            config,
            instrument,
            timeframe,
        } => run_info(&config, instrument.as_deref(), &timeframe),
        Command::ListInstruments { config } => run_list_instruments(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = OitraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// `YYYY-MM-DD` (midnight UTC) or raw epoch seconds.
pub fn parse_time(value: &str) -> Result<i64, OitraderError> {
    if let Ok(epoch) = value.parse::<i64>() {
        return Ok(epoch);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        OitraderError::validation(format!(
            "invalid time {value:?} (expected YYYY-MM-DD or epoch seconds)"
        ))
    })?;
    Ok(date.and_time(NaiveTime::MIN).and_utc().timestamp())
}

fn parse_window(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<i64>, Option<i64>), OitraderError> {
    let from = from.map(parse_time).transpose()?;
    let to = to.map(parse_time).transpose()?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(OitraderError::validation(format!(
                "window start {f} is after window end {t}"
            )));
        }
    }
    Ok((from, to))
}

pub fn build_backtest_params(
    config: &dyn ConfigPort,
    short: Option<usize>,
    long: Option<usize>,
) -> SmaCrossParams {
    let short_period =
        short.unwrap_or_else(|| config.get_int("backtest", "short_period", 10) as usize);
    let long_period =
        long.unwrap_or_else(|| config.get_int("backtest", "long_period", 20) as usize);
    let quantity = config.get_double("backtest", "quantity", SIMULATION_QUANTITY);
    let budget_secs = config.get_int("backtest", "time_budget_secs", 0);
    let time_budget = if budget_secs > 0 {
        Some(std::time::Duration::from_secs(budget_secs as u64))
    } else {
        None
    };

    SmaCrossParams {
        strategy_id: format!("sma-{short_period}-{long_period}"),
        short_period,
        long_period,
        quantity,
        time_budget,
    }
}

fn run_import(
    config_path: &PathBuf,
    instrument: &str,
    timeframe: &str,
    csv_dir: Option<&PathBuf>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let csv_dir = match csv_dir {
        Some(p) => p.clone(),
        None => match config.get_string("data", "csv_dir") {
            Some(d) => PathBuf::from(d),
            None => {
                let err = OitraderError::ConfigMissing {
                    section: "data".into(),
                    key: "csv_dir".into(),
                };
                eprintln!("error: {err}");
                return (&err).into();
            }
        },
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::csv_adapter::CsvBarAdapter;
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::ports::bar_port::BarPort;

        let source = CsvBarAdapter::new(csv_dir);
        let bars = match source.fetch_bars(instrument, timeframe, None, None, None) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        // Invalid rows are dropped with a warning; the rest still import.
        let mut valid = Vec::with_capacity(bars.len());
        let mut skipped = 0usize;
        for bar in bars {
            match bar.validate() {
                Ok(()) => valid.push(bar),
                Err(e) => {
                    eprintln!("warning: skipping bar at {}: {}", bar.epoch_time, e);
                    skipped += 1;
                }
            }
        }

        let store = match open_store(&config) {
            Ok(s) => s,
            Err(code) => return code,
        };
        if let Err(e) = store.upsert_bars(&valid) {
            eprintln!("error: {e}");
            return (&e).into();
        }

        eprintln!(
            "Imported {} bars for {}/{} ({} skipped)",
            valid.len(),
            instrument,
            timeframe,
            skipped
        );
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (csv_dir, instrument, timeframe);
        eprintln!("error: sqlite feature is required for import");
        ExitCode::from(1)
    }
}

fn run_backtest(
    config_path: &PathBuf,
    instrument: &str,
    timeframe: &str,
    short: Option<usize>,
    long: Option<usize>,
    from: Option<&str>,
    to: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let params = build_backtest_params(&config, short, long);
    let (from, to) = match parse_window(from, to) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::memory_adapter::MemoryLedgerStore;
        use crate::domain::ledger::PositionLedger;
        use crate::domain::simulator;
        use crate::ports::bar_port::BarPort;

        let store = match open_store(&config) {
            Ok(s) => s,
            Err(code) => return code,
        };

        let bars = match store.fetch_bars(instrument, timeframe, from, to, None) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        eprintln!(
            "Running backtest: {}/{} over {} bars (SMA {}/{})",
            instrument,
            timeframe,
            bars.len(),
            params.short_period,
            params.long_period,
        );

        // Each run gets its own ledger scope, so results are reproducible.
        let ledger_store = MemoryLedgerStore::new();
        let ledger = PositionLedger::new(&ledger_store);
        let result = match simulator::run(&params, instrument, &bars, &ledger) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        eprintln!("\n=== Backtest Results ===");
        eprintln!("Strategy:       {}", result.strategy_id);
        eprintln!("Window:         {} to {}", result.start_time, result.end_time);
        eprintln!("Total Trades:   {}", result.total_trades);
        eprintln!("Winning Trades: {}", result.winning_trades);
        eprintln!("Win Rate:       {:.1}%", result.win_rate * 100.0);
        eprintln!("Total P&L:      {:.2}", result.total_pnl);
        eprintln!("Sharpe Ratio:   {:.2}", result.sharpe_ratio);
        eprintln!("Max Drawdown:   {:.2}", result.max_drawdown);
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (instrument, timeframe, params, from, to);
        eprintln!("error: sqlite feature is required for backtest");
        ExitCode::from(1)
    }
}

fn run_classify(
    config_path: &PathBuf,
    instrument: &str,
    timeframe: &str,
    from: Option<&str>,
    to: Option<&str>,
    batch_size: Option<usize>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let batch_size = batch_size.unwrap_or_else(|| {
        config.get_int("classifier", "batch_size", DEFAULT_BATCH_SIZE as i64) as usize
    });
    let (from, to) = match parse_window(from, to) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::domain::oi;
        use crate::ports::bar_port::BarPort;

        let store = match open_store(&config) {
            Ok(s) => s,
            Err(code) => return code,
        };

        let bars = match store.fetch_bars(instrument, timeframe, from, to, None) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        eprintln!(
            "Classifying {}/{}: {} bars, batch size {}",
            instrument,
            timeframe,
            bars.len(),
            batch_size
        );

        let summary = match oi::enrich_series(&bars, &store, batch_size) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        println!(
            "{}/{}: {} classified, {} skipped",
            instrument, timeframe, summary.classified, summary.skipped
        );
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (instrument, timeframe, from, to, batch_size);
        eprintln!("error: sqlite feature is required for classify");
        ExitCode::from(1)
    }
}

fn run_info(config_path: &PathBuf, instrument: Option<&str>, timeframe: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::ports::bar_port::BarPort;

        let store = match open_store(&config) {
            Ok(s) => s,
            Err(code) => return code,
        };

        let instruments = match instrument {
            Some(i) => vec![i.to_string()],
            None => match store.list_instruments() {
                Ok(list) => list,
                Err(e) => {
                    eprintln!("error: {e}");
                    return (&e).into();
                }
            },
        };

        for inst in &instruments {
            match store.data_range(inst, timeframe) {
                Ok(Some((min, max, count))) => {
                    println!("{}/{}: {} bars, {} to {}", inst, timeframe, count, min, max);
                }
                Ok(None) => {
                    eprintln!("{}/{}: no data found", inst, timeframe);
                }
                Err(e) => {
                    eprintln!("error querying {}/{}: {}", inst, timeframe, e);
                }
            }
        }
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, instrument, timeframe);
        eprintln!("error: sqlite feature is required for info");
        ExitCode::from(1)
    }
}

fn run_list_instruments(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::ports::bar_port::BarPort;

        let store = match open_store(&config) {
            Ok(s) => s,
            Err(code) => return code,
        };

        let instruments = match store.list_instruments() {
            Ok(list) => list,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        if instruments.is_empty() {
            eprintln!("No instruments found");
        } else {
            for inst in &instruments {
                println!("{}", inst);
            }
            eprintln!("{} instruments found", instruments.len());
        }
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        eprintln!("error: sqlite feature is required for list-instruments");
        ExitCode::from(1)
    }
}

#[cfg(feature = "sqlite")]
fn open_store(
    config: &dyn ConfigPort,
) -> Result<crate::adapters::sqlite_adapter::SqliteAdapter, ExitCode> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let store = SqliteAdapter::from_config(config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    store.initialize_schema().map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_accepts_epoch_and_date() {
        assert_eq!(parse_time("1700000000").unwrap(), 1_700_000_000);
        // 2024-01-15T00:00:00Z
        assert_eq!(parse_time("2024-01-15").unwrap(), 1_705_276_800);
        assert!(parse_time("15/01/2024").is_err());
    }

    #[test]
    fn parse_window_rejects_inverted_range() {
        assert!(parse_window(Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert!(parse_window(Some("2024-01-01"), Some("2024-02-01")).is_ok());
        assert_eq!(parse_window(None, None).unwrap(), (None, None));
    }

    #[test]
    fn backtest_params_prefer_cli_over_config() {
        let config = crate::adapters::file_config_adapter::FileConfigAdapter::from_string(
            "[backtest]\nshort_period = 5\nlong_period = 15\nquantity = 50\ntime_budget_secs = 30\n",
        )
        .unwrap();

        let params = build_backtest_params(&config, Some(7), None);
        assert_eq!(params.short_period, 7);
        assert_eq!(params.long_period, 15);
        assert_eq!(params.quantity, 50.0);
        assert_eq!(
            params.time_budget,
            Some(std::time::Duration::from_secs(30))
        );
        assert_eq!(params.strategy_id, "sma-7-15");
    }

    #[test]
    fn backtest_params_defaults() {
        let config =
            crate::adapters::file_config_adapter::FileConfigAdapter::from_string("[backtest]\n")
                .unwrap();
        let params = build_backtest_params(&config, None, None);
        assert_eq!(params.short_period, 10);
        assert_eq!(params.long_period, 20);
        assert_eq!(params.quantity, SIMULATION_QUANTITY);
        assert!(params.time_budget.is_none());
    }
}
