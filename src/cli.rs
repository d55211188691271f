//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::adapters::cached_data_adapter::CachedDataPort;
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::domain::config::{DataSettings, LiveSettings, RunConfig, SimulateSettings};
use crate::domain::config_validation::{
    build_data_settings, build_live_settings, build_run_config, build_simulate_settings,
    resolve_symbols, validate_config,
};
use crate::domain::driver::{ExecutionDriver, RunResult};
use crate::domain::error::LivermoreError;
use crate::domain::fills::{BrokerFills, SimulatedFills};
use crate::domain::metrics::{Metrics, SymbolResult};
use crate::domain::source::{HistoricalSource, PacedSource, PollingSource};
use crate::domain::universe::load_universe;
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Parser, Debug)]
#[command(name = "livermore", about = "Livermore trend-following trading system")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay history and report performance
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols, overriding [backtest] symbols
        #[arg(long)]
        symbols: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Replay history day by day with a delay and periodic summaries
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbols: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Poll for new bars and route orders to the broker
    Live {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbols: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbols: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            symbols,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, symbols.as_deref())
            } else {
                run_backtest(&config, symbols.as_deref(), output.as_deref())
            }
        }
        Command::Simulate {
            config,
            symbols,
            output,
        } => run_simulate(&config, symbols.as_deref(), output.as_deref()),
        Command::Live {
            config,
            symbols,
            output,
        } => run_live(&config, symbols.as_deref(), output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { config, symbols } => run_info(&config, symbols.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, LivermoreError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Everything a run needs, read and validated once.
pub struct RunSetup {
    pub run: RunConfig,
    pub data: DataSettings,
    pub symbols: Vec<String>,
    pub output_dir: PathBuf,
}

pub fn prepare_run(
    config: &dyn ConfigPort,
    symbol_override: Option<&str>,
    output_override: Option<&Path>,
) -> Result<RunSetup, LivermoreError> {
    validate_config(config)?;
    let output_dir = match output_override {
        Some(dir) => dir.to_path_buf(),
        None => config
            .get_string("output", "dir")
            .map(|d| PathBuf::from(d.trim()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
    };
    Ok(RunSetup {
        run: build_run_config(config)?,
        data: build_data_settings(config)?,
        symbols: resolve_symbols(symbol_override, config)?,
        output_dir,
    })
}

fn data_port(settings: &DataSettings) -> CachedDataPort<CsvAdapter> {
    CachedDataPort::new(
        CsvAdapter::new(settings.data_dir.clone()),
        settings.cache_dir.clone(),
        settings.min_request_interval,
    )
}

fn run_backtest(
    config_path: &Path,
    symbol_override: Option<&str>,
    output: Option<&Path>,
) -> Result<(), LivermoreError> {
    let config = load_config(config_path)?;
    let setup = prepare_run(&config, symbol_override, output)?;
    let port = data_port(&setup.data);

    let result = run_backtest_pipeline(
        &port,
        &setup.run,
        &setup.symbols,
        setup.data.fetch_workers,
        None,
    )?;
    finish_run(&result, &setup.run, &setup.output_dir)
}

fn run_simulate(
    config_path: &Path,
    symbol_override: Option<&str>,
    output: Option<&Path>,
) -> Result<(), LivermoreError> {
    let config = load_config(config_path)?;
    let setup = prepare_run(&config, symbol_override, output)?;
    let simulate = build_simulate_settings(&config)?;
    let port = data_port(&setup.data);

    let result = run_backtest_pipeline(
        &port,
        &setup.run,
        &setup.symbols,
        setup.data.fetch_workers,
        Some(&simulate),
    )?;
    finish_run(&result, &setup.run, &setup.output_dir)
}

/// Load the universe and replay it through the driver with simulated fills.
/// With `simulate` set, batches are paced and summaries logged periodically.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    run: &RunConfig,
    symbols: &[String],
    fetch_workers: usize,
    simulate: Option<&SimulateSettings>,
) -> Result<RunResult, LivermoreError> {
    eprintln!(
        "Loading {} symbols, {} to {}",
        symbols.len(),
        run.start_date,
        run.end_date
    );
    let universe = load_universe(data_port, symbols, run.start_date, run.end_date, fetch_workers)?;
    for skipped in &universe.skipped {
        eprintln!("warning: skipping {} ({:?})", skipped.symbol, skipped.reason);
    }

    let symbol_count = universe.series.len();
    let source = HistoricalSource::new(universe.series);
    eprintln!(
        "Running: {} symbols, {} dates",
        symbol_count,
        source.timeline().len()
    );
    let fills = SimulatedFills::new(run.execution.slippage_pct);

    match simulate {
        None => {
            info!(mode = "backtest", "run started");
            ExecutionDriver::new(run, source, fills).run()
        }
        Some(settings) => {
            info!(mode = "simulate", delay_ms = settings.delay.as_millis() as u64, "run started");
            ExecutionDriver::new(run, PacedSource::new(source, settings.delay), fills)
                .with_summary_every(settings.summary_every)
                .run()
        }
    }
}

fn run_live(
    config_path: &Path,
    symbol_override: Option<&str>,
    output: Option<&Path>,
) -> Result<(), LivermoreError> {
    let config = load_config(config_path)?;
    let setup = prepare_run(&config, symbol_override, output)?;
    let live = build_live_settings(&config)?;
    let port = data_port(&setup.data);

    let stop = Arc::new(AtomicBool::new(false));
    if live.enable_real_trading {
        install_interrupt_handler(Arc::clone(&stop));
    }
    let result = run_live_pipeline(
        &port,
        &setup.run,
        &live,
        &setup.symbols,
        PaperBroker::new(),
        stop,
    )?;
    finish_run(&result, &setup.run, &setup.output_dir)
}

/// Ctrl-C raises `stop`; the batch in flight completes and results are
/// still written.
fn install_interrupt_handler(stop: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping after the current batch...");
        stop.store(true, Ordering::SeqCst);
    });
    if let Err(e) = result {
        warn!(error = %e, "could not install interrupt handler");
    }
}

/// Poll the data port and route orders to `broker` until `stop` is raised or
/// the poll limit is reached. Refuses to start unless real trading is
/// enabled in the configuration. History before today only warms the
/// indicators.
pub fn run_live_pipeline<B: BrokerPort>(
    data_port: &dyn DataPort,
    run: &RunConfig,
    live: &LiveSettings,
    symbols: &[String],
    broker: B,
    stop: Arc<AtomicBool>,
) -> Result<RunResult, LivermoreError> {
    if !live.enable_real_trading {
        return Err(LivermoreError::LiveTradingDisabled);
    }

    let mut source = PollingSource::new(
        data_port,
        symbols.to_vec(),
        live.lookback_days,
        live.poll_interval,
    )
    .with_stop(Arc::clone(&stop));
    if live.max_polls > 0 {
        source = source.with_max_polls(live.max_polls);
    }
    if let Some(hours) = &live.trading_hours {
        source = source.with_trading_hours(hours.clone());
    }

    eprintln!(
        "Live trading via {}: {} symbols, polling every {}s",
        broker.name(),
        symbols.len(),
        live.poll_interval.as_secs()
    );
    info!(mode = "live", broker = broker.name(), "run started");

    ExecutionDriver::new(run, source, BrokerFills::new(broker))
        .with_stop(stop)
        .run()
}

fn finish_run(result: &RunResult, run: &RunConfig, output_dir: &Path) -> Result<(), LivermoreError> {
    print_summary(result, run);
    CsvReportAdapter::new().write(result, output_dir)?;
    eprintln!("\nResults written to: {}", output_dir.display());
    Ok(())
}

pub fn print_summary(result: &RunResult, run: &RunConfig) {
    let metrics = Metrics::compute(&result.portfolio, run.risk_free_rate);
    let symbol_results = SymbolResult::compute_per_symbol(&result.portfolio.trades);

    eprintln!("\n=== Aggregate Results ===");
    eprintln!("Final Equity:     {:.2}", result.portfolio.final_equity());
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Volatility:       {:.2}%", metrics.volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!(
        "Won / Lost:       {} / {}",
        metrics.trades_won, metrics.trades_lost
    );
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!(
        "Costs:            {:.2} commission, {:.2} tax",
        metrics.total_commission, metrics.total_tax
    );
    eprintln!("Signals:          {}", result.signals_emitted);
    if result.history_bars > 0 {
        eprintln!("History bars:     {} (warm-up only)", result.history_bars);
    }

    if !symbol_results.is_empty() {
        eprintln!("\n=== Per-Symbol Summary ===");
        for sr in &symbol_results {
            let pnl_sign = if sr.net_pnl >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades, {:.1}% win rate, {}{:.0}",
                sr.symbol,
                sr.total_trades,
                sr.win_rate * 100.0,
                pnl_sign,
                sr.net_pnl,
            );
        }
    }

    if !result.halted_symbols.is_empty() {
        eprintln!("\nHalted: {}", result.halted_symbols.join(", "));
    }
    if !result.failed_orders.is_empty() {
        eprintln!("\n=== Failed Orders ===");
        for order in &result.failed_orders {
            eprintln!(
                "  {} {} {} x{}: {}",
                order.date, order.symbol, order.side, order.quantity, order.reason
            );
        }
    }
}

pub fn run_dry_run(config_path: &Path, symbol_override: Option<&str>) -> Result<(), LivermoreError> {
    let config = load_config(config_path)?;
    let setup = prepare_run(&config, symbol_override, None)?;
    eprintln!("Config validated successfully");

    let p = &setup.run.params;
    eprintln!("\nLivermore parameters:");
    eprintln!("  trend_confirmation_period: {}", p.trend_confirmation_period);
    eprintln!("  breakout_threshold:        {}", p.breakout_threshold);
    eprintln!("  market_timing_threshold:   {}", p.market_timing_threshold);
    eprintln!("  volume_confirmation:       {}", p.volume_confirmation);
    eprintln!("  pivot_point_period:        {}", p.pivot_point_period);
    eprintln!("  market_mood_sensitivity:   {}", p.market_mood_sensitivity);
    eprintln!("  warm-up bars:              {}", p.warmup_bars());

    eprintln!("\nUniverse:");
    eprintln!("  symbols: {}", setup.symbols.join(", "));
    eprintln!("  data:    {}", setup.data.data_dir.display());
    eprintln!("  output:  {}", setup.output_dir.display());

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), LivermoreError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;
    let live = build_live_settings(&config)?;
    eprintln!("Configuration is valid.");
    if !live.enable_real_trading {
        eprintln!("note: live trading is disabled ([live] enable_real_trading = false)");
    }
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), LivermoreError> {
    let config = load_config(config_path)?;
    let settings = build_data_settings(&config)?;
    let adapter = CsvAdapter::new(settings.data_dir);
    for symbol in adapter.list_symbols()? {
        println!("{symbol}");
    }
    Ok(())
}

fn run_info(config_path: &Path, symbol_override: Option<&str>) -> Result<(), LivermoreError> {
    let config = load_config(config_path)?;
    let run = build_run_config(&config)?;
    let settings = build_data_settings(&config)?;
    let symbols = resolve_symbols(symbol_override, &config)?;
    let adapter = CsvAdapter::new(settings.data_dir);

    for symbol in &symbols {
        match adapter.fetch_ohlcv(symbol, run.start_date, run.end_date) {
            Ok(bars) => match (bars.first(), bars.last()) {
                (Some(first), Some(last)) => println!(
                    "{}: {} bars, {} to {}",
                    symbol,
                    bars.len(),
                    first.date,
                    last.date
                ),
                _ => eprintln!("{symbol}: no data found"),
            },
            Err(e) => eprintln!("error querying {symbol}: {e}"),
        }
    }
    Ok(())
}
