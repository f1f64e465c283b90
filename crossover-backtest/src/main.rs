use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crossover_backtest::{
    load_file, BacktestResult, DataSource, MovingAverageCross, PriceFrame, TradingBot,
    TradingConfig,
};

#[derive(Parser, Debug)]
#[command(name = "crossover-backtest")]
#[command(version = "0.1.0")]
#[command(about = "Moving average crossover backtester", long_about = None)]
struct Cli {
    /// JSON configuration file. Without it, TRADERBOT_* environment variables are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a backtest
    Backtest(BacktestArgs),
    /// Poll a data file and report the latest signal each cycle
    Live(LiveArgs),
}

#[derive(Args, Debug)]
struct StrategyArgs {
    /// Fast moving average window
    #[arg(long)]
    fast_window: Option<usize>,

    /// Slow moving average window
    #[arg(long)]
    slow_window: Option<usize>,
}

#[derive(Args, Debug)]
struct BacktestArgs {
    /// Data file path (CSV/JSON). Repeat to backtest several files independently.
    #[arg(short = 'f', long, alias = "csv")]
    data_file: Vec<PathBuf>,

    #[command(flatten)]
    strategy: StrategyArgs,

    /// Initial capital
    #[arg(short, long)]
    capital: Option<f64>,

    /// Flat fee per unit of position change
    #[arg(long)]
    commission: Option<f64>,

    /// Cost per unit of position turnover, in return units
    #[arg(long)]
    slippage: Option<f64>,

    /// Periods per year used for annualisation
    #[arg(long)]
    trading_days: Option<u32>,

    /// Number of days of synthetic data (used when no data file is configured)
    #[arg(short, long)]
    days: Option<u64>,

    /// Initial price for synthetic data
    #[arg(long)]
    initial_price: Option<f64>,

    /// Seed for reproducible synthetic data
    #[arg(long)]
    seed: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Debug)]
struct LiveArgs {
    /// Data file to poll (CSV/JSON)
    #[arg(short = 'f', long, alias = "csv")]
    data_file: Option<PathBuf>,

    #[command(flatten)]
    strategy: StrategyArgs,

    /// Number of bars used for signal evaluation
    #[arg(long, default_value_t = 200)]
    lookback: usize,

    /// Stop after this many polling cycles
    #[arg(long)]
    iterations: Option<usize>,

    /// Seconds between polling cycles
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Serialize)]
struct Report<'a> {
    source: &'a str,
    #[serde(flatten)]
    result: &'a BacktestResult,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => TradingConfig::from_json(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => TradingConfig::from_env()
            .context("failed to read configuration from environment")?,
    };

    match cli.command {
        Command::Backtest(args) => run_backtest(&mut config, args),
        Command::Live(args) => run_live(&mut config, args),
    }
}

fn apply_strategy_args(config: &mut TradingConfig, args: &StrategyArgs) {
    if let Some(fast) = args.fast_window {
        config.fast_window = fast;
    }
    if let Some(slow) = args.slow_window {
        config.slow_window = slow;
    }
}

fn run_backtest(config: &mut TradingConfig, args: BacktestArgs) -> Result<()> {
    apply_strategy_args(config, &args.strategy);
    if let Some(capital) = args.capital {
        config.cash = capital;
    }
    if let Some(commission) = args.commission {
        config.commission = commission;
    }
    if let Some(slippage) = args.slippage {
        config.slippage = slippage;
    }
    if let Some(trading_days) = args.trading_days {
        config.trading_days = trading_days;
    }
    if let Some(days) = args.days {
        config.extra.insert("days".to_string(), days.into());
    }
    if let Some(price) = args.initial_price {
        config.extra.insert("initial_price".to_string(), price.into());
    }
    if let Some(seed) = args.seed {
        config.extra.insert("seed".to_string(), seed.into());
    }
    if args.data_file.is_empty()
        && config.data_source == DataSource::File
        && config.data_path.is_none()
    {
        info!("no data file configured, falling back to synthetic data");
        config.data_source = DataSource::Synthetic;
    }

    let bot = TradingBot::new(config.clone())?;

    let reports: Vec<(String, BacktestResult)> = if args.data_file.is_empty() {
        let source = match (bot.config().data_source, &bot.config().data_path) {
            (DataSource::File, Some(path)) => path.display().to_string(),
            _ => "synthetic".to_string(),
        };
        vec![(source, bot.backtest(None)?)]
    } else {
        info!(files = args.data_file.len(), "running backtests");
        args.data_file
            .par_iter()
            .map(|path| backtest_file(&bot, path).map(|r| (path.display().to_string(), r)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<_>>()?
    };

    for (source, result) in &reports {
        match args.output {
            OutputFormat::Json => {
                let report = Report { source, result };
                let json = if args.pretty {
                    serde_json::to_string_pretty(&report)?
                } else {
                    serde_json::to_string(&report)?
                };
                println!("{}", json);
            }
            OutputFormat::Text => print_text_report(source, bot.strategy(), result),
        }
    }

    Ok(())
}

fn backtest_file(bot: &TradingBot, path: &Path) -> Result<BacktestResult> {
    let bars = load_file(path).with_context(|| format!("failed to load {}", path.display()))?;
    let frame = PriceFrame::from_bars(&bars);
    let result = bot
        .backtest(Some(&frame))
        .with_context(|| format!("backtest failed for {}", path.display()))?;
    Ok(result)
}

fn run_live(config: &mut TradingConfig, args: LiveArgs) -> Result<()> {
    apply_strategy_args(config, &args.strategy);
    if let Some(path) = args.data_file {
        config.data_source = DataSource::File;
        config.data_path = Some(path);
    }
    if let Some(secs) = args.interval_secs {
        config.poll_interval_secs = secs;
    }

    let bot = TradingBot::new(config.clone())?;
    let runner = bot.live_runner(args.lookback)?;

    let summary = runner.run(args.iterations, |update| {
        match serde_json::to_string(update) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "failed to serialise live update"),
        }
    });

    info!(
        iterations = summary.iterations,
        failures = summary.failures,
        last_signal = ?summary.last_signal,
        "live polling finished"
    );
    Ok(())
}

fn print_text_report(source: &str, strategy: &MovingAverageCross, result: &BacktestResult) {
    println!();
    println!("Backtest complete: {}", source);
    println!("=================");
    println!(
        "{:>20}: SMA {}/{}",
        "strategy",
        strategy.fast_window(),
        strategy.slow_window()
    );
    if let (Some((start, _)), Some((end, _))) =
        (result.equity_curve.first(), result.equity_curve.last())
    {
        println!(
            "{:>20}: {} to {}",
            "period",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
    }
    println!("{:>20}: {}", "bars", result.equity_curve.len());
    println!("{:>20}: {:.2}", "initial_cash", result.initial_cash);
    println!("{:>20}: {:.2}", "final_equity", result.final_equity);
    for (key, value) in result.metrics.entries() {
        println!("{:>20}: {:.4}", key, value);
    }

    let trades = result
        .signals
        .iter()
        .filter(|row| row.position_change != 0)
        .count();
    println!("{:>20}: {}", "signal_changes", trades);
    if let Some(last) = result.signals.last() {
        println!(
            "{:>20}: {} @ {:.2} ({})",
            "last_signal",
            last.signal,
            last.price,
            last.timestamp.format("%Y-%m-%d")
        );
    }
}
