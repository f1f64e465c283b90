pub mod bot;
pub mod data;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod live;
pub mod metrics;
pub mod signals;

pub use bot::TradingBot;
pub use data::{generate_synthetic_bars, load_file};
pub use engine::BacktestEngine;
pub use execution::ExecutionModel;
pub use live::{FilePriceProvider, LiveRunner, LiveSummary, LiveUpdate, PriceProvider};
pub use metrics::MetricsCalculator;
pub use signals::{MovingAverageCross, Strategy};

// Re-export common types
pub use common::{
    BacktestError, BacktestParameters, BacktestResult, Bar, DataSource, PerformanceMetrics,
    PriceFrame, PricePoint, Result, Signal, SignalRow, SignalSequence, StrategyConfig,
    TradingConfig,
};
