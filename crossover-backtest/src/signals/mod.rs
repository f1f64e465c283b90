pub mod crossover;

pub use crossover::MovingAverageCross;

use common::{PricePoint, Result, SignalSequence};

/// Anything that turns a price series into a signal sequence.
///
/// Implementations must return exactly one row per input price, in input order.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn generate_signals(&self, prices: &[PricePoint]) -> Result<SignalSequence>;
}
