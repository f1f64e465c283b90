pub mod sma;

pub use sma::calculate_sma;
