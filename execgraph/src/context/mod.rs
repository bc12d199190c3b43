//! Execution context ("ambiance") carried with every execution.

mod ambiance;

pub use ambiance::{Ambiance, Level, StrategyMetadata};
