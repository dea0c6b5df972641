pub mod breakout;
pub mod indicators;

pub use breakout::{evaluate, BreakoutDecision, StrategyParameters, DEFAULT_FEE_RATE, DEFAULT_K};
pub use indicators::MA_WINDOW;
