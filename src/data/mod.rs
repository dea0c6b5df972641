pub mod candles;
pub mod ticker;

pub use candles::PriceBar;
pub use ticker::MarketTicker;
