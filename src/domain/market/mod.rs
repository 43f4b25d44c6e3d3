pub mod candle;
pub mod timeframe;

pub use candle::{Candle, OhlcvF64};
pub use timeframe::Timeframe;
