use crate::domain::market::Candle;
use crate::domain::model::DataRange;
use anyhow::Result;
use async_trait::async_trait;

/// Supplier of historical bars (exchange fetchers, candle store, fixtures).
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Bars for `symbol` inside `range`, ordered by timestamp ascending.
    async fn load_bars(&self, symbol: &str, range: DataRange) -> Result<Vec<Candle>>;
}
