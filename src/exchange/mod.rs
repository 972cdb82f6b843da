pub mod coinbase;

pub use coinbase::CoinbaseClient;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CandleSeries, Timeframe};

/// Market-data collaborator. Prices are consumed only for entry-price
/// computation; signal classification never depends on them.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_ohlcv(
        &mut self,
        product: &str,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries>;
    async fn get_current_price(&mut self, product: &str) -> Result<f64>;
}
