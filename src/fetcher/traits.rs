use crate::model::{ChartRequest, FetchError, FundamentalsRequest};

/// Raw access to a market-data backend. Bodies are returned unparsed.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_chart(&self, req: &ChartRequest) -> Result<String, FetchError>;
    async fn fetch_fundamentals(&self, req: &FundamentalsRequest) -> Result<String, FetchError>;
}
