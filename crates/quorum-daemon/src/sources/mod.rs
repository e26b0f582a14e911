pub mod feed;
pub mod file;

use async_trait::async_trait;
use quorum_models::{AccountBalance, ExchangeInfo, TickerData};

use crate::error::DaemonError;

/// Where the market feed gets its data. `Ok(None)` means the source has
/// nothing for the request, which is not an error.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &str;
    async fn ticker(&self, pair: &str) -> Result<Option<TickerData>, DaemonError>;
    async fn balance(&self) -> Result<Option<AccountBalance>, DaemonError>;
    async fn exchange_info(&self) -> Result<Option<ExchangeInfo>, DaemonError>;
}
