pub mod capital;
pub mod config;
pub mod intent;
pub mod market;
pub mod message;
pub mod numeric;
pub mod record;

pub use capital::{CapitalAllocation, CapitalSummary};
pub use config::{
    AgentConfig, AgentsConfig, CapitalConfig, ExecutorConfig, QuorumConfig, RateLimitsConfig,
    StoreConfig,
};
pub use intent::{ConsensusIntent, ConsensusOutcome, ParseOutcome, Side, TradeIntent};
pub use market::{
    split_pair, AccountBalance, CurrencyBalance, ExchangeInfo, MarketMessage, MarketSnapshot,
    MarketTick, SnapshotPublication, TickerData,
};
pub use message::{topics, BusMessage, ChatRole, DialogMessage, RawDecision};
pub use numeric::decimal_from_json;
pub use record::{DecisionRecord, DecisionStatistics, ExecutionOutcome, ExecutionStatus};
