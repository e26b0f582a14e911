pub mod agent;
pub mod bus;
pub mod capital;
pub mod claude_cli;
pub mod error;
pub mod model;
pub mod parser;
pub mod prompts;
pub mod rate_limiter;
pub mod snapshot;

pub mod test_support;

pub use agent::{AgentSettings, TradingAgent, Trigger};
pub use bus::{MessageBus, Subscription};
pub use capital::CapitalManager;
pub use error::AgentError;
pub use model::{ChatMessage, ChatOptions, ChatResponse, ClaudeCliModel, ModelClient};
pub use parser::{parse_decision, parse_raw_decision};
pub use rate_limiter::{RateLimiter, RateLimiters};
pub use snapshot::{AggregatorState, ApplyOutcome, SnapshotAggregator};
