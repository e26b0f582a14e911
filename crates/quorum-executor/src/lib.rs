pub mod error;
pub mod exchange;
pub mod executor;
pub mod manager;

pub use error::ExecutionError;
pub use exchange::{Exchange, OrderRequest, OrderResult, PaperExchange};
pub use executor::{ExecutorSettings, TradeExecutor};
pub use manager::{consensus, order_cost, DecisionManager, Rejection, ValidationLimits};
