use quorum_models::QuorumConfig;
use serde::{Deserialize, Serialize};

/// Full daemon configuration: the shared pipeline sections plus `[feed]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(flatten)]
    pub core: QuorumConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// JSON file the file-backed market source reads on every fetch.
    #[serde(default = "default_data_path")]
    pub data_path: String,
    #[serde(default = "default_pairs")]
    pub pairs: Vec<String>,
    #[serde(default = "default_collect_interval")]
    pub collect_interval_seconds: u64,
    #[serde(default = "default_true")]
    pub collect_balance: bool,
    /// Absolute price move required before a pair is re-published as a tick.
    #[serde(default = "default_min_price_change")]
    pub min_price_change: f64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,
    /// Broadcast on the dialog topic once all agents are listening.
    #[serde(default)]
    pub initial_prompt: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            pairs: default_pairs(),
            collect_interval_seconds: default_collect_interval(),
            collect_balance: true,
            min_price_change: default_min_price_change(),
            stats_interval_seconds: default_stats_interval(),
            initial_prompt: None,
        }
    }
}

fn default_data_path() -> String {
    "data/market.json".to_string()
}
fn default_pairs() -> Vec<String> {
    vec!["BTC/USD".to_string(), "ETH/USD".to_string()]
}
fn default_collect_interval() -> u64 {
    30
}
fn default_min_price_change() -> f64 {
    0.01
}
fn default_stats_interval() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
