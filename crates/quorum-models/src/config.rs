use serde::{Deserialize, Serialize};

/// Top-level configuration for the decision pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuorumConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub capital: CapitalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the SQLite decision history.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Maximum entries in the per-agent decision cache used for consensus.
    #[serde(default = "default_decision_cache_capacity")]
    pub decision_cache_capacity: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            decision_cache_capacity: default_decision_cache_capacity(),
        }
    }
}

/// Sliding-window ceilings shared by every agent and the market feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitsConfig {
    #[serde(default = "default_api_max_calls")]
    pub api_max_calls: usize,
    #[serde(default = "default_window_seconds")]
    pub api_window_seconds: u64,
    #[serde(default = "default_decision_max_calls")]
    pub decision_max_calls: usize,
    #[serde(default = "default_window_seconds")]
    pub decision_window_seconds: u64,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            api_max_calls: default_api_max_calls(),
            api_window_seconds: default_window_seconds(),
            decision_max_calls: default_decision_max_calls(),
            decision_window_seconds: default_window_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Interval trigger period.
    #[serde(default = "default_decision_interval")]
    pub decision_interval_seconds: u64,
    /// Dialog turns kept per agent.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Bounded wait for the first market message of a loop iteration.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Wait for each follow-up message while draining a backlog.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Upper bound on market messages drained per iteration.
    #[serde(default = "default_max_drain")]
    pub max_drain: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_model_timeout")]
    pub model_timeout_seconds: u64,
    /// Default model for every agent.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            decision_interval_seconds: default_decision_interval(),
            history_len: default_history_len(),
            poll_timeout_ms: default_poll_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            max_drain: default_max_drain(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            model_timeout_seconds: default_model_timeout(),
            model: default_model(),
            agents: default_agents(),
        }
    }
}

impl AgentsConfig {
    pub fn enabled(&self) -> impl Iterator<Item = &AgentConfig> {
        self.agents.iter().filter(|a| a.enabled)
    }
}

/// One decision-making agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    /// Free-form strategy description used in the system prompt.
    pub strategy: String,
    #[serde(default = "default_risk_level")]
    pub risk_level: String,
    /// Override model for this agent. Falls back to `AgentsConfig::model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    /// Route orders to the paper exchange instead of a live one.
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default)]
    pub consensus_enabled: bool,
    #[serde(default = "default_consensus_window")]
    pub consensus_window_seconds: u64,
    /// Minimum spacing between submitted orders.
    #[serde(default = "default_order_cooldown")]
    pub order_cooldown_seconds: u64,
    /// Decisions older than this are rejected as stale.
    #[serde(default = "default_decision_timeout")]
    pub decision_timeout_seconds: u64,
    #[serde(default = "default_max_quantity")]
    pub max_quantity: f64,
    /// Allowed deviation of a limit price from the current price.
    #[serde(default = "default_price_band_percent")]
    pub price_band_percent: f64,
    #[serde(default = "default_order_timeout")]
    pub order_timeout_seconds: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            consensus_enabled: false,
            consensus_window_seconds: default_consensus_window(),
            order_cooldown_seconds: default_order_cooldown(),
            decision_timeout_seconds: default_decision_timeout(),
            max_quantity: default_max_quantity(),
            price_band_percent: default_price_band_percent(),
            order_timeout_seconds: default_order_timeout(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapitalConfig {
    /// Total capital split equally across enabled agents. None disables
    /// capital tracking.
    #[serde(default)]
    pub total: Option<f64>,
}

fn default_sqlite_path() -> String {
    "data/quorum.db".to_string()
}
fn default_decision_cache_capacity() -> u64 {
    1_000
}
fn default_api_max_calls() -> usize {
    3
}
fn default_decision_max_calls() -> usize {
    2
}
fn default_window_seconds() -> u64 {
    60
}
fn default_decision_interval() -> u64 {
    60
}
fn default_history_len() -> usize {
    8
}
fn default_poll_timeout_ms() -> u64 {
    1_000
}
fn default_drain_timeout_ms() -> u64 {
    50
}
fn default_max_drain() -> usize {
    256
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    256
}
fn default_model_timeout() -> u64 {
    60
}
fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_risk_level() -> String {
    "medium".to_string()
}
fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            name: "momentum".to_string(),
            strategy: "Trend following on 24h momentum".to_string(),
            risk_level: default_risk_level(),
            model: None,
            enabled: true,
        },
        AgentConfig {
            name: "reversion".to_string(),
            strategy: "Mean reversion inside the 24h range".to_string(),
            risk_level: "low".to_string(),
            model: None,
            enabled: true,
        },
    ]
}
fn default_consensus_window() -> u64 {
    2
}
fn default_order_cooldown() -> u64 {
    61
}
fn default_decision_timeout() -> u64 {
    5
}
fn default_max_quantity() -> f64 {
    1000.0
}
fn default_price_band_percent() -> f64 {
    10.0
}
fn default_order_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
