//! Engine configuration options.

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Human-readable prefix every address must carry. `None` accepts any bech32-style prefix.
    pub address_prefix: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            address_prefix: None,
        }
    }
}
