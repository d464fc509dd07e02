pub mod runtime;
pub use runtime::EnvOverrides;

use crate::command::CommandSettings;
use crate::strategy::StrategyMode;
use serde::Deserialize;
use std::time::Duration;

/// Complete Floodgate configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FloodgateConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub runtime: EngineRuntimeConfig,
    #[serde(default)]
    pub expression: ExpressionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site map file, `.json` or `.toml`
    #[serde(default = "default_map_path")]
    pub map_path: String,
}

fn default_map_path() -> String {
    "site.toml".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            map_path: default_map_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub strategy: StrategyMode,
    /// Skip devices that already read the requested state
    #[serde(default = "default_skip_same_state")]
    pub skip_same_state: bool,
    /// Milliseconds per unit of a goal's `limit_time_sec`
    #[serde(default = "default_limit_time_unit_ms")]
    pub limit_time_unit_ms: u64,
}

fn default_skip_same_state() -> bool {
    true
}

fn default_limit_time_unit_ms() -> u64 {
    1000
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyMode::default(),
            skip_same_state: default_skip_same_state(),
            limit_time_unit_ms: default_limit_time_unit_ms(),
        }
    }
}

impl CommandConfig {
    pub fn settings(&self) -> CommandSettings {
        CommandSettings {
            skip_same_state: self.skip_same_state,
            limit_time_unit: Duration::from_millis(self.limit_time_unit_ms),
        }
    }
}

/// Channel sizes for the engine actor
#[derive(Debug, Clone, Deserialize)]
pub struct EngineRuntimeConfig {
    #[serde(default = "default_request_buffer")]
    pub request_buffer: usize,
    #[serde(default = "default_broadcast_capacity")]
    pub step_broadcast_capacity: usize,
    #[serde(default = "default_broadcast_capacity")]
    pub place_broadcast_capacity: usize,
}

fn default_request_buffer() -> usize {
    256
}

fn default_broadcast_capacity() -> usize {
    1000
}

impl Default for EngineRuntimeConfig {
    fn default() -> Self {
        Self {
            request_buffer: default_request_buffer(),
            step_broadcast_capacity: default_broadcast_capacity(),
            place_broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpressionConfig {
    /// Operation budget for a single goal expression evaluation
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
}

fn default_max_operations() -> u64 {
    10_000
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FloodgateConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: FloodgateConfig = toml::from_str(&contents)?;
    Ok(config)
}
