//! Engine configuration.
//!
//! One TOML file (`engine.toml`) with a section per subsystem. Every
//! section defaults sensibly so tests and first runs need no file at all.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{DEFAULT_PORT, MAX_CONNECTIONS_PER_IP, MAX_TOTAL_CONNECTIONS};
use crate::types::EngineId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub economy: EconomyConfig,
    pub combat: CombatConfig,
    pub scheduler: SchedulerConfig,
    pub progression: ProgressionConfig,
    /// Known engine instances for phasing and zone routing. Empty means
    /// this engine hosts every zone.
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub motd: String,
    pub engine_id: EngineId,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    /// World TOML file; the built-in demo world when unset.
    pub world_file: Option<String>,
    pub welcome_mail_sender: String,
    pub welcome_mail_text: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            motd: "Welcome to Thornvale.".to_string(),
            engine_id: "main".to_string(),
            max_connections: MAX_TOTAL_CONNECTIONS,
            max_connections_per_ip: MAX_CONNECTIONS_PER_IP,
            world_file: None,
            welcome_mail_sender: "The Wardens".to_string(),
            welcome_mail_text: "Welcome to Thornvale. Type 'help' to get your bearings."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub buy_multiplier: f64,
    pub sell_multiplier: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            buy_multiplier: 1.0,
            sell_multiplier: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub min_damage: i32,
    pub max_damage: i32,
    pub swing_interval_ms: u64,
    pub mob_swing_interval_ms: u64,
    pub flee_chance: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            min_damage: 1,
            max_damage: 4,
            swing_interval_ms: 2_000,
            mob_swing_interval_ms: 2_000,
            flee_chance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_actions_per_tick: usize,
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_actions_per_tick: 128,
            tick_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    pub max_level: u32,
    /// XP needed to advance from level n to n+1 is `xp_step * n`.
    pub xp_step: u64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            max_level: 50,
            xp_step: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    pub engine_id: EngineId,
    pub address: String,
    #[serde(default)]
    pub zones: Vec<String>,
}

impl EngineConfig {
    /// Load `engine.toml` from a config directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
        let path = dir.as_ref().join("engine.toml");
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.combat.min_damage > self.combat.max_damage {
            return Err(ConfigError::Invalid(format!(
                "combat.min_damage {} exceeds max_damage {}",
                self.combat.min_damage, self.combat.max_damage
            )));
        }
        if !(0.0..=1.0).contains(&self.combat.flee_chance) {
            return Err(ConfigError::Invalid(
                "combat.flee_chance must be within [0, 1]".to_string(),
            ));
        }
        if self.scheduler.max_actions_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_actions_per_tick must be positive".to_string(),
            ));
        }
        if self.progression.max_level == 0 {
            return Err(ConfigError::Invalid(
                "progression.max_level must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The engine that hosts `zone`, per the instance table. `None` when no
    /// instance claims it (treated as local).
    pub fn engine_for_zone(&self, zone: &str) -> Option<&EngineId> {
        self.instances
            .iter()
            .find(|i| i.zones.iter().any(|z| z == zone))
            .map(|i| &i.engine_id)
    }
}
