use crate::world::pathfinding::PathfinderConfig;
use crate::world::viewport::ViewportSize;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct AppConfig {
    pub scenario: PathBuf,
    pub ticks: u64,
    pub seed: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: tibia-world <scenario.yaml> [ticks]".to_string());
        }

        let scenario = Path::new(&args[1]).to_path_buf();
        let ticks = if args.len() > 2 {
            args[2]
                .parse()
                .map_err(|_| format!("invalid tick count: {}", args[2]))?
        } else {
            env_value("TIBIA_TICKS")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| format!("invalid TIBIA_TICKS: {value}"))
                })
                .transpose()?
                .unwrap_or(200)
        };
        let seed = env_value("TIBIA_SEED")
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| format!("invalid TIBIA_SEED: {value}"))
            })
            .transpose()?;
        let log_dir = env_value("TIBIA_LOG_DIR").map(PathBuf::from);
        Ok(Self {
            scenario,
            ticks,
            seed,
            log_dir,
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Monster timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonsterConfig {
    /// Minimum time between two random steps of an idle monster.
    pub random_step_interval_ms: u64,
    /// Idle leashed monsters farther than this from their spawn walk back.
    pub walk_to_spawn_radius: u32,
}

impl Default for MonsterConfig {
    fn default() -> Self {
        Self {
            random_step_interval_ms: 1000,
            walk_to_spawn_radius: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub viewport: ViewportSize,
    pub pathfinding: PathfinderConfig,
    pub chunk_cache_capacity: usize,
    pub monsters: MonsterConfig,
    pub tick_ms: u64,
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            viewport: ViewportSize::default(),
            pathfinding: PathfinderConfig::default(),
            chunk_cache_capacity: 1024,
            monsters: MonsterConfig::default(),
            tick_ms: 50,
            seed: None,
        }
    }
}

impl WorldConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".to_string()));
        }
        if self.pathfinding.max_nodes == 0 {
            return Err(ConfigError::Invalid(
                "pathfinding.max_nodes must be positive".to_string(),
            ));
        }
        if self.viewport.max_x == 0 || self.viewport.max_y == 0 {
            return Err(ConfigError::Invalid("viewport must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Errors from loading configuration or scenario files.
#[derive(Debug, Clone)]
pub enum ConfigError {
    Read(PathBuf, String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(path, msg) => {
                write!(f, "failed to read {}: {}", path.display(), msg)
            }
            ConfigError::Parse(msg) => write!(f, "parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
