//! Simulation configuration
//!
//! Resolved once at load time and shared read-only by the session and every
//! bubble it spawns. A configuration that fails [`SimulationConfig::validate`]
//! never reaches a session.

use std::ops::{Range, RangeInclusive};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::types::Rarity;

/// Top-level configuration, mirroring the TOML layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub bubble: SpawnConfig,
    pub bubbles: RarityTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells per side; the grid is always square
    pub size: u32,
    /// Session seed. When absent, each session draws its own.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// Probability that a given cell starts with a bubble
    pub proba: f64,
    /// Total rarity pool. Commons get whatever dark and light leave over.
    pub pool: u32,
}

/// Per-rarity movement tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarityConfig {
    /// Weight in the population pool (ignored for commons)
    #[serde(default)]
    pub pool: u32,
    /// Tick period lower bound in milliseconds, inclusive
    pub min_speed: u64,
    /// Tick period upper bound in milliseconds, exclusive
    pub max_speed: u64,
    #[serde(default)]
    pub diagonal: bool,
}

impl RarityConfig {
    pub fn speed_range(&self) -> Range<u64> {
        self.min_speed..self.max_speed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarityTable {
    pub common: RarityConfig,
    pub light: RarityConfig,
    pub dark: RarityConfig,
}

impl RarityTable {
    pub fn get(&self, rarity: Rarity) -> &RarityConfig {
        match rarity {
            Rarity::Common => &self.common,
            Rarity::Light => &self.light,
            Rarity::Dark => &self.dark,
        }
    }

    pub fn get_mut(&mut self, rarity: Rarity) -> &mut RarityConfig {
        match rarity {
            Rarity::Common => &mut self.common,
            Rarity::Light => &mut self.light,
            Rarity::Dark => &mut self.dark,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig { size: 20, seed: None },
            bubble: SpawnConfig { proba: 0.1, pool: 100 },
            bubbles: RarityTable {
                common: RarityConfig { pool: 0, min_speed: 300, max_speed: 600, diagonal: false },
                light: RarityConfig { pool: 5, min_speed: 150, max_speed: 300, diagonal: true },
                dark: RarityConfig { pool: 5, min_speed: 200, max_speed: 400, diagonal: true },
            },
        }
    }
}

impl SimulationConfig {
    /// Load and validate a configuration from a TOML file
    pub fn load_from_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.size == 0 {
            return Err(ConfigError::Invalid("grid.size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.bubble.proba) {
            return Err(ConfigError::Invalid(format!(
                "bubble.proba must be within [0, 1], got {}",
                self.bubble.proba
            )));
        }
        if self.bubble.pool == 0 {
            return Err(ConfigError::Invalid("bubble.pool must be at least 1".into()));
        }
        let pooled: u64 = Rarity::POOLED
            .iter()
            .map(|&r| u64::from(self.bubbles.get(r).pool))
            .sum();
        if pooled > u64::from(self.bubble.pool) {
            return Err(ConfigError::Invalid(format!(
                "dark and light pools ({}) exceed bubble.pool ({})",
                pooled, self.bubble.pool
            )));
        }
        for rarity in [Rarity::Common, Rarity::Light, Rarity::Dark] {
            let conf = self.bubbles.get(rarity);
            if conf.min_speed >= conf.max_speed {
                return Err(ConfigError::Invalid(format!(
                    "bubbles.{}: min_speed ({}) must be below max_speed ({})",
                    rarity, conf.min_speed, conf.max_speed
                )));
            }
        }
        Ok(())
    }

    /// Range a rarity draw is taken from
    pub fn pool_range(&self) -> RangeInclusive<u32> {
        1..=self.bubble.pool
    }

    /// Map a pool draw onto a rarity.
    ///
    /// Walks dark then light, accumulating pool weight; the first rarity whose
    /// cumulative weight reaches the draw wins. Anything beyond is common.
    pub fn rarity_for_draw(&self, draw: u32) -> Rarity {
        let mut cumulative = 0u64;
        for rarity in Rarity::POOLED {
            cumulative += u64::from(self.bubbles.get(rarity).pool);
            if u64::from(draw) <= cumulative {
                return rarity;
            }
        }
        Rarity::Common
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[grid]
size = 12
seed = 7

[bubble]
proba = 0.25
pool = 10

[bubbles.dark]
pool = 2
min_speed = 100
max_speed = 200
diagonal = true

[bubbles.light]
pool = 3
min_speed = 50
max_speed = 80

[bubbles.common]
min_speed = 300
max_speed = 301
"#;

    #[test]
    fn test_default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_sample() {
        let config = SimulationConfig::parse_toml(SAMPLE).unwrap();
        assert_eq!(config.grid.size, 12);
        assert_eq!(config.grid.seed, Some(7));
        assert_eq!(config.bubbles.dark.pool, 2);
        assert!(config.bubbles.dark.diagonal);
        assert!(!config.bubbles.light.diagonal);
        assert_eq!(config.bubbles.common.pool, 0);
        assert_eq!(config.bubbles.common.speed_range(), 300..301);
    }

    #[test]
    fn test_missing_rarity_table_is_rejected() {
        let without_common = SAMPLE.split("[bubbles.common]").next().unwrap();
        let err = SimulationConfig::parse_toml(without_common).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rarity_draw_walks_dark_then_light() {
        let config = SimulationConfig::parse_toml(SAMPLE).unwrap();
        assert_eq!(config.rarity_for_draw(1), Rarity::Dark);
        assert_eq!(config.rarity_for_draw(2), Rarity::Dark);
        assert_eq!(config.rarity_for_draw(3), Rarity::Light);
        assert_eq!(config.rarity_for_draw(5), Rarity::Light);
        assert_eq!(config.rarity_for_draw(6), Rarity::Common);
        assert_eq!(config.rarity_for_draw(10), Rarity::Common);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SimulationConfig::default();
        config.grid.size = 0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.bubble.proba = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.bubble.proba = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.bubble.pool = 4;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.bubbles.light.max_speed = config.bubbles.light.min_speed;
        assert!(config.validate().is_err());
    }
}
