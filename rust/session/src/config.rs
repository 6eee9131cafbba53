use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const ENV_ROOM_CODE_DIGITS: &str = "DEHLA_ROOM_CODE_DIGITS";
pub const ENV_MAX_ROOMS: &str = "DEHLA_MAX_ROOMS";
pub const ENV_SEED: &str = "DEHLA_SEED";
pub const ENV_HAND_LOG: &str = "DEHLA_HAND_LOG";

/// Registry tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Length of generated room codes (1-9)
    pub room_code_digits: u32,
    /// Live rooms allowed at once
    pub max_rooms: usize,
    /// Base seed for deterministic shuffles; room `n` uses `seed + n`
    pub seed: Option<u64>,
    /// JSONL file that finished hands are appended to
    pub hand_log_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            room_code_digits: 4,
            max_rooms: 9000,
            seed: None,
            hand_log_path: None,
        }
    }
}

impl RegistryConfig {
    /// Number of distinct codes: no leading zero, so `9 * 10^(digits-1)`.
    pub fn code_space(&self) -> u64 {
        9 * 10u64.pow(self.room_code_digits.saturating_sub(1))
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=9).contains(&self.room_code_digits) {
            return Err(ConfigError::InvalidValue(
                "room_code_digits must be between 1 and 9".to_string(),
            ));
        }

        if self.max_rooms == 0 {
            return Err(ConfigError::InvalidValue(
                "max_rooms must be greater than 0".to_string(),
            ));
        }

        if self.max_rooms as u64 > self.code_space() {
            return Err(ConfigError::InvalidValue(format!(
                "max_rooms {} exceeds the {} available {}-digit codes",
                self.max_rooms,
                self.code_space(),
                self.room_code_digits
            )));
        }

        Ok(())
    }

    /// Defaults overridden by `DEHLA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ROOM_CODE_DIGITS) {
            config.room_code_digits = parse_var(ENV_ROOM_CODE_DIGITS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_ROOMS) {
            config.max_rooms = parse_var(ENV_MAX_ROOMS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SEED) {
            config.seed = Some(parse_var(ENV_SEED, &raw)?);
        }
        if let Some(raw) = lookup(ENV_HAND_LOG) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                config.hand_log_path = Some(PathBuf::from(trimmed));
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw.to_string(),
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Environment variable {key} has invalid value {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}
