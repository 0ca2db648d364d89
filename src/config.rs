//! Application-level configuration loading: gameplay timings and lobby limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::DurationMilliSeconds;
use tracing::{info, warn};

/// Default location on disk where the daemon looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TUNE_LOBBY_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Answer window of one question, also the scoring reference time.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub question_time: Duration,
    /// Length of the clip played from the chosen start offset.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub clip_length: Duration,
    /// Pause between everyone answering and the host moving on.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub reveal_delay: Duration,
    /// Extra time the host grants after its own countdown before timing out silent members.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub straggler_grace: Duration,
    /// Whether the host advances on its own once everyone answered.
    pub auto_advance: bool,
    /// Membership cap written into new lobbies.
    pub max_players: usize,
    /// Minimum number of playable tracks a playlist must offer.
    pub min_playable_tracks: usize,
    /// Number of options offered per question, correct one included.
    pub option_count: usize,
    /// Capacity of the SSE broadcast channel.
    pub sse_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        question_time_ms = config.question_time.as_millis() as u64,
                        max_players = config.max_players,
                        "loaded gameplay config"
                    );
                    config.sanitized()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Answer window in milliseconds.
    pub fn question_time_ms(&self) -> u64 {
        self.question_time.as_millis() as u64
    }

    /// Clip length in milliseconds.
    pub fn clip_length_ms(&self) -> u64 {
        self.clip_length.as_millis() as u64
    }

    /// Replace values that would make the game unplayable with their defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.question_time.is_zero() {
            warn!("questionTime must be positive; using default");
            self.question_time = defaults.question_time;
        }
        if self.option_count < 2 {
            warn!(
                option_count = self.option_count,
                "optionCount below 2; using default"
            );
            self.option_count = defaults.option_count;
        }
        if self.max_players < 2 {
            warn!(
                max_players = self.max_players,
                "maxPlayers below 2; using default"
            );
            self.max_players = defaults.max_players;
        }
        if self.sse_capacity == 0 {
            self.sse_capacity = defaults.sse_capacity;
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            question_time: Duration::from_secs(30),
            clip_length: Duration::from_secs(30),
            reveal_delay: Duration::from_secs(3),
            straggler_grace: Duration::from_secs(5),
            auto_advance: true,
            max_players: 8,
            min_playable_tracks: 4,
            option_count: 4,
            sse_capacity: 64,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"questionTime": 15000, "autoAdvance": false}"#).unwrap();
        assert_eq!(config.question_time, Duration::from_secs(15));
        assert!(!config.auto_advance);
        assert_eq!(config.clip_length, Duration::from_secs(30));
        assert_eq!(config.option_count, 4);
    }

    #[test]
    fn sanitizing_restores_unplayable_values() {
        let config = AppConfig {
            question_time: Duration::ZERO,
            option_count: 1,
            ..AppConfig::default()
        }
        .sanitized();
        assert_eq!(config.question_time, Duration::from_secs(30));
        assert_eq!(config.option_count, 4);
    }
}
