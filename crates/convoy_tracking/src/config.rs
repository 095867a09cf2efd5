use std::{path::Path, time::Duration};

use convoy_routing::{
    kmh::Kmh,
    resolver::{DEFAULT_FALLBACK_SPEED_KMH, RouteResolver},
    retry::RetryPolicy,
    route_provider::{ProviderSetupError, RouteProvider},
};
use jiff::SignedDuration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    camera::CameraConfig,
    checkpoint::{Checkpoint, default_checkpoints},
    eta::DEFAULT_STEADY_THRESHOLD,
    eta_refresher::DEFAULT_REFRESH_INTERVAL,
    progress_clock::TimingMode,
    render::StaticImageConfig,
    session::SessionOptions,
    session_cache::DEFAULT_FRESHNESS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Provider(#[from] ProviderSetupError),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: SignedDuration,
    pub backoff_multiplier: f64,
    pub max_backoff: SignedDuration,
    pub attempt_timeout: SignedDuration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff: to_signed(policy.initial_backoff),
            backoff_multiplier: policy.backoff_multiplier,
            max_backoff: to_signed(policy.max_backoff),
            attempt_timeout: to_signed(policy.attempt_timeout),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: self.initial_backoff.unsigned_abs(),
            backoff_multiplier: self.backoff_multiplier,
            max_backoff: self.max_backoff.unsigned_abs(),
            attempt_timeout: self.attempt_timeout.unsigned_abs(),
        }
    }
}

fn to_signed(duration: Duration) -> SignedDuration {
    SignedDuration::try_from(duration).unwrap_or(SignedDuration::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EtaConfig {
    pub refresh_interval: SignedDuration,
    /// Changes smaller than this are reported as steady.
    pub steady_threshold: SignedDuration,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            steady_threshold: DEFAULT_STEADY_THRESHOLD,
        }
    }
}

/// Tracker settings, every field optional in the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TrackerConfig {
    pub provider: RouteProvider,
    pub timing: TimingMode,
    pub checkpoints: Vec<Checkpoint>,
    pub camera: CameraConfig,
    pub static_image: StaticImageConfig,
    pub eta: EtaConfig,
    pub retry: RetryConfig,
    /// Assumed average speed of a degraded straight-line route.
    pub fallback_speed_kmh: f64,
    /// Interval between frames when driven headless.
    pub frame_interval: SignedDuration,
    /// How long a cached session stays resumable.
    pub cache_freshness: SignedDuration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            provider: RouteProvider::default(),
            timing: TimingMode::default(),
            checkpoints: default_checkpoints(),
            camera: CameraConfig::default(),
            static_image: StaticImageConfig::default(),
            eta: EtaConfig::default(),
            retry: RetryConfig::default(),
            fallback_speed_kmh: DEFAULT_FALLBACK_SPEED_KMH,
            frame_interval: SignedDuration::from_millis(100),
            cache_freshness: DEFAULT_FRESHNESS,
        }
    }
}

impl TrackerConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config: TrackerConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(String::from(
                "retry.max_attempts must be at least 1",
            )));
        }

        if self.fallback_speed_kmh <= 0.0 || !self.fallback_speed_kmh.is_finite() {
            return Err(ConfigError::Invalid(String::from(
                "fallback_speed_kmh must be positive",
            )));
        }

        if self.frame_interval <= SignedDuration::ZERO {
            return Err(ConfigError::Invalid(String::from(
                "frame_interval must be positive",
            )));
        }

        if let Some(checkpoint) = self.checkpoints.iter().find(|c| c.percent > 100) {
            return Err(ConfigError::Invalid(format!(
                "checkpoint {}% is above 100%",
                checkpoint.percent
            )));
        }

        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            timing: self.timing,
            checkpoints: self.checkpoints.clone(),
            camera: self.camera,
            steady_threshold: self.eta.steady_threshold,
            refresh_interval: self.eta.refresh_interval,
        }
    }

    pub fn resolver(&self) -> Result<RouteResolver, ConfigError> {
        let provider = self.provider.build()?;

        Ok(RouteResolver::new(provider)
            .with_retry_policy(self.retry.policy())
            .with_fallback_speed(Kmh::new(self.fallback_speed_kmh)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TrackerConfig::from_json("{}").unwrap();

        assert_eq!(config.checkpoints.len(), 5);
        assert_eq!(config.fallback_speed_kmh, 60.0);
        assert_eq!(config.eta.refresh_interval, SignedDuration::from_secs(60));
        assert_eq!(config.camera.idle_timeout, SignedDuration::from_secs(5));
        assert_eq!(config.retry.policy().max_attempts, 3);
        assert_eq!(config.timing, TimingMode::RealTime);
    }

    #[test]
    fn test_partial_config() {
        let config = TrackerConfig::from_json(
            r#"{
                "provider": { "type": "as_the_crow_flies", "speed_kmh": 80.0 },
                "timing": { "mode": "accelerated", "playback": "PT90S" },
                "eta": { "refresh_interval": "PT30S" },
                "retry": { "max_attempts": 5 }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.timing,
            TimingMode::Accelerated {
                playback: SignedDuration::from_secs(90)
            }
        );
        assert_eq!(config.eta.refresh_interval, SignedDuration::from_secs(30));
        assert_eq!(config.eta.steady_threshold, SignedDuration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.attempt_timeout, SignedDuration::from_secs(10));
        assert!(config.resolver().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            TrackerConfig::from_json(r#"{ "retry": { "max_attempts": 0 } }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_json(r#"{ "fallback_speed_kmh": -1.0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_json(r#"{ "checkpoints": [{ "percent": 120, "label": "x" }] }"#),
            Err(ConfigError::Invalid(_))
        ));
    }
}
