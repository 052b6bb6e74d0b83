//! Configuration for tunnel sessions and suite agility

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunnelError};
use crate::suite::SuiteId;

const DEFAULT_MAX_ENVELOPE_SIZE: u64 = 16 * 1024 * 1024;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// What to do when the health signal selects a suite without post-quantum
/// protection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Use it silently
    Accept,
    /// Use it and log a warning
    #[default]
    Warn,
    /// Return `TunnelError::PolicyRefused`
    Refuse,
}

/// Lower-bound-inclusive health threshold for one suite
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuiteThreshold {
    pub suite: SuiteId,
    pub min_health: f64,
}

impl SuiteThreshold {
    pub const fn new(suite: SuiteId, min_health: f64) -> Self {
        Self { suite, min_health }
    }
}

/// Suite selection policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgilityPolicy {
    /// Suites in any order; the registry sorts them by descending threshold
    pub thresholds: Vec<SuiteThreshold>,
    /// Used when health is below every threshold
    pub fallback_suite: SuiteId,
    /// Margin (in health points) a signal must clear before the active
    /// suite changes
    pub hysteresis: f64,
    pub fallback_policy: FallbackPolicy,
}

impl Default for AgilityPolicy {
    fn default() -> Self {
        Self {
            thresholds: vec![
                SuiteThreshold::new(SuiteId::MlKem768Primary, 70.0),
                SuiteThreshold::new(SuiteId::MlKem1024Hardened, 40.0),
                SuiteThreshold::new(SuiteId::MlKem768MlDsa65, 20.0),
            ],
            fallback_suite: SuiteId::X25519Emergency,
            hysteresis: 0.0,
            fallback_policy: FallbackPolicy::Warn,
        }
    }
}

impl AgilityPolicy {
    pub fn validate(&self) -> Result<()> {
        for (i, entry) in self.thresholds.iter().enumerate() {
            if !(0.0..=100.0).contains(&entry.min_health) {
                return Err(TunnelError::Config(format!(
                    "threshold {} for {} must be within 0..=100",
                    entry.min_health, entry.suite
                )));
            }
            if self.thresholds[..i].iter().any(|e| e.suite == entry.suite) {
                return Err(TunnelError::Config(format!(
                    "suite {} listed more than once",
                    entry.suite
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.hysteresis) {
            return Err(TunnelError::Config(format!(
                "hysteresis {} must be within 0..=100",
                self.hysteresis
            )));
        }
        Ok(())
    }
}

/// Configuration for tunnel sessions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub agility: AgilityPolicy,

    /// Messages a session may seal before it must be re-established
    pub nonce_limit: u64,

    /// Largest encoded envelope accepted from the wire
    pub max_envelope_size: u64,

    /// Bound on establishment in the framed adapter
    pub handshake_timeout_ms: u64,

    /// Whether to log per-message detail
    pub verbose_logging: bool,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            agility: AgilityPolicy::default(),
            nonce_limit: u64::MAX,
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            verbose_logging: false,
        }
    }
}

impl TunnelConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TunnelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.agility.validate()?;
        if self.nonce_limit == 0 {
            return Err(TunnelError::Config("nonce_limit must be non-zero".into()));
        }
        if self.max_envelope_size == 0 {
            return Err(TunnelError::Config(
                "max_envelope_size must be non-zero".into(),
            ));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(TunnelError::Config(
                "handshake_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Set the handshake timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable verbose logging
    pub fn with_verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }
}

/// Builder for TunnelConfig
pub struct TunnelConfigBuilder {
    config: TunnelConfig,
}

impl Default for TunnelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: TunnelConfig::default(),
        }
    }

    /// Replace the whole threshold table
    pub fn thresholds(mut self, thresholds: Vec<SuiteThreshold>) -> Self {
        self.config.agility.thresholds = thresholds;
        self
    }

    /// Set (or add) the threshold for one suite
    pub fn threshold(mut self, suite: SuiteId, min_health: f64) -> Self {
        let thresholds = &mut self.config.agility.thresholds;
        match thresholds.iter_mut().find(|t| t.suite == suite) {
            Some(entry) => entry.min_health = min_health,
            None => thresholds.push(SuiteThreshold::new(suite, min_health)),
        }
        self
    }

    pub fn fallback_suite(mut self, suite: SuiteId) -> Self {
        self.config.agility.fallback_suite = suite;
        self
    }

    pub fn hysteresis(mut self, margin: f64) -> Self {
        self.config.agility.hysteresis = margin;
        self
    }

    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.config.agility.fallback_policy = policy;
        self
    }

    pub fn nonce_limit(mut self, limit: u64) -> Self {
        self.config.nonce_limit = limit;
        self
    }

    /// Set maximum encoded envelope size
    pub fn max_envelope_size(mut self, size: u64) -> Self {
        self.config.max_envelope_size = size;
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Enable verbose logging
    pub fn verbose(mut self) -> Self {
        self.config.verbose_logging = true;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<TunnelConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
