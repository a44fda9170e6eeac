/*!
Configuration of environments and evaluation runs.

[`ProtocolConfig`] describes a single environment and is validated before an
environment is built. [`Settings`] bundles an environment configuration with
evaluation parameters and can be loaded from JSON. Missing fields take their
default values:

```
use mining_mdp::{config::Settings, protocol::ProtocolKind};

let settings = Settings::from_json_str(
    r#"{ "environment": { "protocol": "eth", "alpha": 0.3 } }"#,
)
.unwrap();

assert_eq!(settings.environment.protocol, ProtocolKind::Ethereum);
assert_eq!(settings.environment.gamma, 0.5);
assert_eq!(settings.evaluation.episodes, 100);
```
*/

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{action::ActionSpace, protocol::ProtocolKind};

/// Largest accepted depth bound. Keeps state indices and chain lengths far
/// from overflow.
pub const MAX_HIDDEN_BLOCK_LIMIT: u32 = 1_000;

/// How the attacker's mining power is redrawn at every reset.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RandomProcess {
    /// Independent draws around the configured `alpha`.
    #[default]
    Iid,
    /// Random walk starting from the configured `alpha`.
    Brown,
}

/// Encoding of states handed to agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    /// Dense index into the state space.
    Index,
    /// Vector of state features.
    Features,
}

/// Parameters of a single mining environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub protocol: ProtocolKind,
    /// Attacker's share of the mining power, in `[0, 0.5)`.
    pub alpha: f64,
    /// Share of honest miners mining on the attacker's branch during a race,
    /// in `[0, 1]`.
    pub gamma: f64,
    /// Longest private or public chain tracked before an implicit adopt.
    pub max_hidden_block: u32,
    /// Probability that an honest block is stale, in `[0, 1)`.
    pub stale_rate: f64,
    /// Uncle reward and override penalty factor of the UTB defense, in
    /// `[0, 1]`.
    pub utb_ratio: f64,
    /// Whether observations include the current `alpha`.
    pub know_alpha: bool,
    /// Standard deviation of the random process on `alpha`. Zero disables it.
    pub dev: f64,
    /// Bounds of randomly drawn `alpha` values. Draws stay strictly below
    /// 0.5 even when the upper bound is 0.5.
    pub random_interval: (f64, f64),
    pub random_process: RandomProcess,
    pub action_space: ActionSpace,
    /// Observation encoding. Defaults to [`ObservationKind::Index`] for
    /// bitcoin and [`ObservationKind::Features`] otherwise.
    pub observation: Option<ObservationKind>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            protocol: ProtocolKind::default(),
            alpha: 0.35,
            gamma: 0.5,
            max_hidden_block: 20,
            stale_rate: 0.0,
            utb_ratio: 0.5,
            know_alpha: true,
            dev: 0.0,
            random_interval: (0.0, 0.5),
            random_process: RandomProcess::default(),
            action_space: ActionSpace::default(),
            observation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("alpha must lie in [0, 0.5), got {0}")]
    AlphaOutOfRange(f64),
    #[error("gamma must lie in [0, 1], got {0}")]
    GammaOutOfRange(f64),
    #[error("stale rate must lie in [0, 1), got {0}")]
    StaleRateOutOfRange(f64),
    #[error("UTB ratio must lie in [0, 1], got {0}")]
    UtbRatioOutOfRange(f64),
    #[error("max hidden block must be greater than 0")]
    ZeroMaxHiddenBlock,
    #[error(
        "max hidden block must be at most {MAX_HIDDEN_BLOCK_LIMIT}, got {0}"
    )]
    MaxHiddenBlockTooLarge(u32),
    #[error("random process deviation must be non-negative, got {0}")]
    InvalidDeviation(f64),
    #[error("random interval ({0}, {1}) is not an ordered subset of [0, 0.5]")]
    InvalidRandomInterval(f64, f64),
    #[error("unknown protocol \"{0}\"")]
    UnknownProtocol(String),
}

impl ProtocolConfig {
    pub fn new(protocol: ProtocolKind) -> Self {
        ProtocolConfig { protocol, ..Default::default() }
    }

    /// Checks that every parameter lies in its valid range. NaN values are
    /// always rejected.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        use ConfigurationError::*;

        if !(0.0..0.5).contains(&self.alpha) {
            return Err(AlphaOutOfRange(self.alpha));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(GammaOutOfRange(self.gamma));
        }
        if !(0.0..1.0).contains(&self.stale_rate) {
            return Err(StaleRateOutOfRange(self.stale_rate));
        }
        if !(0.0..=1.0).contains(&self.utb_ratio) {
            return Err(UtbRatioOutOfRange(self.utb_ratio));
        }
        if self.max_hidden_block == 0 {
            return Err(ZeroMaxHiddenBlock);
        }
        if self.max_hidden_block > MAX_HIDDEN_BLOCK_LIMIT {
            return Err(MaxHiddenBlockTooLarge(self.max_hidden_block));
        }
        if !(self.dev >= 0.0 && self.dev.is_finite()) {
            return Err(InvalidDeviation(self.dev));
        }

        let (low, high) = self.random_interval;
        if !(0.0 <= low && low <= high && high <= 0.5 && low < 0.5) {
            return Err(InvalidRandomInterval(low, high));
        }

        Ok(())
    }

    /// The configured observation encoding, or the protocol's default.
    pub fn observation_kind(&self) -> ObservationKind {
        match (self.observation, self.protocol) {
            (Some(kind), _) => kind,
            (None, ProtocolKind::Bitcoin) => ObservationKind::Index,
            (None, _) => ObservationKind::Features,
        }
    }
}

/// Parameters of a batch evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Episodes run for every parameter combination.
    pub episodes: usize,
    /// Steps per episode.
    pub max_steps: usize,
    /// Base seed; every episode derives its own seed from it.
    pub seed: u64,
    /// Attacker mining powers to sweep. Empty means the environment's alpha.
    pub alphas: Vec<f64>,
    /// Gammas to sweep. Empty means the environment's gamma.
    pub gammas: Vec<f64>,
    /// UTB ratios to sweep. Empty means the environment's ratio.
    pub utb_ratios: Vec<f64>,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        EvaluationSettings {
            episodes: 100,
            max_steps: 10_000,
            seed: 0,
            alphas: vec![],
            gammas: vec![],
            utb_ratios: vec![],
        }
    }
}

/// Complete configuration, as read from a settings file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: ProtocolConfig,
    pub evaluation: EvaluationSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("could not read settings file")]
    Io(#[from] std::io::Error),
    #[error("could not parse settings")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}

impl Settings {
    /// Parses and validates settings given as JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigLoadError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.environment.validate()?;

        Ok(settings)
    }

    /// Reads, parses and validates a JSON settings file.
    pub fn from_json_file<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, ConfigLoadError> {
        let json = fs::read_to_string(path)?;

        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ProtocolConfig::default()
            .validate()
            .expect("valid default configuration");
    }

    #[test]
    fn rejects_out_of_range() {
        use ConfigurationError::*;

        let bad = |config: ProtocolConfig| config.validate().unwrap_err();
        let base = ProtocolConfig::default();

        assert_eq!(
            bad(ProtocolConfig { alpha: 0.5, ..base.clone() }),
            AlphaOutOfRange(0.5)
        );
        assert_eq!(
            bad(ProtocolConfig { gamma: 1.5, ..base.clone() }),
            GammaOutOfRange(1.5)
        );
        assert_eq!(
            bad(ProtocolConfig { stale_rate: 1.0, ..base.clone() }),
            StaleRateOutOfRange(1.0)
        );
        assert_eq!(
            bad(ProtocolConfig { utb_ratio: -0.1, ..base.clone() }),
            UtbRatioOutOfRange(-0.1)
        );
        assert_eq!(
            bad(ProtocolConfig { max_hidden_block: 0, ..base.clone() }),
            ZeroMaxHiddenBlock
        );
        assert_eq!(
            bad(ProtocolConfig { max_hidden_block: u32::MAX, ..base.clone() }),
            MaxHiddenBlockTooLarge(u32::MAX)
        );
        assert_eq!(
            bad(ProtocolConfig { random_interval: (0.5, 0.5), ..base.clone() }),
            InvalidRandomInterval(0.5, 0.5)
        );
        assert_eq!(
            bad(ProtocolConfig { random_interval: (0.3, 0.2), ..base }),
            InvalidRandomInterval(0.3, 0.2)
        );
    }

    #[test]
    fn rejects_nan() {
        let config = ProtocolConfig { alpha: f64::NAN, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::AlphaOutOfRange(_))
        ));

        let config = ProtocolConfig { dev: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn observation_defaults() {
        let bitcoin = ProtocolConfig::new(ProtocolKind::Bitcoin);
        let utb = ProtocolConfig::new(ProtocolKind::Utb);

        assert_eq!(bitcoin.observation_kind(), ObservationKind::Index);
        assert_eq!(utb.observation_kind(), ObservationKind::Features);
    }

    #[test]
    fn load_errors() {
        assert!(matches!(
            Settings::from_json_str("{ not json"),
            Err(ConfigLoadError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_json_str(r#"{ "environment": { "gamma": 2.0 } }"#),
            Err(ConfigLoadError::Invalid(_))
        ));
        let unknown = r#"{ "environment": { "protocol": "doge" } }"#;
        assert!(matches!(
            Settings::from_json_str(unknown),
            Err(ConfigLoadError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_json_file("/nonexistent/settings.json"),
            Err(ConfigLoadError::Io(_))
        ));
    }
}
