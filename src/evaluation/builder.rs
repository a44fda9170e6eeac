use crate::{
    config::{ConfigurationError, ProtocolConfig, Settings},
    policy::Policy,
    protocol::ProtocolKind,
};

use super::{Evaluation, ParameterPoint};

/// Builds an [Evaluation].
#[derive(Debug, Default)]
pub struct EvaluationBuilder {
    pub config: ProtocolConfig,
    pub episodes: Option<usize>,
    pub max_steps: Option<usize>,
    pub seed: Option<u64>,
    pub alphas: Vec<f64>,
    pub gammas: Vec<f64>,
    pub utb_ratios: Vec<f64>,
    policy: Option<Box<dyn Policy>>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationBuildError {
    #[error("no policy was given")]
    NoPolicyGiven,
    #[error("number of episodes must be greater than 0")]
    ZeroEpisodes,
    #[error("number of steps per episode must be greater than 0")]
    ZeroSteps,
    #[error(transparent)]
    ConfigurationError(#[from] ConfigurationError),
}

impl EvaluationBuilder {
    /// Creates a new [EvaluationBuilder].
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the environment and evaluation parameters of `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let eval = &settings.evaluation;

        EvaluationBuilder {
            config: settings.environment.clone(),
            episodes: Some(eval.episodes),
            max_steps: Some(eval.max_steps),
            seed: Some(eval.seed),
            alphas: eval.alphas.clone(),
            gammas: eval.gammas.clone(),
            utb_ratios: eval.utb_ratios.clone(),
            policy: None,
        }
    }

    /// Sets the environment configuration. Swept parameters override the
    /// corresponding fields.
    pub fn config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;

        self
    }

    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.config.protocol = protocol;

        self
    }

    /// Sets the attacker's strategy.
    pub fn policy<P: Policy + 'static>(mut self, policy: P) -> Self {
        self.policy = Some(Box::new(policy));

        self
    }

    /// Evaluate at each of the given attacker mining powers.
    pub fn alphas<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        self.alphas.extend(values);

        self
    }

    /// Evaluate at each of the given gammas.
    pub fn gammas<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        self.gammas.extend(values);

        self
    }

    /// Evaluate at each of the given UTB ratios. Ignored unless the
    /// protocol is UTB.
    pub fn utb_ratios<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        self.utb_ratios.extend(values);

        self
    }

    /// Sets the number of episodes per parameter combination (default 1).
    pub fn episodes(mut self, episodes: usize) -> Self {
        self.episodes = Some(episodes);

        self
    }

    /// Sets the number of steps per episode (default 1000).
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);

        self
    }

    /// Sets the base seed (default 0).
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    /// Creates an [Evaluation] from the specified parameters.
    pub fn build(self) -> Result<Evaluation, EvaluationBuildError> {
        use EvaluationBuildError::*;

        let EvaluationBuilder {
            config,
            episodes,
            max_steps,
            seed,
            alphas,
            gammas,
            utb_ratios,
            policy,
        } = self;

        let policy = policy.ok_or(NoPolicyGiven)?;
        let episodes = match episodes {
            Some(0) => return Err(ZeroEpisodes),
            Some(x) => x,
            None => 1,
        };
        let max_steps = match max_steps {
            Some(0) => return Err(ZeroSteps),
            Some(x) => x,
            None => 1000,
        };

        let or_default = |values: Vec<f64>, default: f64| {
            if values.is_empty() {
                vec![default]
            } else {
                values
            }
        };
        let alphas = or_default(alphas, config.alpha);
        let gammas = or_default(gammas, config.gamma);
        let utb_ratios = match config.protocol {
            ProtocolKind::Utb => or_default(utb_ratios, config.utb_ratio),
            _ => vec![config.utb_ratio],
        };

        let mut points = Vec::new();
        for &alpha in &alphas {
            for &gamma in &gammas {
                for &utb_ratio in &utb_ratios {
                    let point = ParameterPoint { alpha, gamma, utb_ratio };
                    ProtocolConfig {
                        alpha,
                        gamma,
                        utb_ratio,
                        ..config.clone()
                    }
                    .validate()?;
                    points.push(point);
                }
            }
        }

        Ok(Evaluation {
            config,
            policy,
            points,
            episodes,
            max_steps,
            seed: seed.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::policy::Honest;

    use super::*;

    #[test]
    fn build_errors() {
        use EvaluationBuildError::*;

        assert_eq!(
            EvaluationBuilder::new().build().unwrap_err(),
            NoPolicyGiven
        );
        assert_eq!(
            EvaluationBuilder::new()
                .policy(Honest::new())
                .episodes(0)
                .build()
                .unwrap_err(),
            ZeroEpisodes
        );
        assert_eq!(
            EvaluationBuilder::new()
                .policy(Honest::new())
                .max_steps(0)
                .build()
                .unwrap_err(),
            ZeroSteps
        );
        assert_eq!(
            EvaluationBuilder::new()
                .policy(Honest::new())
                .alphas([0.2, 0.6])
                .build()
                .unwrap_err(),
            ConfigurationError(
                crate::config::ConfigurationError::AlphaOutOfRange(0.6)
            )
        );
    }

    #[test]
    fn parameter_grid() {
        let evaluation = EvaluationBuilder::new()
            .protocol(ProtocolKind::Utb)
            .policy(Honest::new())
            .alphas([0.1, 0.2])
            .gammas([0.0, 0.5, 1.0])
            .utb_ratios([0.25, 0.75])
            .build()
            .unwrap();

        assert_eq!(evaluation.points().len(), 12);
        assert_eq!(
            evaluation.points()[1],
            ParameterPoint { alpha: 0.1, gamma: 0.0, utb_ratio: 0.75 }
        );
    }

    #[test]
    fn ratios_ignored_outside_utb() {
        let evaluation = EvaluationBuilder::new()
            .protocol(ProtocolKind::Ghost)
            .policy(Honest::new())
            .utb_ratios([0.25, 0.75])
            .build()
            .unwrap();

        assert_eq!(evaluation.points().len(), 1);
    }

    #[test]
    fn settings_sweep() {
        let settings = Settings::from_json_str(
            r#"{
                "environment": { "protocol": "utb" },
                "evaluation": { "episodes": 2, "utb_ratios": [0.0, 1.0] }
            }"#,
        )
        .unwrap();
        let evaluation = EvaluationBuilder::from_settings(&settings)
            .policy(Honest::new())
            .build()
            .unwrap();

        assert_eq!(evaluation.points().len(), 2);
        assert_eq!(evaluation.episodes, 2);
        assert_eq!(evaluation.max_steps, 10_000);
    }
}
