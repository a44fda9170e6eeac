use rand::{rngs::StdRng, SeedableRng};

use crate::{
    action::ActionSpace,
    config::{
        ConfigurationError, ObservationKind, ProtocolConfig, RandomProcess,
    },
    protocol::ProtocolKind,
};

use super::MiningEnv;

/// Builds a [`MiningEnv`].
#[derive(Debug, Default, Clone)]
pub struct EnvBuilder {
    pub config: ProtocolConfig,
    pub seed: Option<u64>,
}

impl EnvBuilder {
    /// Creates a new [`EnvBuilder`] with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: ProtocolConfig) -> Self {
        EnvBuilder { config, seed: None }
    }

    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.config.protocol = protocol;

        self
    }

    /// Sets the attacker's share of the mining power (default 0.35).
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;

        self
    }

    /// Sets the share of honest miners which mine on the attacker's branch
    /// during a race (default 0.5).
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.config.gamma = gamma;

        self
    }

    /// Sets the longest chain tracked before the attacker is forced to adopt
    /// (default 20).
    pub fn max_hidden_block(mut self, max_hidden_block: u32) -> Self {
        self.config.max_hidden_block = max_hidden_block;

        self
    }

    pub fn stale_rate(mut self, stale_rate: f64) -> Self {
        self.config.stale_rate = stale_rate;

        self
    }

    pub fn utb_ratio(mut self, utb_ratio: f64) -> Self {
        self.config.utb_ratio = utb_ratio;

        self
    }

    pub fn know_alpha(mut self, know_alpha: bool) -> Self {
        self.config.know_alpha = know_alpha;

        self
    }

    /// Redraw alpha at every reset with standard deviation `dev`, keeping it
    /// within `interval`.
    pub fn random_alpha(
        mut self,
        dev: f64,
        interval: (f64, f64),
        process: RandomProcess,
    ) -> Self {
        self.config.dev = dev;
        self.config.random_interval = interval;
        self.config.random_process = process;

        self
    }

    pub fn action_space(mut self, action_space: ActionSpace) -> Self {
        self.config.action_space = action_space;

        self
    }

    pub fn observation(mut self, observation: ObservationKind) -> Self {
        self.config.observation = Some(observation);

        self
    }

    /// Seeds the environment's random number generator. Unseeded
    /// environments draw their seed from the operating system.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    /// Creates a [`MiningEnv`] from the specified parameters.
    pub fn build(self) -> Result<MiningEnv, ConfigurationError> {
        let EnvBuilder { config, seed } = self;
        config.validate()?;

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(MiningEnv::new(config, rng))
    }
}

#[cfg(test)]
mod tests {
    use crate::env::{Environment, Observation};

    use super::*;

    #[test]
    fn example_build() {
        let mut env = EnvBuilder::new()
            .protocol(ProtocolKind::Utb)
            .alpha(0.3)
            .utb_ratio(0.25)
            .observation(ObservationKind::Index)
            .seed(9)
            .build()
            .expect("valid environment build");

        let (obs, info) = env.reset(None);
        assert_eq!(obs, Observation::Index(0));
        assert_eq!(info.alpha, 0.3);
        assert_eq!(info.utb.map(|utb| utb.utb_ratio), Some(0.25));
    }

    #[test]
    fn invalid_build() {
        let result = EnvBuilder::new().gamma(-0.5).build();

        assert!(matches!(result, Err(ConfigurationError::GammaOutOfRange(_))));
    }
}
