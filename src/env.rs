/*!
Reinforcement learning environments for the selfish mining game.

[`MiningEnv`] follows the usual `reset`/`step` contract of the
[`Environment`] trait. Episodes never terminate on their own; wrap an
environment in [`TimeLimit`] to truncate them.

# Examples

```
use mining_mdp::env::{make_env, Environment};
use mining_mdp::config::ProtocolConfig;

let mut env = make_env("bitcoin", ProtocolConfig::default()).unwrap();
let (_obs, info) = env.reset(Some(42));
assert_eq!(info.steps, 0);

// override, which is illegal at the start and treated as waiting
let step = env.step(1);
assert!(step.info.illegal_action);
assert!(!step.terminated);
```
*/

pub mod builder;

pub use builder::EnvBuilder;

use log::{debug, warn};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    SeedableRng,
};
use serde::Serialize;

use crate::{
    action::{Action, ActionSpace},
    config::{
        ConfigurationError, ObservationKind, ProtocolConfig, RandomProcess,
    },
    protocol::{Protocol, ProtocolKind},
    reward::{Reward, RewardTracker},
    state::{State, StateSpace},
    transition::TransitionModel,
    utils,
};

/// Largest alpha drawn by a random process.
const ALPHA_CEILING: f64 = 0.5 - f64::EPSILON;

/// Outcome of a single call to [`Environment::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step<O, I> {
    pub observation: O,
    pub reward: f64,
    /// Whether the episode reached a terminal state.
    pub terminated: bool,
    /// Whether the episode was cut short from outside, e.g. by a time limit.
    pub truncated: bool,
    pub info: I,
}

/// An episodic environment driven by an agent.
pub trait Environment {
    type Action;
    type Observation;
    type Info;

    /// Starts a new episode. Passing a seed makes the episode reproducible.
    fn reset(&mut self, seed: Option<u64>) -> (Self::Observation, Self::Info);

    /// Applies `action` and advances the environment by one step.
    fn step(
        &mut self,
        action: Self::Action,
    ) -> Step<Self::Observation, Self::Info>;
}

/// State as seen by an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Observation {
    /// Index of the state in the environment's [`StateSpace`].
    Index(usize),
    /// Feature vector, see [`StateSpace::features`].
    Features(Vec<f32>),
}

/// Set of possible observations.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationSpace {
    Discrete(usize),
    Box { low: Vec<f32>, high: Vec<f32> },
}

/// Statistics of the UTB defense during the current episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtbInfo {
    pub utb_ratio: f64,
    /// Attacker reward of the last step before the override penalty.
    pub base_reward: f64,
    /// Attacker reward of the last step after the override penalty.
    pub adjusted_reward: f64,
    pub total_penalty: f64,
    pub attacker_uncles: u64,
    pub honest_uncles: u64,
    /// How far the attacker's reward fraction lies below its fair share.
    pub defense_effectiveness: f64,
}

/// Diagnostics returned with every observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    pub steps: u64,
    /// Sum of the rewards returned during the episode.
    pub episode_reward: f64,
    /// Attacker's share of all reward so far, `0.0` before any reward.
    pub reward_fraction: f64,
    pub attacker_blocks: u64,
    pub honest_blocks: u64,
    pub attacker_reward: f64,
    pub honest_reward: f64,
    pub alpha: f64,
    pub gamma: f64,
    pub protocol: ProtocolKind,
    pub state: State,
    /// Action applied in the last step, `None` after a reset.
    pub action: Option<Action>,
    /// Whether the requested action was illegal and replaced by waiting.
    pub illegal_action: bool,
    pub utb: Option<UtbInfo>,
}

/// Selfish mining environment for a single protocol.
///
/// Actions are indices into the configured [`ActionSpace`]. The reward of a
/// step is the attacker's reward of the resulting transition; the quantity
/// of interest over an episode is `reward_fraction` in [`StepInfo`].
#[derive(Debug, Clone)]
pub struct MiningEnv {
    config: ProtocolConfig,
    rules: Box<dyn Protocol>,
    space: StateSpace,
    rng: StdRng,
    alpha: f64,
    state: State,
    tracker: RewardTracker,
    steps: u64,
    episode_reward: f64,
}

/// Creates an environment for the protocol called `name` (`bitcoin`,
/// `ghost`, `ethereum` or `eth`, `utb`), overriding `config.protocol`.
pub fn make_env(
    name: &str,
    config: ProtocolConfig,
) -> Result<MiningEnv, ConfigurationError> {
    let protocol = name.parse()?;

    EnvBuilder::from_config(ProtocolConfig { protocol, ..config }).build()
}

impl MiningEnv {
    pub fn builder() -> EnvBuilder {
        EnvBuilder::new()
    }

    /// Callers must validate `config` first.
    pub(crate) fn new(config: ProtocolConfig, rng: StdRng) -> Self {
        let rules = Self::rules_for(&config, config.alpha);
        let space = rules.state_space();
        debug!(
            "created {} environment with {} states",
            config.protocol,
            space.len()
        );

        MiningEnv {
            alpha: config.alpha,
            config,
            rules,
            space,
            rng,
            state: space.initial(),
            tracker: RewardTracker::new(),
            steps: 0,
            episode_reward: 0.0,
        }
    }

    fn rules_for(config: &ProtocolConfig, alpha: f64) -> Box<dyn Protocol> {
        let model = TransitionModel::new(
            alpha,
            config.gamma,
            config.stale_rate,
            config.max_hidden_block,
            0,
        );

        config.protocol.rules(model, config.utb_ratio)
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn rules(&self) -> &dyn Protocol {
        self.rules.as_ref()
    }

    pub fn state_space(&self) -> &StateSpace {
        &self.space
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Attacker's mining power in the current episode.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn tracker(&self) -> &RewardTracker {
        &self.tracker
    }

    pub fn action_space(&self) -> ActionSpace {
        self.config.action_space
    }

    pub fn legal_actions(&self) -> Vec<Action> {
        self.rules.legal_actions(&self.state)
    }

    pub fn observation_space(&self) -> ObservationSpace {
        match self.config.observation_kind() {
            ObservationKind::Index => {
                ObservationSpace::Discrete(self.space.len())
            }
            ObservationKind::Features => {
                let (low, high) =
                    self.space.feature_bounds(self.config.know_alpha);
                ObservationSpace::Box { low, high }
            }
        }
    }

    /// Encodes the current state.
    pub fn observe(&self) -> Observation {
        match self.config.observation_kind() {
            ObservationKind::Index => {
                // transitions keep the state inside the space
                Observation::Index(self.space.index_of_unchecked(&self.state))
            }
            ObservationKind::Features => {
                let alpha = self.config.know_alpha.then_some(self.alpha);
                Observation::Features(self.space.features(&self.state, alpha))
            }
        }
    }

    /// Applies `action` directly, bypassing the action space.
    pub fn step_action(
        &mut self,
        action: Action,
    ) -> Step<Observation, StepInfo> {
        self.apply(action, false)
    }

    fn apply(
        &mut self,
        action: Action,
        out_of_range: bool,
    ) -> Step<Observation, StepInfo> {
        let mut outcomes = self.rules.transitions(&self.state, action);
        let weights = outcomes.iter().map(|t| t.probability);
        let chosen = match WeightedIndex::new(weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(e) => {
                warn!("could not sample outcome in {}: {}", self.state, e);
                0
            }
        };
        let outcome = outcomes.swap_remove(chosen);

        let reward = self.rules.reward(&outcome.events);
        self.tracker.record(&outcome.events, &reward);
        self.state = outcome.next;
        self.steps += 1;
        self.episode_reward += reward.attacker;

        let illegal = out_of_range || outcome.events.illegal;
        let info = self.info(Some(outcome.events.action), illegal, &reward);

        Step {
            observation: self.observe(),
            reward: reward.attacker,
            terminated: false,
            truncated: false,
            info,
        }
    }

    fn info(
        &self,
        action: Option<Action>,
        illegal_action: bool,
        last: &Reward,
    ) -> StepInfo {
        let tracker = &self.tracker;
        let reward_fraction = tracker.reward_fraction().unwrap_or(0.0);
        let utb = match self.config.protocol {
            ProtocolKind::Utb => Some(UtbInfo {
                utb_ratio: self.config.utb_ratio,
                base_reward: last.base_attacker,
                adjusted_reward: last.attacker,
                total_penalty: tracker.penalty,
                attacker_uncles: tracker.attacker_uncles,
                honest_uncles: tracker.honest_uncles,
                defense_effectiveness: self.alpha - reward_fraction,
            }),
            _ => None,
        };

        StepInfo {
            steps: self.steps,
            episode_reward: self.episode_reward,
            reward_fraction,
            attacker_blocks: tracker.attacker_blocks,
            honest_blocks: tracker.honest_blocks,
            attacker_reward: tracker.attacker_reward,
            honest_reward: tracker.honest_reward,
            alpha: self.alpha,
            gamma: self.config.gamma,
            protocol: self.config.protocol,
            state: self.state,
            action,
            illegal_action,
            utb,
        }
    }

    /// Draws the attacker's mining power for a new episode. The brownian
    /// walk continues from the last episode's alpha unless `restart` is set,
    /// in which case it starts over from the configured alpha.
    fn draw_alpha(&mut self, restart: bool) -> f64 {
        let config = &self.config;
        if config.dev <= 0.0 {
            return config.alpha;
        }

        let center = match config.random_process {
            RandomProcess::Iid => config.alpha,
            RandomProcess::Brown if restart => config.alpha,
            RandomProcess::Brown => self.alpha,
        };
        let (low, high) = config.random_interval;
        let high = high.min(ALPHA_CEILING);
        let noise = config.dev * utils::standard_normal(&mut self.rng);

        (center + noise).clamp(low.min(high), high)
    }
}

impl Environment for MiningEnv {
    type Action = usize;
    type Observation = Observation;
    type Info = StepInfo;

    fn reset(&mut self, seed: Option<u64>) -> (Observation, StepInfo) {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        // a seeded reset replays the episode from scratch
        let alpha = self.draw_alpha(seed.is_some());
        if alpha != self.alpha {
            self.rules = Self::rules_for(&self.config, alpha);
            self.alpha = alpha;
        }
        debug!("reset {} environment, alpha {}", self.config.protocol, alpha);

        self.state = self.space.initial();
        self.tracker = RewardTracker::new();
        self.steps = 0;
        self.episode_reward = 0.0;

        (self.observe(), self.info(None, false, &Reward::default()))
    }

    /// Takes the action with index `action` in the configured
    /// [`ActionSpace`]. Illegal or out-of-range actions are treated as
    /// [`Action::Wait`] and flagged in the returned info.
    fn step(&mut self, action: usize) -> Step<Observation, StepInfo> {
        match self.config.action_space.decode(action, &self.state) {
            Some(action) => self.apply(action, false),
            None => self.apply(Action::Wait, true),
        }
    }
}

/// Truncates the episodes of an environment after a fixed number of steps.
#[derive(Debug, Clone)]
pub struct TimeLimit<E> {
    env: E,
    max_steps: usize,
    elapsed: usize,
}

impl<E> TimeLimit<E> {
    pub fn new(env: E, max_steps: usize) -> Self {
        TimeLimit { env, max_steps, elapsed: 0 }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn into_inner(self) -> E {
        self.env
    }
}

impl<E: Environment> Environment for TimeLimit<E> {
    type Action = E::Action;
    type Observation = E::Observation;
    type Info = E::Info;

    fn reset(&mut self, seed: Option<u64>) -> (E::Observation, E::Info) {
        self.elapsed = 0;
        self.env.reset(seed)
    }

    fn step(&mut self, action: E::Action) -> Step<E::Observation, E::Info> {
        let mut step = self.env.step(action);
        self.elapsed += 1;
        step.truncated |= self.elapsed >= self.max_steps;

        step
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn trace(env: &mut MiningEnv, seed: u64) -> Vec<(Observation, f64)> {
        env.reset(Some(seed));
        (0..500)
            .map(|i| {
                let step = env.step(i % 3);
                (step.observation, step.reward)
            })
            .collect()
    }

    #[test]
    fn seeded_episodes_repeat() {
        for name in ["bitcoin", "ghost", "eth", "utb"] {
            let config =
                ProtocolConfig { stale_rate: 0.05, ..Default::default() };
            let mut env = make_env(name, config).unwrap();

            assert_eq!(trace(&mut env, 42), trace(&mut env, 42));
        }
    }

    #[test]
    fn seeded_brownian_episodes_repeat() {
        for process in [RandomProcess::Iid, RandomProcess::Brown] {
            let config = ProtocolConfig {
                dev: 0.05,
                random_interval: (0.1, 0.45),
                random_process: process,
                ..Default::default()
            };
            let mut env = make_env("bitcoin", config).unwrap();

            let (_, first) = env.reset(Some(42));
            let first_trace = trace(&mut env, 42);
            env.reset(None);
            env.reset(None);
            let (_, second) = env.reset(Some(42));
            let second_trace = trace(&mut env, 42);

            assert_eq!(first.alpha, second.alpha);
            assert_eq!(first_trace, second_trace);
        }
    }

    #[test]
    fn unseeded_brownian_resets_drift() {
        let config = ProtocolConfig {
            dev: 0.05,
            random_interval: (0.1, 0.45),
            random_process: RandomProcess::Brown,
            ..Default::default()
        };
        let mut env = make_env("bitcoin", config).unwrap();
        env.reset(Some(7));

        let alphas: Vec<_> = (0..20).map(|_| env.reset(None).1.alpha).collect();
        assert!(alphas.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn unknown_protocol() {
        assert!(matches!(
            make_env("dogecoin", ProtocolConfig::default()),
            Err(ConfigurationError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn observation_encodings() {
        let mut bitcoin = make_env("bitcoin", Default::default()).unwrap();
        let (obs, _) = bitcoin.reset(Some(0));
        assert_eq!(obs, Observation::Index(0));
        assert_eq!(
            bitcoin.observation_space(),
            ObservationSpace::Discrete(21 * 21 * 3)
        );

        let mut ghost = make_env("ghost", Default::default()).unwrap();
        let (obs, _) = ghost.reset(Some(0));
        let Observation::Features(features) = obs else {
            panic!("expected feature observation");
        };
        assert_eq!(features.len(), 3 + 1 + 6);
        assert!((features[3] - 0.35).abs() < 1e-6);
    }

    #[test]
    fn state_stays_bounded() {
        let config = ProtocolConfig {
            max_hidden_block: 3,
            alpha: 0.45,
            ..Default::default()
        };
        let mut env = make_env("bitcoin", config).unwrap();
        env.reset(Some(1));

        for _ in 0..2_000 {
            let step = env.step_action(Action::Wait);
            assert!(step.info.state.attacker <= 3);
            assert!(step.info.state.honest <= 3);
        }
    }

    #[test]
    fn out_of_range_action_waits() {
        let mut env = make_env("bitcoin", Default::default()).unwrap();
        env.reset(Some(3));

        let step = env.step(7);
        assert!(step.info.illegal_action);
        assert_eq!(step.info.action, Some(Action::Wait));
    }

    #[test]
    fn utb_info_present() {
        let mut env = make_env("utb", Default::default()).unwrap();
        let (_, info) = env.reset(Some(5));
        assert!(info.utb.is_some());

        let mut env = make_env("ghost", Default::default()).unwrap();
        let (_, info) = env.reset(Some(5));
        assert!(info.utb.is_none());
    }

    #[test]
    fn random_alpha_stays_in_interval() {
        let config = ProtocolConfig {
            dev: 0.2,
            random_interval: (0.1, 0.4),
            random_process: RandomProcess::Brown,
            ..Default::default()
        };
        let mut env = make_env("ghost", config).unwrap();

        let mut alphas = vec![];
        for seed in 0..50 {
            let (_, info) = env.reset(Some(seed));
            assert!((0.1..=0.4).contains(&info.alpha));
            assert_eq!(env.rules().model().alpha, info.alpha);
            alphas.push(info.alpha);
        }
        assert!(alphas.iter().any(|&a| a != alphas[0]));
    }

    #[test]
    fn random_alpha_below_half() {
        let config = ProtocolConfig {
            alpha: 0.45,
            dev: 1.0,
            random_interval: (0.4, 0.5),
            ..Default::default()
        };
        let mut env = make_env("bitcoin", config.clone()).unwrap();

        for seed in 0..50 {
            let (_, info) = env.reset(Some(seed));
            assert!(info.alpha < 0.5);
            ProtocolConfig { alpha: info.alpha, ..config.clone() }
                .validate()
                .unwrap();
        }
    }

    proptest! {
        #[test]
        fn states_stay_in_space(
            protocol in 0usize..4,
            seed in any::<u64>(),
            actions in proptest::collection::vec(0usize..6, 1..300),
        ) {
            let config = ProtocolConfig {
                protocol: ProtocolKind::ALL[protocol],
                alpha: 0.45,
                max_hidden_block: 4,
                stale_rate: 0.1,
                action_space: ActionSpace::Full,
                ..Default::default()
            };
            let mut env = EnvBuilder::from_config(config).build().unwrap();
            env.reset(Some(seed));

            for action in actions {
                let state = env.step(action).info.state;

                prop_assert!(state.attacker <= 4 && state.honest <= 4);
                prop_assert!(env.state_space().index_of(&state).is_ok());
            }
        }
    }

    #[test]
    fn time_limit_truncates() {
        let env = make_env("bitcoin", Default::default()).unwrap();
        let mut env = TimeLimit::new(env, 10);
        env.reset(Some(0));

        for i in 1..=10 {
            let step = env.step(2);
            assert_eq!(step.truncated, i == 10);
            assert!(!step.terminated);
        }

        env.reset(None);
        assert!(!env.step(2).truncated);
        assert_eq!(env.inner().tracker().forced_adopts, 0);
    }
}
