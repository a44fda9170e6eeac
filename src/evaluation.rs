/*!
Batch evaluation of attacker policies over grids of game parameters.

Every combination of `alpha`, `gamma` and (for the UTB protocol) UTB ratio is
run for a number of episodes of fixed length. Episodes are independent and
run in parallel when the `rayon` feature is enabled; each derives its seed
from the base seed, so results do not depend on scheduling.

```
use mining_mdp::prelude::*;

let evaluation = EvaluationBuilder::new()
    .protocol(ProtocolKind::Bitcoin)
    .policy(Selfish::bounded(20))
    .alphas([0.25, 0.35])
    .episodes(4)
    .max_steps(1_000)
    .seed(7)
    .build()
    .unwrap();

let results = evaluation
    .run_all()
    .theoretical("selfish_revenue", selfish_revenue_curve(0.5))
    .format(Format::CSV)
    .build();

println!("{}", results);
```
*/

pub mod builder;

pub use builder::{EvaluationBuildError, EvaluationBuilder};

use log::info;
use rand::{rngs::StdRng, SeedableRng};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{
    action::{Action, ActionSpace},
    config::ProtocolConfig,
    env::{Environment, MiningEnv, TimeLimit},
    policy::Policy,
    protocol::ProtocolKind,
    results::ResultsBuilder,
};

/// One combination of swept parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterPoint {
    pub alpha: f64,
    pub gamma: f64,
    pub utb_ratio: f64,
}

/// Container for a group of evaluation runs which share a policy and
/// protocol. Runs should be started with this struct's `run_all` method.
#[derive(Debug, Clone)]
pub struct Evaluation {
    config: ProtocolConfig,
    policy: Box<dyn Policy>,
    points: Vec<ParameterPoint>,
    episodes: usize,
    max_steps: usize,
    seed: u64,
}

/// Statistics of a single episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutput {
    pub seed: u64,
    /// Attacker's share of the reward. Falls back to the share of canonical
    /// blocks, then to `alpha`, if nothing was handed out.
    pub reward_fraction: f64,
    pub episode_reward: f64,
    pub steps: u64,
    pub attacker_blocks: u64,
    pub honest_blocks: u64,
    /// Number of times each action was applied, in [`Action::ALL`] order.
    pub action_counts: [u64; 4],
}

/// All episodes run for one [`ParameterPoint`].
#[derive(Debug, Clone, PartialEq)]
pub struct PointOutput {
    pub protocol: ProtocolKind,
    pub policy: String,
    pub point: ParameterPoint,
    pub max_steps: usize,
    pub episodes: Vec<EpisodeOutput>,
}

impl Evaluation {
    pub fn builder() -> EvaluationBuilder {
        EvaluationBuilder::new()
    }

    pub fn points(&self) -> &[ParameterPoint] {
        &self.points
    }

    /// Runs every episode of every parameter point.
    pub fn run_all(self) -> ResultsBuilder {
        let Evaluation { config, policy, points, episodes, max_steps, seed } =
            self;
        info!(
            "evaluating {} on {} with {} parameter points, {} episodes each",
            policy.name(),
            config.protocol,
            points.len(),
            episodes
        );

        let runs: Vec<(usize, u64)> = (0..points.len())
            .flat_map(|p| (0..episodes).map(move |e| (p, e as u64)))
            .collect();
        let run = |&(p, e): &(usize, u64)| {
            let episode_seed =
                seed.wrapping_add((p * episodes) as u64).wrapping_add(e);
            run_episode(
                &config,
                points[p],
                policy.clone(),
                max_steps,
                episode_seed,
            )
        };

        #[cfg(feature = "rayon")]
        let outputs: Vec<EpisodeOutput> = runs.par_iter().map(run).collect();
        #[cfg(not(feature = "rayon"))]
        let outputs: Vec<EpisodeOutput> = runs.iter().map(run).collect();

        let data = points
            .iter()
            .zip(outputs.chunks(episodes))
            .map(|(point, chunk)| PointOutput {
                protocol: config.protocol,
                policy: policy.name(),
                point: *point,
                max_steps,
                episodes: chunk.to_vec(),
            })
            .collect();

        ResultsBuilder::new(data)
    }
}

fn episode_env(
    config: &ProtocolConfig,
    point: ParameterPoint,
    seed: u64,
) -> MiningEnv {
    let config = ProtocolConfig {
        alpha: point.alpha,
        gamma: point.gamma,
        utb_ratio: point.utb_ratio,
        action_space: ActionSpace::Full,
        ..config.clone()
    };

    // every point was validated when the evaluation was built
    MiningEnv::new(config, StdRng::seed_from_u64(seed))
}

fn run_episode(
    config: &ProtocolConfig,
    point: ParameterPoint,
    mut policy: Box<dyn Policy>,
    max_steps: usize,
    seed: u64,
) -> EpisodeOutput {
    let mut env = TimeLimit::new(episode_env(config, point, seed), max_steps);
    let (mut observation, _) = env.reset(Some(seed));

    let mut action_counts = [0; 4];
    loop {
        let action = policy.predict(&observation, env.inner().state());
        let step = env.step(ActionSpace::Full.encode(action));
        if let Some(applied) = step.info.action {
            action_counts[action_index(applied)] += 1;
        }

        observation = step.observation;
        if step.truncated || step.terminated {
            break;
        }
    }

    let env = env.into_inner();
    let tracker = env.tracker();
    let reward_fraction = tracker
        .reward_fraction()
        .or_else(|| tracker.block_fraction())
        .unwrap_or(env.alpha());

    EpisodeOutput {
        seed,
        reward_fraction,
        episode_reward: tracker.attacker_reward,
        steps: max_steps as u64,
        attacker_blocks: tracker.attacker_blocks,
        honest_blocks: tracker.honest_blocks,
        action_counts,
    }
}

fn action_index(action: Action) -> usize {
    Action::ALL.iter().position(|a| *a == action).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use crate::policy::{Honest, Selfish};

    use super::*;

    #[test]
    fn honest_reward_close_to_alpha() {
        let results = EvaluationBuilder::new()
            .policy(Honest::new())
            .alphas([0.2, 0.4])
            .episodes(8)
            .max_steps(5_000)
            .seed(3)
            .build()
            .unwrap()
            .run_all()
            .data();

        assert_eq!(results.len(), 2);
        for point in results {
            assert_eq!(point.episodes.len(), 8);
            let mean = point
                .episodes
                .iter()
                .map(|e| e.reward_fraction)
                .sum::<f64>()
                / 8.0;
            assert!((mean - point.point.alpha).abs() < 0.02);
        }
    }

    #[test]
    fn runs_are_reproducible() {
        let evaluation = EvaluationBuilder::new()
            .protocol(ProtocolKind::Ethereum)
            .policy(Selfish::bounded(20))
            .episodes(3)
            .max_steps(500)
            .seed(11)
            .build()
            .unwrap();

        let first = evaluation.clone().run_all().data();
        let second = evaluation.run_all().data();
        assert_eq!(first, second);
        assert_ne!(first[0].episodes[0], first[0].episodes[1]);
    }

    #[test]
    fn counts_every_step() {
        let data = EvaluationBuilder::new()
            .policy(Selfish::new())
            .episodes(1)
            .max_steps(250)
            .build()
            .unwrap()
            .run_all()
            .data();

        let episode = &data[0].episodes[0];
        assert_eq!(episode.action_counts.iter().sum::<u64>(), 250);
        assert_eq!(episode.steps, 250);
    }
}
