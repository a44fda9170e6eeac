/*!
The two-pool block withholding game.

Two mining pools with hash shares `a` and `b` send part of their power, `x`
and `y`, to mine in the other pool while withholding every full solution.
Infiltrators are paid by the attacked pool without contributing blocks, so
each pool's revenue depends on both infiltration rates. [`nash_equilibrium`]
finds the mutual best response by iterated grid search, and
[`WithholdingEnv`] and [`DiscreteWithholdingEnv`] expose the game to an
agent controlling the first pool.

```
use mining_mdp::withholding::nash_equilibrium;

let eq = nash_equilibrium(0.4, 0.5).unwrap();
assert!(eq.converged);
assert!(eq.x > 0.0 && eq.y > 0.0);
// both pools lose against mutual honesty
assert!(eq.pool_0 < 1.0 && eq.pool_1 < 1.0);
```
*/

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    env::{Environment, ObservationSpace, Step},
    utils::linspace,
};

/// Tolerance used for degenerate shares and convergence.
pub const EPSILON: f64 = 1e-6;

const GRID_POINTS: usize = 100;
const MAX_ITERATIONS: usize = 100;
const REWARD_DIFF_BOUND: f32 = 10.0;

/// Revenue of each pool relative to mining honestly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolRewards {
    pub pool_0: f64,
    pub pool_1: f64,
}

impl PoolRewards {
    const ZERO: Self = PoolRewards { pool_0: 0.0, pool_1: 0.0 };
    const HONEST: Self = PoolRewards { pool_0: 1.0, pool_1: 1.0 };
}

/// Rewards of pools with shares `a` and `b` infiltrating each other with
/// `x` and `y`.
///
/// Returns zero for both pools once `x + y` approaches one, and one for
/// both if a pool faces no infiltration with no power of its own.
pub fn compute_reward(a: f64, b: f64, x: f64, y: f64) -> PoolRewards {
    if x + y > 1.0 - EPSILON {
        return PoolRewards::ZERO;
    }
    if (y < EPSILON && a < EPSILON) || (x < EPSILON && b < EPSILON) {
        return PoolRewards::HONEST;
    }

    let r1 = (a - x) / (1.0 - x - y);
    let r2 = (b - y) / (1.0 - x - y);
    let den = a * b + a * x + b * y;
    if den.abs() < EPSILON * EPSILON {
        return PoolRewards::HONEST;
    }

    PoolRewards {
        pool_0: (b * r1 + x * (r1 + r2)) / den,
        pool_1: (a * r2 + y * (r1 + r2)) / den,
    }
}

/// Infiltration rate maximizing the reward of the pool with share `a`
/// against a pool with share `b` infiltrating at rate `y`.
///
/// Searches a grid of evenly spaced rates in `[0, a)`; the smallest of
/// several maxima wins.
pub fn best_response(a: f64, b: f64, y: f64) -> f64 {
    if a < EPSILON {
        return 0.0;
    }

    let mut best = (0.0, f64::NEG_INFINITY);
    for x in linspace(0.0, a - EPSILON, GRID_POINTS) {
        let reward = compute_reward(a, b, x, y).pool_0;
        if reward > best.1 {
            best = (x, reward);
        }
    }

    best.0
}

/// Outcome of the best response iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Equilibrium {
    /// Infiltration rate of the first pool.
    pub x: f64,
    /// Infiltration rate of the second pool.
    pub y: f64,
    pub pool_0: f64,
    pub pool_1: f64,
    /// Rounds of best responses computed.
    pub iterations: usize,
    /// Whether both strategies settled before the iteration limit.
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WithholdingError {
    #[error("invalid pool shares ({0}, {1})")]
    InvalidPower(f64, f64),
    #[error("number of steps per episode must be greater than 0")]
    ZeroSteps,
}

/// Finds the Nash equilibrium of the game between pools with shares `a` and
/// `b` by simultaneous best responses, starting from mutual honesty.
pub fn nash_equilibrium(
    a: f64,
    b: f64,
) -> Result<Equilibrium, WithholdingError> {
    if !(a >= 0.0 && b >= 0.0 && a + b <= 1.0) {
        return Err(WithholdingError::InvalidPower(a, b));
    }
    if a < EPSILON && b < EPSILON {
        return Ok(Equilibrium {
            x: 0.0,
            y: 0.0,
            pool_0: 1.0,
            pool_1: 1.0,
            iterations: 0,
            converged: true,
        });
    }

    let (mut x, mut y) = (0.0, 0.0);
    let mut converged = false;
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let x_new = best_response(a, b, y);
        let y_new = best_response(b, a, x);

        if (x_new - x).abs() < EPSILON && (y_new - y).abs() < EPSILON {
            converged = true;
            break;
        }
        x = x_new;
        y = y_new;
    }

    let rewards = compute_reward(a, b, x, y);
    debug!(
        "withholding equilibrium for ({}, {}): x {:.6}, y {:.6} after {} \
         iterations",
        a, b, x, y, iterations
    );

    Ok(Equilibrium {
        x,
        y,
        pool_0: rewards.pool_0,
        pool_1: rewards.pool_1,
        iterations,
        converged,
    })
}

/// Fixed strategy of the second pool in the withholding environments.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OpponentStrategy {
    /// Play the equilibrium infiltration rate.
    #[default]
    Nash,
    /// Never infiltrate.
    Honest,
    /// Infiltrate with 80% of the pool's power.
    Aggressive,
}

impl OpponentStrategy {
    /// Share of the opponent's power used for infiltration.
    pub fn ratio(&self, equilibrium: &Equilibrium, share: f64) -> f64 {
        match self {
            Self::Nash if share > 0.0 => equilibrium.y / share,
            Self::Nash | Self::Honest => 0.0,
            Self::Aggressive => 0.8,
        }
    }
}

/// Diagnostics of a withholding environment step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithholdingInfo {
    pub steps: u64,
    /// Infiltration rate of the agent's pool.
    pub my_strategy: f64,
    /// Infiltration rate of the opponent.
    pub opponent_strategy: f64,
    pub my_reward: f64,
    pub opponent_reward: f64,
    pub cumulative_reward_0: f64,
    pub cumulative_reward_1: f64,
    pub equilibrium: Equilibrium,
    /// Whether the requested action was out of range.
    pub invalid_action: bool,
}

/// State shared by both withholding environments.
#[derive(Debug, Clone)]
struct Game {
    alpha_0: f64,
    alpha_1: f64,
    opponent: OpponentStrategy,
    max_steps: u64,
    equilibrium: Equilibrium,
    steps: u64,
    cumulative: PoolRewards,
}

impl Game {
    fn new(
        alpha_0: f64,
        alpha_1: f64,
        opponent: OpponentStrategy,
        max_steps: u64,
    ) -> Result<Self, WithholdingError> {
        let valid = |share: f64| share > 0.0 && share < 1.0;
        if !(valid(alpha_0) && valid(alpha_1) && alpha_0 + alpha_1 <= 1.0) {
            return Err(WithholdingError::InvalidPower(alpha_0, alpha_1));
        }
        if max_steps == 0 {
            return Err(WithholdingError::ZeroSteps);
        }

        Ok(Game {
            alpha_0,
            alpha_1,
            opponent,
            max_steps,
            equilibrium: nash_equilibrium(alpha_0, alpha_1)?,
            steps: 0,
            cumulative: PoolRewards::ZERO,
        })
    }

    fn opponent_ratio(&self) -> f64 {
        self.opponent.ratio(&self.equilibrium, self.alpha_1)
    }

    fn reset(&mut self) -> WithholdingInfo {
        self.steps = 0;
        self.cumulative = PoolRewards::ZERO;

        self.info(0.0, 0.0, PoolRewards::ZERO, false)
    }

    /// Plays one round with the agent infiltrating at `ratio` of its power.
    fn play(&mut self, ratio: f64, invalid_action: bool) -> WithholdingInfo {
        let x = (ratio * self.alpha_0).clamp(0.0, self.alpha_0);
        let y = self.opponent_ratio() * self.alpha_1;
        let rewards = compute_reward(self.alpha_0, self.alpha_1, x, y);

        self.steps += 1;
        self.cumulative.pool_0 += rewards.pool_0;
        self.cumulative.pool_1 += rewards.pool_1;

        self.info(x, y, rewards, invalid_action)
    }

    fn truncated(&self) -> bool {
        self.steps >= self.max_steps
    }

    fn info(
        &self,
        x: f64,
        y: f64,
        rewards: PoolRewards,
        invalid_action: bool,
    ) -> WithholdingInfo {
        WithholdingInfo {
            steps: self.steps,
            my_strategy: x,
            opponent_strategy: y,
            my_reward: rewards.pool_0,
            opponent_reward: rewards.pool_1,
            cumulative_reward_0: self.cumulative.pool_0,
            cumulative_reward_1: self.cumulative.pool_1,
            equilibrium: self.equilibrium,
            invalid_action,
        }
    }
}

/// Withholding game with a continuous action: the share of the agent's
/// power sent to infiltrate the opponent, in `[0, 1]`.
///
/// Observations are the opponent's last infiltration share and the
/// difference of the cumulative rewards, clamped to `[-10, 10]`.
#[derive(Debug, Clone)]
pub struct WithholdingEnv {
    game: Game,
    last_opponent_ratio: f64,
}

impl WithholdingEnv {
    pub fn new(
        alpha_0: f64,
        alpha_1: f64,
        opponent: OpponentStrategy,
        max_steps: u64,
    ) -> Result<Self, WithholdingError> {
        let game = Game::new(alpha_0, alpha_1, opponent, max_steps)?;

        Ok(WithholdingEnv { last_opponent_ratio: game.opponent_ratio(), game })
    }

    pub fn equilibrium(&self) -> &Equilibrium {
        &self.game.equilibrium
    }

    pub fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::Box {
            low: vec![0.0, -REWARD_DIFF_BOUND],
            high: vec![1.0, REWARD_DIFF_BOUND],
        }
    }

    fn observe(&self) -> [f32; 2] {
        let diff = self.game.cumulative.pool_0 - self.game.cumulative.pool_1;

        [
            self.last_opponent_ratio as f32,
            (diff as f32).clamp(-REWARD_DIFF_BOUND, REWARD_DIFF_BOUND),
        ]
    }
}

impl Environment for WithholdingEnv {
    type Action = f64;
    type Observation = [f32; 2];
    type Info = WithholdingInfo;

    /// The game is deterministic, so `seed` is ignored.
    fn reset(&mut self, _seed: Option<u64>) -> ([f32; 2], WithholdingInfo) {
        let info = self.game.reset();
        self.last_opponent_ratio = self.game.opponent_ratio();

        (self.observe(), info)
    }

    /// Ratios outside `[0, 1]` are clamped; NaN counts as zero.
    fn step(&mut self, action: f64) -> Step<[f32; 2], WithholdingInfo> {
        let invalid = !(0.0..=1.0).contains(&action);
        let ratio = if action.is_nan() { 0.0 } else { action };
        let info = self.game.play(ratio, invalid);
        self.last_opponent_ratio = info.opponent_strategy / self.game.alpha_1;

        Step {
            observation: self.observe(),
            reward: info.my_reward,
            terminated: false,
            truncated: self.game.truncated(),
            info,
        }
    }
}

/// Withholding game with five infiltration levels, see
/// [`DiscreteWithholdingEnv::RATIOS`]. The observation is always `0`.
#[derive(Debug, Clone)]
pub struct DiscreteWithholdingEnv {
    game: Game,
}

impl DiscreteWithholdingEnv {
    pub const RATIOS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

    pub fn new(
        alpha_0: f64,
        alpha_1: f64,
        opponent: OpponentStrategy,
        max_steps: u64,
    ) -> Result<Self, WithholdingError> {
        Ok(DiscreteWithholdingEnv {
            game: Game::new(alpha_0, alpha_1, opponent, max_steps)?,
        })
    }

    pub fn equilibrium(&self) -> &Equilibrium {
        &self.game.equilibrium
    }

    pub fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::Discrete(1)
    }
}

impl Environment for DiscreteWithholdingEnv {
    type Action = usize;
    type Observation = usize;
    type Info = WithholdingInfo;

    fn reset(&mut self, _seed: Option<u64>) -> (usize, WithholdingInfo) {
        (0, self.game.reset())
    }

    /// Out-of-range actions are played as no infiltration.
    fn step(&mut self, action: usize) -> Step<usize, WithholdingInfo> {
        let info = match Self::RATIOS.get(action) {
            Some(&ratio) => self.game.play(ratio, false),
            None => self.game.play(0.0, true),
        };

        Step {
            observation: 0,
            reward: info.my_reward,
            terminated: false,
            truncated: self.game.truncated(),
            info,
        }
    }
}
