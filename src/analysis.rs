/*!
Exact analysis of the mining game as a finite Markov decision process.

The long-run reward fraction of a stationary policy is computed from the
stationary distribution of the Markov chain it induces. The best achievable
fraction is found by bisection on the fraction `rho`: for a candidate `rho`,
relative value iteration finds the optimal average of the shifted reward
`attacker - rho * (attacker + honest)`, which is positive exactly when some
policy achieves a fraction above `rho`.

Only states reachable from the initial state are explored.

```
use mining_mdp::analysis::{evaluate_policy, SolverOptions};
use mining_mdp::policy::Honest;
use mining_mdp::protocol::ProtocolKind;
use mining_mdp::transition::TransitionModel;

let model = TransitionModel::new(0.3, 0.5, 0.0, 10, 0);
let rules = ProtocolKind::Bitcoin.rules(model, 0.0);
let options = SolverOptions::default();
let result =
    evaluate_policy(rules.as_ref(), &mut Honest::new(), &options).unwrap();

assert!((result.reward_fraction - 0.3).abs() < 1e-9);
```
*/

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};

use crate::{
    action::Action,
    env::Observation,
    policy::{Policy, TablePolicy},
    protocol::Protocol,
    state::State,
};

/// Weight of the current estimate kept in every iteration. Mixing in the
/// previous estimate makes every induced chain aperiodic.
const LAZINESS: f64 = 0.5;

/// Convergence parameters of the exact solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Iterative methods stop once successive estimates differ by less than
    /// this amount.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Width of the final bisection interval of the optimal reward fraction.
    pub precision: f64,
    /// Largest number of reachable states explored before giving up.
    pub max_states: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            tolerance: 1e-12,
            max_iterations: 1_000_000,
            precision: 1e-7,
            max_states: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("more than {0} states are reachable")]
    TooManyStates(usize),
}

/// Long-run behavior of a stationary policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEvaluation {
    /// Attacker's share of all reward.
    pub reward_fraction: f64,
    /// Expected attacker reward per step.
    pub attacker_rate: f64,
    /// Expected honest reward per step.
    pub honest_rate: f64,
    /// Number of states reachable under the policy.
    pub states: usize,
    pub iterations: usize,
    pub converged: bool,
}

/// Result of [`solve_optimal`].
#[derive(Debug, Clone)]
pub struct OptimalPolicy {
    /// Highest long-run reward fraction achievable by the attacker.
    pub reward_fraction: f64,
    /// A policy achieving `reward_fraction`.
    pub policy: TablePolicy,
    /// Number of states reachable under any policy.
    pub states: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    next: usize,
    probability: f64,
    attacker: f64,
    honest: f64,
}

/// Reachable part of the game, with the outcomes of every explored action.
#[derive(Debug, Default)]
struct Chain {
    states: Vec<State>,
    choices: Vec<Vec<(Action, Vec<Edge>)>>,
}

impl Chain {
    /// Breadth-first exploration from the initial state, following the
    /// actions returned by `actions`.
    fn explore<F>(
        rules: &dyn Protocol,
        options: &SolverOptions,
        mut actions: F,
    ) -> Result<Self, AnalysisError>
    where
        F: FnMut(&State) -> Vec<Action>,
    {
        let initial = rules.state_space().initial();
        let mut chain = Chain::default();
        let mut index = HashMap::from([(initial, 0)]);
        let mut queue = VecDeque::from([initial]);
        chain.states.push(initial);

        while let Some(state) = queue.pop_front() {
            let mut choices = vec![];
            for action in actions(&state) {
                let mut edges = vec![];
                for outcome in rules.transitions(&state, action) {
                    let next = *index.entry(outcome.next).or_insert_with(|| {
                        chain.states.push(outcome.next);
                        queue.push_back(outcome.next);
                        chain.states.len() - 1
                    });
                    let reward = rules.reward(&outcome.events);

                    edges.push(Edge {
                        next,
                        probability: outcome.probability,
                        attacker: reward.attacker,
                        honest: reward.honest,
                    });
                }
                choices.push((action, edges));
            }
            chain.choices.push(choices);

            if chain.states.len() > options.max_states {
                return Err(AnalysisError::TooManyStates(options.max_states));
            }
        }

        debug!("explored {} reachable states", chain.states.len());
        Ok(chain)
    }

    fn len(&self) -> usize {
        self.states.len()
    }
}

/// Computes the long-run reward fraction of `policy` exactly.
pub fn evaluate_policy<P: Policy + ?Sized>(
    rules: &dyn Protocol,
    policy: &mut P,
    options: &SolverOptions,
) -> Result<PolicyEvaluation, AnalysisError> {
    let space = rules.state_space();
    let chain = Chain::explore(rules, options, |state| {
        let observation = Observation::Index(space.index_of_unchecked(state));
        vec![policy.predict(&observation, state)]
    })?;

    Ok(stationary_rates(&chain, options))
}

/// Stationary distribution by power iteration over the single action
/// explored in every state.
fn stationary_rates(
    chain: &Chain,
    options: &SolverOptions,
) -> PolicyEvaluation {
    let n = chain.len();
    let mut dist = vec![0.0; n];
    dist[0] = 1.0;

    let mut iterations = 0;
    let mut converged = false;
    while iterations < options.max_iterations {
        iterations += 1;

        let mut next: Vec<f64> = dist.iter().map(|p| p * LAZINESS).collect();
        for (s, choices) in chain.choices.iter().enumerate() {
            for edge in choices[0].1.iter() {
                let flow = dist[s] * edge.probability;
                next[edge.next] += (1.0 - LAZINESS) * flow;
            }
        }

        let change: f64 =
            next.iter().zip(dist.iter()).map(|(a, b)| (a - b).abs()).sum();
        dist = next;
        if change < options.tolerance {
            converged = true;
            break;
        }
    }
    if !converged {
        warn!("stationary distribution not reached in {} steps", iterations);
    }

    let (mut attacker_rate, mut honest_rate) = (0.0, 0.0);
    for (s, choices) in chain.choices.iter().enumerate() {
        for edge in choices[0].1.iter() {
            attacker_rate += dist[s] * edge.probability * edge.attacker;
            honest_rate += dist[s] * edge.probability * edge.honest;
        }
    }

    let total = attacker_rate + honest_rate;
    PolicyEvaluation {
        reward_fraction: if total > 0.0 { attacker_rate / total } else { 0.0 },
        attacker_rate,
        honest_rate,
        states: n,
        iterations,
        converged,
    }
}

/// Finds the policy maximizing the attacker's long-run reward fraction.
pub fn solve_optimal(
    rules: &dyn Protocol,
    options: &SolverOptions,
) -> Result<OptimalPolicy, AnalysisError> {
    let chain =
        Chain::explore(rules, options, |state| rules.legal_actions(state))?;

    let mut bias = vec![0.0; chain.len()];
    let (mut low, mut high) = (0.0, 1.0);
    let mut converged = true;
    let mut best = None;
    while high - low > options.precision {
        let rho = (low + high) / 2.0;
        let (gain, ok) =
            relative_value_iteration(&chain, rho, &mut bias, options);
        converged &= ok;

        if gain > 0.0 {
            low = rho;
            best = Some(bias.clone());
        } else {
            high = rho;
        }
    }
    if !converged {
        warn!("relative value iteration did not converge for every rho");
    }

    // the greedy policy for rho = low attains a fraction of at least low
    let bias = match best {
        Some(bias) => bias,
        None => {
            relative_value_iteration(&chain, low, &mut bias, options);
            bias
        }
    };
    let mut policy = TablePolicy::new(&rules.state_space());
    for (s, state) in chain.states.iter().enumerate() {
        let (action, _) = best_choice(&chain, s, low, &bias);
        policy.insert(state, action);
    }

    Ok(OptimalPolicy {
        reward_fraction: (low + high) / 2.0,
        policy,
        states: chain.len(),
        converged,
    })
}

/// Value of the best action in state `s` under the shifted reward, for the
/// lazy chain.
fn best_choice(
    chain: &Chain,
    s: usize,
    rho: f64,
    bias: &[f64],
) -> (Action, f64) {
    let mut best = (Action::Adopt, f64::NEG_INFINITY);
    for (action, edges) in chain.choices[s].iter() {
        let value = edges
            .iter()
            .map(|e| {
                let reward = e.attacker - rho * (e.attacker + e.honest);
                e.probability * (reward + bias[e.next])
            })
            .sum::<f64>()
            * (1.0 - LAZINESS)
            + LAZINESS * bias[s];

        if value > best.1 + 1e-12 {
            best = (*action, value);
        }
    }

    best
}

/// Optimal average shifted reward per step for the given `rho`. `bias` is
/// used as the starting point and holds the relative values afterwards.
fn relative_value_iteration(
    chain: &Chain,
    rho: f64,
    bias: &mut Vec<f64>,
    options: &SolverOptions,
) -> (f64, bool) {
    let mut gain = 0.0;
    for _ in 0..options.max_iterations {
        let next: Vec<f64> = (0..chain.len())
            .map(|s| best_choice(chain, s, rho, bias).1)
            .collect();

        let (low, high) = next.iter().zip(bias.iter()).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(low, high), (a, b)| (low.min(a - b), high.max(a - b)),
        );
        gain = next[0] - bias[0];
        let reference = next[0];
        *bias = next.into_iter().map(|v| v - reference).collect();

        if high - low < options.tolerance {
            return (gain / (1.0 - LAZINESS), true);
        }
    }

    (gain / (1.0 - LAZINESS), false)
}

#[cfg(test)]
mod tests {
    use crate::{
        policy::{Honest, Selfish},
        protocol::ProtocolKind,
        theory,
        transition::TransitionModel,
    };

    use super::*;

    fn bitcoin(alpha: f64, gamma: f64, bound: u32) -> Box<dyn Protocol> {
        let model = TransitionModel::new(alpha, gamma, 0.0, bound, 0);
        ProtocolKind::Bitcoin.rules(model, 0.0)
    }

    #[test]
    fn honest_earns_alpha() {
        let options = SolverOptions::default();
        for alpha in [0.1, 0.25, 0.35, 0.45] {
            let rules = bitcoin(alpha, 0.5, 20);
            let result =
                evaluate_policy(rules.as_ref(), &mut Honest::new(), &options)
                    .unwrap();

            assert!(result.converged);
            assert!((result.reward_fraction - alpha).abs() < 1e-9);
        }
    }

    #[test]
    fn selfish_matches_closed_form() {
        let rules = bitcoin(0.35, 0.5, 40);
        let result = evaluate_policy(
            rules.as_ref(),
            &mut Selfish::bounded(40),
            &SolverOptions::default(),
        )
        .unwrap();
        let expected = theory::selfish_revenue(0.35, 0.5);

        assert!((expected - 0.41603).abs() < 1e-4);
        assert!((result.reward_fraction - expected).abs() < 1e-4);
    }

    #[test]
    fn utb_ratio_reduces_selfish_revenue() {
        let options = SolverOptions::default();
        let fraction = |alpha: f64, gamma: f64, ratio: f64| {
            let model = TransitionModel::new(alpha, gamma, 0.06, 6, 0);
            let rules = ProtocolKind::Utb.rules(model, ratio);
            evaluate_policy(rules.as_ref(), &mut Selfish::bounded(6), &options)
                .unwrap()
                .reward_fraction
        };

        for alpha in [0.1, 0.2, 0.25, 0.3, 0.35, 0.45] {
            for gamma in [0.0, 0.5, 1.0] {
                let fractions: Vec<_> = [0.0, 0.25, 0.5, 0.75, 1.0]
                    .into_iter()
                    .map(|ratio| fraction(alpha, gamma, ratio))
                    .collect();

                assert!(
                    fractions.windows(2).all(|w| w[1] <= w[0] + 1e-9),
                    "alpha {} gamma {}: {:?}",
                    alpha,
                    gamma,
                    fractions
                );
            }
        }
        assert!(fraction(0.35, 0.5, 1.0) < 0.35);
    }

    #[test]
    fn optimal_is_alpha_below_threshold() {
        let rules = bitcoin(0.25, 0.0, 10);
        let optimal = solve_optimal(rules.as_ref(), &SolverOptions::default())
            .unwrap();

        assert!((optimal.reward_fraction - 0.25).abs() < 1e-5);
    }

    #[test]
    fn optimal_beats_selfish() {
        let options = SolverOptions::default();
        let rules = bitcoin(0.35, 0.5, 10);
        let selfish =
            evaluate_policy(rules.as_ref(), &mut Selfish::bounded(10), &options)
                .unwrap();
        let mut optimal = solve_optimal(rules.as_ref(), &options).unwrap();

        assert!(optimal.reward_fraction > selfish.reward_fraction);

        // the extracted policy attains the optimal fraction
        let attained =
            evaluate_policy(rules.as_ref(), &mut optimal.policy, &options)
                .unwrap();
        let gap = attained.reward_fraction - optimal.reward_fraction;
        assert!(gap.abs() < 1e-5);
    }

    #[test]
    fn state_limit() {
        let rules = bitcoin(0.35, 0.5, 20);
        let options = SolverOptions { max_states: 10, ..Default::default() };

        assert_eq!(
            solve_optimal(rules.as_ref(), &options).unwrap_err(),
            AnalysisError::TooManyStates(10)
        );
    }
}
