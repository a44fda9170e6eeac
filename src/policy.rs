/*!
Attacker strategies which map observations to actions.

A trained agent is an external collaborator; the crate ships reference
strategies used as baselines and for validating the environment:

- [`Honest`] publishes every block as soon as it is found.
- [`Selfish`] follows the selfish mining strategy of Eyal and Sirer.
- [`RandomPolicy`] picks uniformly among the legal actions.
- [`TablePolicy`] looks actions up by state index, e.g. the output of
  [`solve_optimal`](crate::analysis::solve_optimal).
*/

pub mod honest;
pub mod random;
pub mod selfish;
pub mod table;

pub use honest::Honest;
pub use random::RandomPolicy;
pub use selfish::Selfish;
pub use table::TablePolicy;

use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::{action::Action, env::Observation, state::State};

/// A strategy for the attacker.
pub trait Policy: Debug + DynClone + Send + Sync {
    /// Returns the name of the strategy.
    fn name(&self) -> String;

    /// Chooses the action to take given the agent's observation and the
    /// underlying state.
    fn predict(&mut self, observation: &Observation, state: &State) -> Action;
}

dyn_clone::clone_trait_object!(Policy);
