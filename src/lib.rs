/*!
Markov decision process environments for blockchain mining games.

The selfish mining game is modelled as a finite MDP for four protocols:
longest chain (`bitcoin`), GHOST, Ethereum with uncle rewards, and the
uncles-to-block defense (`utb`). States are enumerated by
[`StateSpace`](state::StateSpace), transitions come from the
[`TransitionModel`](transition::TransitionModel) and rewards from the
[`Protocol`](protocol::Protocol) rules. [`MiningEnv`](env::MiningEnv) wraps
them in a `reset`/`step` environment for learning agents, while
[`analysis`] solves the same model exactly.

Separately, [`withholding`] models the two-pool block withholding game and
its Nash equilibrium.
*/

// ## Checks against known results:
// - Honest mining -> reward fraction equals alpha
// - SM1 with a large depth bound -> matches the closed form from Eyal's paper
// - Optimal policy below the profitability threshold -> alpha

pub mod action;
pub mod analysis;
pub mod config;
pub mod env;
pub mod evaluation;
pub mod policy;
pub mod prelude;
pub mod protocol;
pub mod results;
pub mod reward;
pub mod state;
pub mod theory;
pub mod transition;
pub mod withholding;

pub(crate) mod utils;
