use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    action::{legal_actions, Action},
    env::Observation,
    state::State,
};

use super::Policy;

/// Picks uniformly among the legal actions.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        RandomPolicy { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> String {
        "Random".into()
    }

    fn predict(&mut self, _observation: &Observation, state: &State) -> Action {
        legal_actions(state)
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Action::Wait)
    }
}
