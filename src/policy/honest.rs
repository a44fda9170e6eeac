//! Implementation of honest mining.

use crate::{action::Action, env::Observation, state::State};

use super::Policy;

/// Publishes each block immediately: overrides with a single private block
/// and adopts whenever the honest chain is ahead.
#[derive(Debug, Default, Clone, Copy)]
pub struct Honest;

impl Honest {
    pub fn new() -> Self {
        Honest
    }
}

impl Policy for Honest {
    fn name(&self) -> String {
        "Honest".into()
    }

    fn predict(&mut self, _observation: &Observation, state: &State) -> Action {
        if state.attacker > state.honest {
            Action::Override
        } else if state.honest > state.attacker {
            Action::Adopt
        } else {
            Action::Wait
        }
    }
}
