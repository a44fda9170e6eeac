//! Implementation of selfish mining.

use crate::{
    action::Action,
    env::Observation,
    state::{Fork, State},
};

use super::Policy;

/// Selfish mining as described by Eyal and Sirer.
///
/// Keeps found blocks private, reveals them to win a race when the honest
/// network catches up to within one block, and gives up once the honest
/// chain is longer. When bounded, the private chain is published once it
/// reaches the bound instead of being lost to a forced adopt.
#[derive(Debug, Default, Clone, Copy)]
pub struct Selfish {
    max_hidden_block: Option<u32>,
}

impl Selfish {
    pub fn new() -> Self {
        Selfish { max_hidden_block: None }
    }

    /// Selfish mining in an environment which forces an adopt once either
    /// chain grows past `max_hidden_block`.
    pub fn bounded(max_hidden_block: u32) -> Self {
        Selfish { max_hidden_block: Some(max_hidden_block) }
    }
}

impl Policy for Selfish {
    fn name(&self) -> String {
        "Selfish".into()
    }

    fn predict(&mut self, _observation: &Observation, state: &State) -> Action {
        let State { attacker: a, honest: h, fork, .. } = *state;

        match self.max_hidden_block {
            Some(bound) if a >= bound && a > h => Action::Override,
            _ if h > a => Action::Adopt,
            _ if h >= 1 && a == h + 1 => Action::Override,
            _ if a == 1 && h == 1 && fork == Fork::Relevant => Action::Match,
            _ => Action::Wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selfish_decisions() {
        let mut selfish = Selfish::new();
        let obs = Observation::Index(0);
        let mut decide =
            |a, h, fork| selfish.predict(&obs, &State::new(a, h, fork));

        assert_eq!(decide(1, 0, Fork::Irrelevant), Action::Wait);
        assert_eq!(decide(1, 1, Fork::Relevant), Action::Match);
        assert_eq!(decide(2, 1, Fork::Relevant), Action::Override);
        assert_eq!(decide(5, 2, Fork::Relevant), Action::Wait);
        assert_eq!(decide(0, 1, Fork::Relevant), Action::Adopt);
    }

    #[test]
    fn bounded_publishes_at_bound() {
        let mut selfish = Selfish::bounded(10);
        let obs = Observation::Index(0);
        let state = State::new(10, 3, Fork::Irrelevant);

        assert_eq!(selfish.predict(&obs, &state), Action::Override);
        assert_eq!(Selfish::new().predict(&obs, &state), Action::Wait);
    }
}
