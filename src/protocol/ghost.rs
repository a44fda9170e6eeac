//! Heaviest-subtree rule with a flat uncle reward.

use crate::{
    reward::Reward,
    transition::{Events, TransitionModel},
};

use super::{Protocol, ProtocolKind};

/// Reward of an uncle regardless of its depth.
pub const GHOST_UNCLE_REWARD: f64 = 7.0 / 8.0;

/// GHOST rule set. Orphans referenced within the uncle window earn
/// [`GHOST_UNCLE_REWARD`] for their owner.
#[derive(Debug, Clone)]
pub struct Ghost {
    model: TransitionModel,
}

impl Ghost {
    pub fn new(model: TransitionModel) -> Self {
        Ghost { model }
    }
}

impl Protocol for Ghost {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Ghost
    }

    fn model(&self) -> &TransitionModel {
        &self.model
    }

    fn reward(&self, events: &Events) -> Reward {
        let mut reward = Reward::blocks(events);
        for (owner, _) in events.uncles.iter() {
            reward.credit(*owner, GHOST_UNCLE_REWARD);
        }

        reward
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        action::Action,
        state::{Fork, Party, State, UncleSlots, UNCLE_WINDOW},
    };

    use super::*;

    #[test]
    fn flat_uncle_reward() {
        let rules =
            Ghost::new(TransitionModel::new(0.3, 0.5, 0.0, 10, UNCLE_WINDOW));
        let mut uncles = UncleSlots::new();
        uncles.insert(Party::Honest, UNCLE_WINDOW);
        uncles.age(UNCLE_WINDOW);
        uncles.age(UNCLE_WINDOW);
        uncles.insert(Party::Attacker, UNCLE_WINDOW);
        let state = State::new(1, 2, Fork::Relevant).with_uncles(uncles);

        let outcome = rules.transitions(&state, Action::Adopt).remove(0);
        let reward = rules.reward(&outcome.events);

        assert_eq!(reward.attacker, GHOST_UNCLE_REWARD);
        assert_eq!(reward.honest, 2.0 + GHOST_UNCLE_REWARD);
    }
}
