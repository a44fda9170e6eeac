//! Ethereum's GHOST variant with depth-dependent uncle rewards.

use crate::{
    reward::Reward,
    transition::{Events, TransitionModel},
};

use super::{Protocol, ProtocolKind};

/// Bonus paid to the including block for each uncle it references.
pub const NEPHEW_REWARD: f64 = 1.0 / 32.0;

/// Reward of an uncle included `depth` blocks below its nephew.
pub fn uncle_reward(depth: u8) -> f64 {
    (8.0 - depth as f64) / 8.0
}

/// Ethereum rule set.
#[derive(Debug, Clone)]
pub struct Ethereum {
    model: TransitionModel,
}

impl Ethereum {
    pub fn new(model: TransitionModel) -> Self {
        Ethereum { model }
    }
}

impl Protocol for Ethereum {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Ethereum
    }

    fn model(&self) -> &TransitionModel {
        &self.model
    }

    fn reward(&self, events: &Events) -> Reward {
        let mut reward = Reward::blocks(events);
        for (owner, depth) in events.uncles.iter() {
            reward.credit(*owner, uncle_reward(*depth));
        }
        if let Some(nephew) = events.nephew {
            reward.credit(nephew, NEPHEW_REWARD * events.uncles.len() as f64);
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
    fn reward_decays_with_depth() {
        assert_eq!(uncle_reward(1), 7.0 / 8.0);
        assert_eq!(uncle_reward(6), 2.0 / 8.0);
    }

    #[test]
    fn nephew_bonus() {
        let rules = Ethereum::new(TransitionModel::new(
            0.3,
            0.5,
            0.0,
            10,
            UNCLE_WINDOW,
        ));
        let mut uncles = UncleSlots::new();
        uncles.insert(Party::Honest, UNCLE_WINDOW);
        uncles.age(UNCLE_WINDOW);
        let state = State::new(2, 1, Fork::Relevant).with_uncles(uncles);

        let outcome = rules.transitions(&state, Action::Override).remove(0);
        let reward = rules.reward(&outcome.events);

        assert_eq!(outcome.events.uncles, vec![(Party::Honest, 2)]);
        assert_eq!(reward.attacker, 2.0 + NEPHEW_REWARD);
        assert_eq!(reward.honest, uncle_reward(2));
    }
}
