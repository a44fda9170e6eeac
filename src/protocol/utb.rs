/*!
Uncles-To-Block defense on top of the longest-chain rule.

Honest uncles earn a tunable fraction `utb_ratio` of a block reward, which
makes orphaning honest blocks less damaging to the honest network. Orphaned
attacker blocks come from withheld branches and earn nothing, so raising the
ratio never pays the attacker. An override that publishes a long private
chain gives back part of its reward in proportion to how long the chain was
kept hidden.
*/

use crate::{
    action::Action,
    reward::Reward,
    state::Party,
    transition::{Events, TransitionModel},
};

use super::{Protocol, ProtocolKind};

/// UTB rule set.
#[derive(Debug, Clone)]
pub struct Utb {
    model: TransitionModel,
    utb_ratio: f64,
}

impl Utb {
    pub fn new(model: TransitionModel, utb_ratio: f64) -> Self {
        Utb { model, utb_ratio }
    }

    pub fn utb_ratio(&self) -> f64 {
        self.utb_ratio
    }

    /// Reward withheld from an override which published `hidden` private
    /// blocks and earned `base` before the penalty.
    pub fn penalty(&self, hidden: u32, base: f64) -> f64 {
        let depth = hidden as f64 / self.model.max_hidden_block as f64;

        self.utb_ratio * depth * base.abs()
    }
}

impl Protocol for Utb {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Utb
    }

    fn model(&self) -> &TransitionModel {
        &self.model
    }

    fn reward(&self, events: &Events) -> Reward {
        let mut reward = Reward::blocks(events);
        let honest_uncles = events
            .uncles
            .iter()
            .filter(|(owner, _)| *owner == Party::Honest)
            .count();
        reward.credit(Party::Honest, self.utb_ratio * honest_uncles as f64);
        if events.action == Action::Override {
            let penalty = self.penalty(events.hidden, reward.base_attacker);
            reward.attacker -= penalty;
        }

        reward
    }
}

#[cfg(test)]
mod tests {
    use crate::state::{Fork, Party, State, UncleSlots, UNCLE_WINDOW};

    use super::*;

    fn rules(ratio: f64) -> Utb {
        Utb::new(TransitionModel::new(0.3, 0.5, 0.0, 10, UNCLE_WINDOW), ratio)
    }

    #[test]
    fn override_penalty() {
        let utb = rules(0.5);
        let state = State::new(5, 3, Fork::Relevant);

        let outcome = utb.transitions(&state, Action::Override).remove(0);
        let reward = utb.reward(&outcome.events);

        assert_eq!(reward.base_attacker, 4.0);
        assert!((reward.attacker - (4.0 - 0.5 * 0.5 * 4.0)).abs() < 1e-12);
        assert!((reward.penalty() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_ratio_is_longest_chain() {
        let utb = rules(0.0);
        let mut uncles = UncleSlots::new();
        uncles.insert(Party::Honest, UNCLE_WINDOW);
        let state = State::new(3, 1, Fork::Relevant).with_uncles(uncles);

        for outcome in utb.transitions(&state, Action::Override) {
            let reward = utb.reward(&outcome.events);
            assert_eq!(reward.attacker, 2.0);
            assert_eq!(reward.honest, 0.0);
        }
    }

    #[test]
    fn honest_uncles_earn_ratio() {
        let utb = rules(0.75);
        let mut uncles = UncleSlots::new();
        uncles.insert(Party::Honest, UNCLE_WINDOW);
        uncles.insert(Party::Attacker, UNCLE_WINDOW);
        let state = State::new(1, 1, Fork::Relevant).with_uncles(uncles);

        let outcome = utb.transitions(&state, Action::Adopt).remove(0);
        assert_eq!(outcome.events.uncles.len(), 2);
        let reward = utb.reward(&outcome.events);

        assert_eq!(reward.attacker, 0.0);
        assert_eq!(reward.honest, 1.75);
    }

    #[test]
    fn attacker_gains_nothing_from_ratio() {
        let mut uncles = UncleSlots::new();
        uncles.insert(Party::Attacker, UNCLE_WINDOW);
        let state = State::new(2, 1, Fork::Relevant).with_uncles(uncles);

        let (off, full) = (rules(0.0), rules(1.0));
        for action in [Action::Adopt, Action::Override, Action::Wait] {
            for outcome in off.transitions(&state, action) {
                let low = off.reward(&outcome.events);
                let high = full.reward(&outcome.events);

                assert!(high.attacker <= low.attacker);
                assert!(high.honest >= low.honest);
            }
        }
    }
}
