//! Attacker actions and the discrete action spaces exposed to agents.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::state::State;

/// A decision of the attacker at a single step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Abandon the private chain and mine on the public tip.
    Adopt,
    /// Publish one block more than the honest chain, orphaning it.
    Override,
    /// Publish a branch as long as the honest chain and start a race.
    Match,
    /// Keep mining in private.
    Wait,
}

impl Action {
    pub const ALL: [Action; 4] =
        [Action::Adopt, Action::Override, Action::Match, Action::Wait];

    /// Whether the action may be taken in `state`. Adopting and waiting are
    /// always possible; overriding requires a strictly longer private chain
    /// and matching requires a private chain of equal, non-zero length.
    pub fn is_legal(&self, state: &State) -> bool {
        match self {
            Action::Adopt | Action::Wait => true,
            Action::Override => state.attacker > state.honest,
            Action::Match => {
                state.attacker == state.honest && state.honest >= 1
            }
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Adopt => "adopt",
            Action::Override => "override",
            Action::Match => "match",
            Action::Wait => "wait",
        };

        write!(f, "{}", name)
    }
}

/// Every action that is legal in `state`, in [`Action::ALL`] order.
pub fn legal_actions(state: &State) -> Vec<Action> {
    Action::ALL.into_iter().filter(|a| a.is_legal(state)).collect()
}

/// Mapping between action indices chosen by an agent and [`Action`]s.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ActionSpace {
    /// `0` adopt, `1` override, `2` match if legal and wait otherwise.
    #[default]
    Compact,
    /// `0` adopt, `1` override, `2` match, `3` wait.
    Full,
}

impl ActionSpace {
    pub fn len(&self) -> usize {
        match self {
            ActionSpace::Compact => 3,
            ActionSpace::Full => 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The action selected by `index` in `state`, or `None` if the index lies
    /// outside the space.
    pub fn decode(&self, index: usize, state: &State) -> Option<Action> {
        match (self, index) {
            (_, 0) => Some(Action::Adopt),
            (_, 1) => Some(Action::Override),
            (ActionSpace::Compact, 2) if Action::Match.is_legal(state) => {
                Some(Action::Match)
            }
            (ActionSpace::Compact, 2) => Some(Action::Wait),
            (ActionSpace::Full, 2) => Some(Action::Match),
            (ActionSpace::Full, 3) => Some(Action::Wait),
            _ => None,
        }
    }

    /// Index of `action` in this space.
    pub fn encode(&self, action: Action) -> usize {
        match (self, action) {
            (_, Action::Adopt) => 0,
            (_, Action::Override) => 1,
            (ActionSpace::Compact, Action::Match | Action::Wait) => 2,
            (ActionSpace::Full, Action::Match) => 2,
            (ActionSpace::Full, Action::Wait) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::state::Fork;

    use super::*;

    #[test]
    fn legality() {
        let behind = State::new(1, 2, Fork::Relevant);
        assert_eq!(legal_actions(&behind), vec![Action::Adopt, Action::Wait]);

        let tied = State::new(2, 2, Fork::Relevant);
        assert_eq!(
            legal_actions(&tied),
            vec![Action::Adopt, Action::Match, Action::Wait]
        );

        let ahead = State::new(3, 1, Fork::Irrelevant);
        assert!(Action::Override.is_legal(&ahead));
        assert!(!Action::Match.is_legal(&ahead));

        assert!(!Action::Match.is_legal(&State::default()));
    }

    #[test]
    fn compact_space_upgrades_wait() {
        let space = ActionSpace::Compact;
        let tied = State::new(1, 1, Fork::Relevant);
        let ahead = State::new(2, 1, Fork::Irrelevant);

        assert_eq!(space.decode(2, &tied), Some(Action::Match));
        assert_eq!(space.decode(2, &ahead), Some(Action::Wait));
        assert_eq!(space.decode(3, &ahead), None);
        assert_eq!(space.encode(Action::Match), 2);
    }

    #[test]
    fn full_space() {
        let space = ActionSpace::Full;
        let state = State::default();

        for (i, action) in
            [Action::Adopt, Action::Override, Action::Match, Action::Wait]
                .into_iter()
                .enumerate()
        {
            assert_eq!(space.decode(i, &state), Some(action));
            assert_eq!(space.encode(action), i);
        }
        assert_eq!(space.decode(4, &state), None);
    }
}
