/*!
Consensus rule sets under which the mining game can be played.

Every rule set implements [`Protocol`], which exposes the legal actions,
transition distribution and reward of each outcome. The dynamics are shared
through [`TransitionModel`]; protocols differ in how uncles are rewarded and
whether publishing a long private chain is penalized.

```
use mining_mdp::protocol::ProtocolKind;

let kind: ProtocolKind = "eth".parse().unwrap();
assert_eq!(kind, ProtocolKind::Ethereum);
```
*/

pub mod bitcoin;
pub mod ethereum;
pub mod ghost;
pub mod utb;

pub use bitcoin::Bitcoin;
pub use ethereum::Ethereum;
pub use ghost::Ghost;
pub use utb::Utb;

use std::{fmt::Debug, fmt::Display, str::FromStr};

use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};

use crate::{
    action::{self, Action},
    config::ConfigurationError,
    reward::Reward,
    state::{State, StateSpace, UNCLE_WINDOW},
    transition::{Events, Transition, TransitionModel},
};

/// Rule used by honest miners to pick the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainRule {
    Longest,
    Ghost,
}

/// Tag for each supported rule set.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    #[default]
    Bitcoin,
    Ghost,
    #[serde(alias = "eth")]
    Ethereum,
    Utb,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 4] = [
        ProtocolKind::Bitcoin,
        ProtocolKind::Ghost,
        ProtocolKind::Ethereum,
        ProtocolKind::Utb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolKind::Bitcoin => "bitcoin",
            ProtocolKind::Ghost => "ghost",
            ProtocolKind::Ethereum => "ethereum",
            ProtocolKind::Utb => "utb",
        }
    }

    pub fn chain_rule(&self) -> ChainRule {
        match self {
            ProtocolKind::Bitcoin | ProtocolKind::Utb => ChainRule::Longest,
            ProtocolKind::Ghost | ProtocolKind::Ethereum => ChainRule::Ghost,
        }
    }

    /// Number of heights at which orphans can be referenced as uncles.
    pub fn uncle_window(&self) -> usize {
        match self {
            ProtocolKind::Bitcoin => 0,
            _ => UNCLE_WINDOW,
        }
    }

    /// Creates the rule set for this kind. `utb_ratio` is only used by
    /// [`ProtocolKind::Utb`].
    pub fn rules(
        &self,
        model: TransitionModel,
        utb_ratio: f64,
    ) -> Box<dyn Protocol> {
        let model = TransitionModel {
            uncle_window: self.uncle_window(),
            ..model
        };
        match self {
            ProtocolKind::Bitcoin => Box::new(Bitcoin::new(model)),
            ProtocolKind::Ghost => Box::new(Ghost::new(model)),
            ProtocolKind::Ethereum => Box::new(Ethereum::new(model)),
            ProtocolKind::Utb => Box::new(Utb::new(model, utb_ratio)),
        }
    }
}

impl Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ProtocolKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitcoin" => Ok(ProtocolKind::Bitcoin),
            "ghost" => Ok(ProtocolKind::Ghost),
            "ethereum" | "eth" => Ok(ProtocolKind::Ethereum),
            "utb" => Ok(ProtocolKind::Utb),
            _ => Err(ConfigurationError::UnknownProtocol(s.into())),
        }
    }
}

/// A consensus rule set. Provides the dynamics and rewards of the mining game
/// played under it.
pub trait Protocol: Debug + DynClone + Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Dynamics shared by every rule set.
    fn model(&self) -> &TransitionModel;

    /// Space containing every state reachable under this rule set.
    fn state_space(&self) -> StateSpace {
        let model = self.model();
        StateSpace::new(model.max_hidden_block, model.uncle_window)
    }

    fn legal_actions(&self, state: &State) -> Vec<Action> {
        action::legal_actions(state)
    }

    /// Distribution over the outcomes of taking `action` in `state`.
    fn transitions(&self, state: &State, action: Action) -> Vec<Transition> {
        self.model().transitions(state, action)
    }

    /// Reward credited to each party for the given outcome.
    fn reward(&self, events: &Events) -> Reward;
}

dyn_clone::clone_trait_object!(Protocol);
