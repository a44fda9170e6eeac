//! Longest-chain rule without uncle rewards.

use crate::{
    reward::Reward,
    transition::{Events, TransitionModel},
};

use super::{Protocol, ProtocolKind};

/// Bitcoin's rule set: one unit of reward per canonical block.
#[derive(Debug, Clone)]
pub struct Bitcoin {
    model: TransitionModel,
}

impl Bitcoin {
    pub fn new(model: TransitionModel) -> Self {
        Bitcoin { model }
    }
}

impl Protocol for Bitcoin {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Bitcoin
    }

    fn model(&self) -> &TransitionModel {
        &self.model
    }

    fn reward(&self, events: &Events) -> Reward {
        Reward::blocks(events)
    }
}
