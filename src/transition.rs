/*!
Transition dynamics of the selfish mining game.

A step is resolved in two phases. The attacker's action is applied first as a
deterministic rewrite of the state (adopting, overriding or matching). A
single block is then found: by the attacker with probability `alpha`, or by
the honest network otherwise. An honest block is stale with probability
`stale_rate`, in which case it extends no chain. During an active race an
honest block lands on the attacker's branch with probability `gamma`.

Chains longer than the depth bound trigger an implicit adopt, which keeps
every reachable state inside the [`StateSpace`](crate::state::StateSpace).
*/

use log::trace;

use crate::{
    action::Action,
    state::{Fork, Party, State, UncleSlots},
};

/// Outcome of a single transition, used to compute rewards.
#[derive(Debug, Clone, PartialEq)]
pub struct Events {
    /// The action which was actually applied.
    pub action: Action,
    /// Whether the requested action was illegal and replaced by
    /// [`Action::Wait`].
    pub illegal: bool,
    /// Attacker blocks which became part of the canonical chain.
    pub attacker_blocks: u32,
    /// Honest blocks which became part of the canonical chain.
    pub honest_blocks: u32,
    /// Length of the private chain published by an override.
    pub hidden: u32,
    /// Owners of blocks which were orphaned, in order of orphaning.
    pub orphans: Vec<Party>,
    /// Uncles referenced by the newly canonical blocks, as
    /// `(owner, depth)` pairs.
    pub uncles: Vec<(Party, u8)>,
    /// Owner of the block which included `uncles`.
    pub nephew: Option<Party>,
    /// Whether the honest block of this step was stale.
    pub stale: bool,
    /// Whether the depth bound forced the attacker to adopt.
    pub forced_adopt: bool,
}

impl Events {
    fn new(action: Action, illegal: bool) -> Self {
        Events {
            action,
            illegal,
            attacker_blocks: 0,
            honest_blocks: 0,
            hidden: 0,
            orphans: vec![],
            uncles: vec![],
            nephew: None,
            stale: false,
            forced_adopt: false,
        }
    }

    /// Whether any block became canonical.
    pub fn credited(&self) -> bool {
        self.attacker_blocks + self.honest_blocks > 0
    }

    /// Credits the honest chain and discards the private one.
    fn adopt(&mut self, state: &State) {
        self.honest_blocks += state.honest;
        if state.attacker >= 1 {
            self.orphans.push(Party::Attacker);
        }
    }
}

/// A possible next state together with its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub probability: f64,
    pub next: State,
    pub events: Events,
}

/// Parameters of the mining game which determine its dynamics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionModel {
    /// Share of the total mining power held by the attacker.
    pub alpha: f64,
    /// Share of the honest network which mines on the attacker's branch
    /// during a race.
    pub gamma: f64,
    /// Probability that an honest block goes stale.
    pub stale_rate: f64,
    pub max_hidden_block: u32,
    /// Number of heights at which orphans can be included as uncles.
    pub uncle_window: usize,
}

impl TransitionModel {
    pub fn new(
        alpha: f64,
        gamma: f64,
        stale_rate: f64,
        max_hidden_block: u32,
        uncle_window: usize,
    ) -> Self {
        TransitionModel {
            alpha,
            gamma,
            stale_rate,
            max_hidden_block,
            uncle_window,
        }
    }

    /// Every outcome of taking `action` in `state`. Outcomes with zero
    /// probability are omitted and the remaining probabilities sum to one.
    ///
    /// Illegal actions are replaced by [`Action::Wait`].
    pub fn transitions(
        &self,
        state: &State,
        action: Action,
    ) -> Vec<Transition> {
        let illegal = !action.is_legal(state);
        let action = if illegal {
            trace!("{} is illegal in state {}, waiting instead", action, state);
            Action::Wait
        } else {
            action
        };

        let mut events = Events::new(action, illegal);
        let (attacker, honest, fork) = match action {
            Action::Adopt => {
                events.adopt(state);
                (0, 0, Fork::Irrelevant)
            }
            Action::Override => {
                events.attacker_blocks += state.honest + 1;
                events.hidden = state.attacker;
                if state.honest >= 1 {
                    events.orphans.push(Party::Honest);
                }
                (state.attacker - state.honest - 1, 0, Fork::Irrelevant)
            }
            Action::Match => (state.attacker, state.honest, Fork::Active),
            Action::Wait => (state.attacker, state.honest, state.fork),
        };

        let mut outcomes = Vec::with_capacity(4);
        let mut push = |probability: f64, next: (u32, u32, Fork), events| {
            if probability > 0.0 {
                outcomes.push(self.finish(state, probability, next, events));
            }
        };

        let after_attacker = match fork {
            Fork::Active => Fork::Active,
            _ => Fork::Irrelevant,
        };
        push(
            self.alpha,
            (attacker + 1, honest, after_attacker),
            events.clone(),
        );

        let mut honest_mass = 1.0 - self.alpha;
        if self.stale_rate > 0.0 {
            let mut stale = events.clone();
            stale.stale = true;
            stale.orphans.push(Party::Honest);
            let probability = honest_mass * self.stale_rate;
            push(probability, (attacker, honest, fork), stale);
            honest_mass *= 1.0 - self.stale_rate;
        }

        match fork {
            Fork::Active => {
                let mut on_attacker = events.clone();
                on_attacker.attacker_blocks += honest;
                if honest >= 1 {
                    on_attacker.orphans.push(Party::Honest);
                }
                push(
                    honest_mass * self.gamma,
                    (attacker.saturating_sub(honest), 1, Fork::Relevant),
                    on_attacker,
                );
                push(
                    honest_mass * (1.0 - self.gamma),
                    (attacker, honest + 1, Fork::Relevant),
                    events,
                );
            }
            _ => {
                let next = (attacker, honest + 1, Fork::Relevant);
                push(honest_mass, next, events);
            }
        }

        outcomes
    }

    /// Enforces the depth bound and updates the uncle slots.
    fn finish(
        &self,
        origin: &State,
        probability: f64,
        (attacker, honest, fork): (u32, u32, Fork),
        mut events: Events,
    ) -> Transition {
        let mut next = State::new(attacker, honest, fork);
        if attacker > self.max_hidden_block || honest > self.max_hidden_block {
            trace!("depth bound reached in {}, adopting", next);
            events.adopt(&next);
            events.forced_adopt = true;
            next = State::new(0, 0, Fork::Irrelevant);
        }

        if self.uncle_window > 0 {
            next.uncles = self.update_uncles(origin.uncles, &mut events);
        }

        Transition { probability, next, events }
    }

    fn update_uncles(
        &self,
        mut slots: UncleSlots,
        events: &mut Events,
    ) -> UncleSlots {
        if events.credited() && !slots.is_empty() {
            events.uncles = slots.drain();
            events.nephew = Some(if events.attacker_blocks > 0 {
                Party::Attacker
            } else {
                Party::Honest
            });
        }

        slots.age(self.uncle_window);
        for owner in events.orphans.iter() {
            slots.insert(*owner, self.uncle_window);
        }

        slots
    }
}
