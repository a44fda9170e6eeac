/*!
States of the selfish mining game and their dense integer indexing.

A [`State`] records how far the attacker's private chain and the public honest
chain have grown since their last common block, whether a race between them
is possible, and (for protocols with uncle rewards) which recently orphaned
blocks may still be referenced as uncles.

[`StateSpace`] enumerates every state reachable under a depth bound and maps
each one to a stable index in `0..len()`:

```
use mining_mdp::state::{Fork, State, StateSpace};

let space = StateSpace::new(20, 0);
let state = State::new(3, 1, Fork::Relevant);
let index = space.index_of(&state).unwrap();

assert_eq!(space.state_of(index).unwrap(), state);
```
*/

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Number of past heights at which an orphaned block can still be included
/// as an uncle.
pub const UNCLE_WINDOW: usize = 6;

/// Digits used to encode a single uncle slot (empty, attacker, honest).
const SLOT_RADIX: usize = 3;

/// Number of [`Fork`] variants.
const FORK_STATES: usize = 3;

/// One of the two participants in the mining game.
#[derive(
    Debug,
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
pub enum Party {
    Attacker,
    Honest,
}

/// Status of the fork between the attacker's chain and the public chain.
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
pub enum Fork {
    /// No race is possible; the last block was mined by the attacker or the
    /// chains were just reconciled.
    #[default]
    Irrelevant,
    /// The last block was honest, so publishing a matching branch would start
    /// a race.
    Relevant,
    /// The attacker has published a branch matching the honest chain and the
    /// network is split between the two.
    Active,
}

impl Fork {
    pub const ALL: [Fork; FORK_STATES] =
        [Fork::Irrelevant, Fork::Relevant, Fork::Active];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Fork> {
        Self::ALL.get(index).copied()
    }
}

/// Owners of orphaned blocks that can still be referenced as uncles. Slot `i`
/// holds a block which would be included at depth `i + 1`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct UncleSlots([Option<Party>; UNCLE_WINDOW]);

impl UncleSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: usize) -> Option<Party> {
        self.0.get(slot).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn len(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    /// Pending uncles as `(owner, depth)` pairs, shallowest first.
    pub fn pending(&self) -> impl Iterator<Item = (Party, u8)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|owner| (owner, i as u8 + 1)))
    }

    /// Removes and returns every pending uncle.
    pub fn drain(&mut self) -> Vec<(Party, u8)> {
        let uncles = self.pending().collect();
        self.0 = [None; UNCLE_WINDOW];

        uncles
    }

    /// Moves every uncle one height further from the tip. Uncles that leave a
    /// window of size `window` are dropped.
    pub fn age(&mut self, window: usize) {
        let window = window.min(UNCLE_WINDOW);
        for i in (1..UNCLE_WINDOW).rev() {
            self.0[i] = if i < window { self.0[i - 1] } else { None };
        }
        self.0[0] = None;
    }

    /// Stores an orphan in the lowest free slot of the window. Returns `false`
    /// if the window is full.
    pub fn insert(&mut self, owner: Party, window: usize) -> bool {
        let window = window.min(UNCLE_WINDOW);
        match self.0[..window].iter().position(Option::is_none) {
            Some(free) => {
                self.0[free] = Some(owner);
                true
            }
            None => false,
        }
    }

    /// Base-3 code of the slots, least significant slot first.
    fn code(&self) -> usize {
        self.0
            .iter()
            .rev()
            .fold(0, |acc, slot| acc * SLOT_RADIX + slot_digit(*slot))
    }

    fn from_code(mut code: usize) -> Self {
        let mut slots = [None; UNCLE_WINDOW];
        for slot in slots.iter_mut() {
            *slot = digit_slot(code % SLOT_RADIX);
            code /= SLOT_RADIX;
        }

        UncleSlots(slots)
    }

    /// Index of the highest occupied slot plus one.
    fn extent(&self) -> usize {
        self.0.iter().rposition(Option::is_some).map_or(0, |i| i + 1)
    }
}

fn slot_digit(slot: Option<Party>) -> usize {
    match slot {
        None => 0,
        Some(Party::Attacker) => 1,
        Some(Party::Honest) => 2,
    }
}

fn digit_slot(digit: usize) -> Option<Party> {
    match digit {
        1 => Some(Party::Attacker),
        2 => Some(Party::Honest),
        _ => None,
    }
}

/// A single state of the selfish mining game.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct State {
    /// Blocks on the attacker's private chain since the last common block.
    pub attacker: u32,
    /// Blocks on the public honest chain since the last common block.
    pub honest: u32,
    pub fork: Fork,
    pub uncles: UncleSlots,
}

impl State {
    pub fn new(attacker: u32, honest: u32, fork: Fork) -> Self {
        State { attacker, honest, fork, uncles: UncleSlots::new() }
    }

    pub fn with_uncles(mut self, uncles: UncleSlots) -> Self {
        self.uncles = uncles;

        self
    }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {:?})", self.attacker, self.honest, self.fork)?;
        if !self.uncles.is_empty() {
            let owners: Vec<_> = (0..UNCLE_WINDOW)
                .map(|i| match self.uncles.get(i) {
                    None => '.',
                    Some(Party::Attacker) => 'a',
                    Some(Party::Honest) => 'h',
                })
                .collect();
            write!(f, " [{}]", String::from_iter(owners))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateSpaceError {
    #[error("state {0} lies outside the state space")]
    OutOfRange(State),
    #[error("index {index} is out of range for a state space of size {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("feature vector of length {0} does not describe a state")]
    MalformedFeatures(usize),
}

/// Every state with both chain lengths at most `max_hidden_block`, together
/// with a dense index over them.
///
/// States are ordered by attacker length, then honest length, then fork
/// status, then uncle slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateSpace {
    max_hidden_block: u32,
    uncle_window: usize,
}

impl StateSpace {
    /// Creates the space of states bounded by `max_hidden_block`. Windows
    /// larger than [`UNCLE_WINDOW`] are truncated.
    pub fn new(max_hidden_block: u32, uncle_window: usize) -> Self {
        StateSpace {
            max_hidden_block,
            uncle_window: uncle_window.min(UNCLE_WINDOW),
        }
    }

    pub fn max_hidden_block(&self) -> u32 {
        self.max_hidden_block
    }

    pub fn uncle_window(&self) -> usize {
        self.uncle_window
    }

    /// The state every episode starts in.
    pub fn initial(&self) -> State {
        State::default()
    }

    fn side(&self) -> usize {
        self.max_hidden_block as usize + 1
    }

    fn uncle_codes(&self) -> usize {
        SLOT_RADIX.pow(self.uncle_window as u32)
    }

    /// Number of states in the space.
    pub fn len(&self) -> usize {
        self.side() * self.side() * FORK_STATES * self.uncle_codes()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, state: &State) -> bool {
        state.attacker <= self.max_hidden_block
            && state.honest <= self.max_hidden_block
            && state.uncles.extent() <= self.uncle_window
    }

    pub fn index_of(&self, state: &State) -> Result<usize, StateSpaceError> {
        if !self.contains(state) {
            return Err(StateSpaceError::OutOfRange(*state));
        }

        Ok(self.index_of_unchecked(state))
    }

    /// Index of `state` without checking that it lies in the space. The
    /// result is meaningless for states outside the space.
    pub fn index_of_unchecked(&self, state: &State) -> usize {
        let leads =
            state.attacker as usize * self.side() + state.honest as usize;
        let forked = leads * FORK_STATES + state.fork.index();

        forked * self.uncle_codes() + state.uncles.code()
    }

    pub fn state_of(&self, index: usize) -> Result<State, StateSpaceError> {
        let len = self.len();
        if index >= len {
            return Err(StateSpaceError::IndexOutOfRange { index, len });
        }

        let code = index % self.uncle_codes();
        let rest = index / self.uncle_codes();
        let fork = Fork::ALL[rest % FORK_STATES];
        let leads = rest / FORK_STATES;

        Ok(State {
            attacker: (leads / self.side()) as u32,
            honest: (leads % self.side()) as u32,
            fork,
            uncles: UncleSlots::from_code(code),
        })
    }

    /// Iterates over every state in index order.
    pub fn iter(&self) -> impl Iterator<Item = State> + '_ {
        (0..self.len()).filter_map(|index| self.state_of(index).ok())
    }

    /// Collects every state in index order.
    pub fn enumerate(&self) -> Vec<State> {
        self.iter().collect()
    }

    /// Number of entries in the feature encoding of a state.
    pub fn feature_len(&self, know_alpha: bool) -> usize {
        3 + usize::from(know_alpha) + self.uncle_window
    }

    /// Encodes `state` as `[attacker, honest, fork, alpha?, slots...]`, where
    /// slots are `0` (empty), `1` (attacker) or `2` (honest).
    pub fn features(&self, state: &State, alpha: Option<f64>) -> Vec<f32> {
        let mut features =
            Vec::with_capacity(self.feature_len(alpha.is_some()));
        features.push(state.attacker as f32);
        features.push(state.honest as f32);
        features.push(state.fork.index() as f32);
        if let Some(alpha) = alpha {
            features.push(alpha as f32);
        }
        for slot in 0..self.uncle_window {
            features.push(slot_digit(state.uncles.get(slot)) as f32);
        }

        features
    }

    /// Lower and upper bounds of each entry produced by
    /// [`StateSpace::features`].
    pub fn feature_bounds(&self, know_alpha: bool) -> (Vec<f32>, Vec<f32>) {
        let low = vec![0.0; self.feature_len(know_alpha)];
        let mut high = vec![
            self.max_hidden_block as f32,
            self.max_hidden_block as f32,
            (FORK_STATES - 1) as f32,
        ];
        if know_alpha {
            high.push(0.5);
        }
        high.extend(
            std::iter::repeat((SLOT_RADIX - 1) as f32).take(self.uncle_window),
        );

        (low, high)
    }

    /// Decodes a feature vector produced by [`StateSpace::features`].
    pub fn state_of_features(
        &self,
        features: &[f32],
        know_alpha: bool,
    ) -> Result<State, StateSpaceError> {
        if features.len() != self.feature_len(know_alpha) {
            return Err(StateSpaceError::MalformedFeatures(features.len()));
        }

        let fork = Fork::from_index(features[2] as usize)
            .ok_or(StateSpaceError::MalformedFeatures(features.len()))?;
        let mut uncles = UncleSlots::new();
        let offset = 3 + usize::from(know_alpha);
        for (slot, digit) in features[offset..].iter().enumerate() {
            uncles.0[slot] = digit_slot(*digit as usize);
        }

        let state = State {
            attacker: features[0] as u32,
            honest: features[1] as u32,
            fork,
            uncles,
        };
        if !self.contains(&state) {
            return Err(StateSpaceError::OutOfRange(state));
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn space_size() {
        assert_eq!(StateSpace::new(20, 0).len(), 21 * 21 * 3);
        assert_eq!(StateSpace::new(2, 2).len(), 3 * 3 * 3 * 9);
    }

    #[test]
    fn enumeration_order() {
        let space = StateSpace::new(1, 0);
        let states = space.enumerate();

        assert_eq!(states.len(), space.len());
        assert_eq!(states[0], State::new(0, 0, Fork::Irrelevant));
        assert_eq!(states[1], State::new(0, 0, Fork::Relevant));
        assert_eq!(states[3], State::new(0, 1, Fork::Irrelevant));
        assert_eq!(states[6], State::new(1, 0, Fork::Irrelevant));
    }

    #[test]
    fn every_index_round_trips() {
        let space = StateSpace::new(3, 2);
        for index in 0..space.len() {
            let state = space.state_of(index).unwrap();
            assert_eq!(space.index_of(&state).unwrap(), index);
        }
    }

    #[test]
    fn out_of_range() {
        let space = StateSpace::new(5, 0);

        assert!(matches!(
            space.index_of(&State::new(6, 0, Fork::Irrelevant)),
            Err(StateSpaceError::OutOfRange(_))
        ));
        assert!(matches!(
            space.state_of(space.len()),
            Err(StateSpaceError::IndexOutOfRange { .. })
        ));

        let mut uncles = UncleSlots::new();
        uncles.insert(Party::Honest, UNCLE_WINDOW);
        let state = State::new(0, 0, Fork::Irrelevant).with_uncles(uncles);
        assert!(space.index_of(&state).is_err());
    }

    #[test]
    fn uncle_slots_age_and_fill() {
        let mut slots = UncleSlots::new();
        assert!(slots.insert(Party::Honest, 2));
        assert!(slots.insert(Party::Attacker, 2));
        assert!(!slots.insert(Party::Attacker, 2));

        slots.age(2);
        assert_eq!(slots.get(0), None);
        assert_eq!(slots.get(1), Some(Party::Honest));
        assert_eq!(slots.len(), 1);

        slots.insert(Party::Attacker, 2);
        assert_eq!(
            slots.drain(),
            vec![(Party::Attacker, 1), (Party::Honest, 2)]
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn features_round_trip() {
        let space = StateSpace::new(10, UNCLE_WINDOW);
        let mut uncles = UncleSlots::new();
        uncles.insert(Party::Honest, UNCLE_WINDOW);
        uncles.age(UNCLE_WINDOW);
        let state = State::new(4, 2, Fork::Active).with_uncles(uncles);

        let features = space.features(&state, Some(0.25));
        assert_eq!(features.len(), space.feature_len(true));
        assert_eq!(&features[..4], &[4.0, 2.0, 2.0, 0.25]);
        assert_eq!(space.state_of_features(&features, true).unwrap(), state);

        let (low, high) = space.feature_bounds(true);
        assert!(features
            .iter()
            .zip(low.iter().zip(high.iter()))
            .all(|(x, (lo, hi))| lo <= x && x <= hi));
    }

    proptest! {
        #[test]
        fn index_round_trip(
            attacker in 0u32..=12,
            honest in 0u32..=12,
            fork in 0usize..3,
            code in 0usize..729,
        ) {
            let space = StateSpace::new(12, UNCLE_WINDOW);
            let state = State {
                attacker,
                honest,
                fork: Fork::ALL[fork],
                uncles: UncleSlots::from_code(code),
            };
            let index = space.index_of(&state).unwrap();

            prop_assert_eq!(space.state_of(index).unwrap(), state);
        }
    }
}
