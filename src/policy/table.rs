use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    action::Action,
    config::ConfigLoadError,
    env::Observation,
    state::{State, StateSpace},
};

use super::Policy;

/// Fixed action per state, keyed by state index. States without an entry
/// adopt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePolicy {
    pub max_hidden_block: u32,
    pub uncle_window: usize,
    pub actions: BTreeMap<usize, Action>,
}

impl TablePolicy {
    pub fn new(space: &StateSpace) -> Self {
        TablePolicy {
            max_hidden_block: space.max_hidden_block(),
            uncle_window: space.uncle_window(),
            actions: BTreeMap::new(),
        }
    }

    pub fn state_space(&self) -> StateSpace {
        StateSpace::new(self.max_hidden_block, self.uncle_window)
    }

    pub fn insert(&mut self, state: &State, action: Action) {
        if let Ok(index) = self.state_space().index_of(state) {
            self.actions.insert(index, action);
        }
    }

    pub fn get(&self, state: &State) -> Option<Action> {
        let index = self.state_space().index_of(state).ok()?;

        self.actions.get(&index).copied()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reads a table saved with [`TablePolicy::to_json`].
    pub fn from_json_file<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, ConfigLoadError> {
        let json = fs::read_to_string(path)?;

        Ok(serde_json::from_str(&json)?)
    }
}

impl Policy for TablePolicy {
    fn name(&self) -> String {
        "Table".into()
    }

    fn predict(&mut self, _observation: &Observation, state: &State) -> Action {
        self.get(state).unwrap_or(Action::Adopt)
    }
}
