//! Per-step rewards and running episode totals.

use serde::Serialize;

use crate::{state::Party, transition::Events};

/// Reward credited to each party by a single transition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Reward {
    pub attacker: f64,
    pub honest: f64,
    /// Attacker reward before any protocol penalty was applied.
    pub base_attacker: f64,
}

impl Reward {
    /// One unit of reward for every block that became canonical.
    pub fn blocks(events: &Events) -> Self {
        let attacker = events.attacker_blocks as f64;

        Reward {
            attacker,
            honest: events.honest_blocks as f64,
            base_attacker: attacker,
        }
    }

    /// Adds `amount` to the reward of `party`, including the attacker's base
    /// reward.
    pub fn credit(&mut self, party: Party, amount: f64) {
        match party {
            Party::Attacker => {
                self.attacker += amount;
                self.base_attacker += amount;
            }
            Party::Honest => self.honest += amount,
        }
    }

    /// Amount taken from the attacker by protocol penalties.
    pub fn penalty(&self) -> f64 {
        self.base_attacker - self.attacker
    }
}

/// Totals accumulated over an episode.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RewardTracker {
    /// Canonical blocks mined by the attacker.
    pub attacker_blocks: u64,
    /// Canonical blocks mined by the honest network.
    pub honest_blocks: u64,
    pub attacker_reward: f64,
    pub honest_reward: f64,
    pub attacker_orphans: u64,
    pub honest_orphans: u64,
    pub attacker_uncles: u64,
    pub honest_uncles: u64,
    pub stale_blocks: u64,
    pub forced_adopts: u64,
    /// Total reward withheld from the attacker by penalties.
    pub penalty: f64,
}

impl RewardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, events: &Events, reward: &Reward) {
        self.attacker_blocks += events.attacker_blocks as u64;
        self.honest_blocks += events.honest_blocks as u64;
        self.attacker_reward += reward.attacker;
        self.honest_reward += reward.honest;
        self.penalty += reward.penalty();

        for orphan in events.orphans.iter() {
            match orphan {
                Party::Attacker => self.attacker_orphans += 1,
                Party::Honest => self.honest_orphans += 1,
            }
        }
        for (owner, _) in events.uncles.iter() {
            match owner {
                Party::Attacker => self.attacker_uncles += 1,
                Party::Honest => self.honest_uncles += 1,
            }
        }
        self.stale_blocks += u64::from(events.stale);
        self.forced_adopts += u64::from(events.forced_adopt);
    }

    /// Attacker's share of all reward handed out so far, or `None` if nothing
    /// has been handed out.
    pub fn reward_fraction(&self) -> Option<f64> {
        let total = self.attacker_reward + self.honest_reward;
        if total > 0.0 {
            Some(self.attacker_reward / total)
        } else {
            None
        }
    }

    /// Attacker's share of the canonical chain, or `None` if no block is
    /// canonical yet.
    pub fn block_fraction(&self) -> Option<f64> {
        let total = self.attacker_blocks + self.honest_blocks;
        if total > 0 {
            Some(self.attacker_blocks as f64 / total as f64)
        } else {
            None
        }
    }
}
