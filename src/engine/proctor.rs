// src/engine/proctor.rs

use std::collections::BTreeMap;

use dashmap::DashMap;

/// Result of recording one focus-loss event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strike {
    pub strikes: u32,
    pub flagged: bool,
}

/// Focus-loss strikes per participant. A side channel only: nothing here
/// influences the session timeline or the answer ledger.
#[derive(Debug)]
pub struct ProctorLog {
    strikes: DashMap<String, u32>,
    limit: u32,
}

impl ProctorLog {
    pub fn new(limit: u32) -> Self {
        Self {
            strikes: DashMap::new(),
            limit: limit.max(1),
        }
    }

    /// First strike warns; reaching the limit flags the participant.
    pub fn record_focus_loss(&self, user_id: &str) -> Strike {
        let mut count = self.strikes.entry(user_id.to_string()).or_insert(0);
        *count += 1;
        Strike {
            strikes: *count,
            flagged: *count >= self.limit,
        }
    }

    pub fn strikes(&self, user_id: &str) -> u32 {
        self.strikes.get(user_id).map_or(0, |c| *c)
    }

    /// Strike count of every participant with at least one strike.
    pub fn counts(&self) -> BTreeMap<String, u32> {
        self.strikes
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn flagged(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .strikes
            .iter()
            .filter(|e| *e.value() >= self.limit)
            .map(|e| e.key().clone())
            .collect();
        users.sort();
        users
    }
}
