//! Opaque communicator handles for distributed teams.
//!
//! The message primitives live in the distributed runtime library linked
//! into compiled code; the core only tracks identity, rank and size.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

/// Communicator identity for one team of ranks.
#[derive(Debug)]
pub struct Transceiver {
    id: u64,
    rank: u32,
    nranks: u32,
}

impl Transceiver {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn nranks(&self) -> u32 {
        self.nranks
    }
}

static TEAMS: Lazy<Mutex<HashMap<u64, Arc<Transceiver>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers (or replaces) the transceiver backing a team id.
pub fn register_team(id: u64, rank: u32, nranks: u32) -> Arc<Transceiver> {
    let transceiver = Arc::new(Transceiver { id, rank, nranks });
    TEAMS
        .lock()
        .expect("team table poisoned")
        .insert(id, Arc::clone(&transceiver));
    transceiver
}

pub fn team_transceiver(id: u64) -> Option<Arc<Transceiver>> {
    TEAMS.lock().expect("team table poisoned").get(&id).cloned()
}

/// Collapses a requested team to 0 unless a multi-rank transceiver backs it.
pub fn mk_team(team: u64) -> u64 {
    if team != 0
        && team_transceiver(team)
            .map(|t| t.nranks() > 1)
            .unwrap_or(false)
    {
        team
    } else {
        0
    }
}
