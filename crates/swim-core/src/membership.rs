//! Membership log for tracking cluster members.
//!
//! The membership log is the replicated data structure behind SWIM. It tracks:
//! - Members believed to be alive
//! - Members declared failed
//! - Pending updates to piggyback on outgoing probes, bounded by gossip rounds
//!
//! A log is owned by a single node. Peers converge by merging each other's
//! pending updates; a joining node adopts a full snapshot once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("No candidate members left after exclusion")]
    EmptyCandidateSet,
}

/// A node in the cluster.
///
/// `address` is the unique key. `name` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub address: String,
}

impl Member {
    /// Create a new member.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Create a member named after its own address.
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
        }
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() || self.name == self.address {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.name, self.address)
        }
    }
}

/// Kind of membership change carried by an [`Update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateKind {
    Joined,
    Failed,
}

/// A change to the member list, piggybacked on probes until its rounds run out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub member: Member,
    pub kind: UpdateKind,
    /// Number of gossip cycles this update has been carried for
    pub round: u32,
}

impl Update {
    /// Create a fresh `Joined` update.
    pub fn joined(member: Member) -> Self {
        Self {
            member,
            kind: UpdateKind::Joined,
            round: 0,
        }
    }

    /// Create a fresh `Failed` update.
    pub fn failed(member: Member) -> Self {
        Self {
            member,
            kind: UpdateKind::Failed,
            round: 0,
        }
    }
}

/// Membership state of a single node.
///
/// Invariants:
/// - An address is in at most one of `alive` / `failed`.
/// - Every effective `add`/`remove` appends exactly one round-0 update.
///   Updates are never deduplicated across history, so a member that joins,
///   fails and rejoins leaves three updates behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipLog {
    alive: HashMap<String, Member>,
    failed: HashMap<String, Member>,
    pending: Vec<Update>,
    max_rounds: u32,
}

impl MembershipLog {
    /// Create an empty log whose updates live for `max_rounds` gossip cycles.
    pub fn new(max_rounds: u32) -> Self {
        Self {
            alive: HashMap::new(),
            failed: HashMap::new(),
            pending: Vec::new(),
            max_rounds,
        }
    }

    /// Add a member to the alive set.
    ///
    /// Returns true if the member was not already alive. A stale failed entry
    /// for the same address is cleared.
    pub fn add(&mut self, member: Member) -> bool {
        if self.alive.contains_key(&member.address) {
            return false;
        }

        self.failed.remove(&member.address);
        self.alive.insert(member.address.clone(), member.clone());
        self.pending.push(Update::joined(member));
        true
    }

    /// Move a member from the alive set to the failed set.
    ///
    /// Returns true if the member was alive.
    pub fn remove(&mut self, member: &Member) -> bool {
        let Some(existing) = self.alive.remove(&member.address) else {
            return false;
        };

        self.pending.push(Update::failed(existing.clone()));
        self.failed.insert(existing.address.clone(), existing);
        true
    }

    /// Apply updates received from a peer, in order.
    ///
    /// Rounds on incoming updates are ignored; every effective change is
    /// re-queued locally at round 0.
    pub fn merge(&mut self, updates: &[Update]) {
        for update in updates {
            match update.kind {
                UpdateKind::Joined => {
                    self.add(update.member.clone());
                }
                UpdateKind::Failed => {
                    self.remove(&update.member);
                }
            }
        }
    }

    /// Age every pending update by one gossip round.
    ///
    /// Updates that reach `max_rounds` are dropped.
    pub fn advance_round(&mut self) {
        let max_rounds = self.max_rounds;
        self.pending.retain_mut(|update| {
            update.round = update.round.saturating_add(1);
            update.round < max_rounds
        });
    }

    /// Pick up to `k` distinct random alive members, skipping `excluding`.
    ///
    /// Returns every candidate when fewer than `k` remain.
    pub fn random_others(
        &self,
        k: usize,
        excluding: &[&Member],
    ) -> Result<Vec<Member>, MembershipError> {
        use rand::seq::SliceRandom;

        let mut candidates: Vec<&Member> = self
            .alive
            .values()
            .filter(|m| !excluding.iter().any(|e| e.address == m.address))
            .collect();

        if candidates.is_empty() {
            return Err(MembershipError::EmptyCandidateSet);
        }

        candidates.shuffle(&mut rand::rng());
        candidates.truncate(k);
        Ok(candidates.into_iter().cloned().collect())
    }

    /// Get an alive member by address.
    pub fn get(&self, address: &str) -> Option<&Member> {
        self.alive.get(address)
    }

    pub fn is_alive(&self, address: &str) -> bool {
        self.alive.contains_key(address)
    }

    pub fn is_failed(&self, address: &str) -> bool {
        self.failed.contains_key(address)
    }

    /// All alive members.
    pub fn alive(&self) -> impl Iterator<Item = &Member> {
        self.alive.values()
    }

    /// All failed members.
    pub fn failed(&self) -> impl Iterator<Item = &Member> {
        self.failed.values()
    }

    /// Pending updates, oldest first.
    pub fn pending(&self) -> &[Update] {
        &self.pending
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Number of alive members.
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }
}
