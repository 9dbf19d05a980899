//! Position set reconciliation.
//!
//! Each poll enumerates the position NFTs of every (DEX, wallet) pair. The
//! [`Reconciler`] diffs those sets against the tracked histories and owns the
//! histories themselves.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use alloy::primitives::{Address, U256};

use crate::history::PositionHistory;
use crate::pricing::Valuation;
use crate::snapshot::PositionSnapshot;
use crate::types::PositionKey;

/// Enumeration result of one (DEX, wallet) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairScan {
    pub dex: String,
    pub wallet: Address,
    /// Live position ids, `None` when the enumeration failed
    pub live: Option<BTreeSet<U256>>,
}

impl PairScan {
    pub fn complete(dex: impl Into<String>, wallet: Address, live: BTreeSet<U256>) -> Self {
        Self {
            dex: dex.into(),
            wallet,
            live: Some(live),
        }
    }

    pub fn failed(dex: impl Into<String>, wallet: Address) -> Self {
        Self {
            dex: dex.into(),
            wallet,
            live: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Live positions without a history yet, with their owner
    pub new: Vec<(PositionKey, Address)>,
    /// Live positions with a history
    pub continuing: Vec<PositionKey>,
    /// Histories removed because their position is gone
    pub closed: Vec<PositionHistory>,
    /// Histories kept because their pair could not be scanned this cycle
    pub deferred: Vec<PositionKey>,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    histories: BTreeMap<PositionKey, PositionHistory>,
}

impl Reconciler {
    pub fn from_histories(histories: impl IntoIterator<Item = PositionHistory>) -> Self {
        Self {
            histories: histories
                .into_iter()
                .map(|history| (history.key.clone(), history))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn get(&self, key: &PositionKey) -> Option<&PositionHistory> {
        self.histories.get(key)
    }

    pub fn get_mut(&mut self, key: &PositionKey) -> Option<&mut PositionHistory> {
        self.histories.get_mut(key)
    }

    pub fn histories(&self) -> impl Iterator<Item = &PositionHistory> {
        self.histories.values()
    }

    /// Classifies live and tracked positions.
    ///
    /// A history disappears only when the pair that owns it scanned
    /// successfully and no successful scan of its DEX still lists it. Running
    /// the same scans twice yields no new closures.
    pub fn reconcile(&mut self, scans: &[PairScan]) -> ReconcileOutcome {
        let mut live: BTreeMap<PositionKey, Address> = BTreeMap::new();
        let mut scanned: HashSet<(&str, Address)> = HashSet::new();
        for scan in scans {
            if let Some(ids) = &scan.live {
                scanned.insert((scan.dex.as_str(), scan.wallet));
                for id in ids {
                    live.insert(PositionKey::new(scan.dex.clone(), *id), scan.wallet);
                }
            }
        }

        let mut outcome = ReconcileOutcome::default();
        for (key, owner) in &live {
            if self.histories.contains_key(key) {
                outcome.continuing.push(key.clone());
            } else {
                outcome.new.push((key.clone(), *owner));
            }
        }

        let missing: Vec<PositionKey> = self
            .histories
            .iter()
            .filter(|(key, _)| !live.contains_key(*key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in missing {
            let owner_scanned = self
                .histories
                .get(&key)
                .is_some_and(|history| scanned.contains(&(key.dex.as_str(), history.owner)));
            if owner_scanned {
                if let Some(history) = self.histories.remove(&key) {
                    outcome.closed.push(history);
                }
            } else {
                outcome.deferred.push(key);
            }
        }

        outcome
    }

    /// Returns the history of `snapshot`'s position, creating it with
    /// `snapshot` as entry point when the position is new.
    pub fn admit(
        &mut self,
        snapshot: &PositionSnapshot,
        valuation: &Valuation,
    ) -> (&mut PositionHistory, bool) {
        let mut created = false;
        let history = self
            .histories
            .entry(snapshot.key.clone())
            .or_insert_with(|| {
                created = true;
                PositionHistory::new(snapshot.clone(), *valuation)
            });
        (history, created)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
