//! Per-position history: entry point, fee accounting, APR samples and notification state.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::apr::{AprEstimate, FeeSample, FeeWindow, RollingApr};
use crate::il::{impermanent_loss, pnl_pct, price_change_pct, Holdings, IlEstimate};
use crate::pricing::Valuation;
use crate::snapshot::PositionSnapshot;
use crate::threshold::NotificationState;
use crate::types::PositionKey;

/// Relative drop in unclaimed fees treated as a collection.
const COLLECTION_TOLERANCE: f64 = 1e-9;

/// Analytics computed for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMetrics {
    pub valuation: Valuation,
    /// Value of the current composition, fees excluded
    pub composition_value: f64,
    /// Value of the unclaimed fees
    pub unclaimed_fees_value: f64,
    pub il: IlEstimate,
    pub apr: AprEstimate,
    pub pnl_pct: Option<f64>,
    pub price_change_pct: Option<f64>,
}

/// Everything remembered about a position across polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionHistory {
    pub key: PositionKey,
    pub owner: Address,
    /// First snapshot ever built, never replaced
    pub entry: PositionSnapshot,
    pub entry_valuation: Valuation,
    pub latest: PositionSnapshot,
    pub claimed_fees0: f64,
    pub claimed_fees1: f64,
    /// Unclaimed fees of the last consistent snapshot
    pub last_unclaimed0: f64,
    pub last_unclaimed1: f64,
    pub fee_window: FeeWindow,
    pub notification: NotificationState,
    pub last_metrics: Option<PositionMetrics>,
    pub first_seen: u64,
    pub last_updated: u64,
}

impl PositionHistory {
    /// Starts a history whose entry point is `snapshot`.
    pub fn new(snapshot: PositionSnapshot, valuation: Valuation) -> Self {
        Self {
            key: snapshot.key.clone(),
            owner: snapshot.owner,
            entry_valuation: valuation,
            claimed_fees0: 0.0,
            claimed_fees1: 0.0,
            last_unclaimed0: snapshot.unclaimed_fees0,
            last_unclaimed1: snapshot.unclaimed_fees1,
            fee_window: FeeWindow::default(),
            notification: NotificationState::default(),
            last_metrics: None,
            first_seen: snapshot.timestamp,
            last_updated: snapshot.timestamp,
            latest: snapshot.clone(),
            entry: snapshot,
        }
    }

    /// Fees earned so far: everything collected while tracked plus what is unclaimed now.
    pub fn cumulative_fees(&self) -> Holdings {
        Holdings::new(
            self.claimed_fees0 + self.last_unclaimed0,
            self.claimed_fees1 + self.last_unclaimed1,
        )
    }

    /// Fees earned after the entry snapshot.
    pub fn fees_since_entry(&self) -> Holdings {
        let cumulative = self.cumulative_fees();
        Holdings::new(
            (cumulative.amount0 - self.entry.unclaimed_fees0).max(0.0),
            (cumulative.amount1 - self.entry.unclaimed_fees1).max(0.0),
        )
    }

    /// Folds `snapshot` into the history and computes its analytics.
    ///
    /// A drop in unclaimed fees counts the previous unclaimed amount as
    /// collected. Snapshots flagged with a fee inconsistency leave fee
    /// accounting untouched.
    pub fn update(
        &mut self,
        snapshot: PositionSnapshot,
        valuation: &Valuation,
        apr: &RollingApr,
    ) -> PositionMetrics {
        if !snapshot.fee_inconsistency {
            self.claimed_fees0 +=
                collected(self.last_unclaimed0, snapshot.unclaimed_fees0);
            self.claimed_fees1 +=
                collected(self.last_unclaimed1, snapshot.unclaimed_fees1);
            self.last_unclaimed0 = snapshot.unclaimed_fees0;
            self.last_unclaimed1 = snapshot.unclaimed_fees1;

            let cumulative = self.cumulative_fees();
            apr.record(
                &mut self.fee_window,
                FeeSample {
                    timestamp: snapshot.timestamp,
                    fees0: cumulative.amount0,
                    fees1: cumulative.amount1,
                },
            );
        }

        let composition_value = snapshot.composition_value(valuation);
        let il = impermanent_loss(
            Holdings::new(self.entry.amount0, self.entry.amount1),
            Holdings::new(snapshot.amount0, snapshot.amount1),
            self.fees_since_entry(),
            valuation,
        );
        let entry_value = self.entry.composition_value(&self.entry_valuation);
        let metrics = PositionMetrics {
            valuation: *valuation,
            composition_value,
            unclaimed_fees_value: snapshot.fees_value(valuation),
            il,
            apr: apr.estimate(&self.fee_window, valuation, composition_value),
            pnl_pct: pnl_pct(
                entry_value,
                self.entry_valuation.unit,
                il.position_value,
                valuation.unit,
            ),
            price_change_pct: price_change_pct(self.entry.price, snapshot.price),
        };

        self.owner = snapshot.owner;
        self.last_updated = snapshot.timestamp;
        self.latest = snapshot;
        self.last_metrics = Some(metrics);
        metrics
    }
}

/// Amount collected between two unclaimed readings, zero unless fees dropped.
fn collected(previous: f64, current: f64) -> f64 {
    if current < previous - previous * COLLECTION_TOLERANCE {
        previous
    } else {
        0.0
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
