//! Impermanent loss and PnL against the entry snapshot.

use serde::{Deserialize, Serialize};

use crate::pricing::{Valuation, ValuationUnit};
use crate::snapshot::PositionSnapshot;

/// Most efficiency points impermanent loss can cost.
const MAX_IL_PENALTY: f64 = 30.0;
const OUT_OF_RANGE_PENALTY: f64 = 40.0;
/// Edge distance, in percent of the range width, below which efficiency drops.
const EDGE_PENALTY_START_PCT: f64 = 10.0;
/// Floor of a full-range position's efficiency.
const FULL_RANGE_EFFICIENCY: f64 = 75.0;

/// A pair of token amounts in whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Holdings {
    pub amount0: f64,
    pub amount1: f64,
}

impl Holdings {
    pub fn new(amount0: f64, amount1: f64) -> Self {
        Self { amount0, amount1 }
    }

    pub fn value(&self, valuation: &Valuation) -> f64 {
        valuation.value(self.amount0, self.amount1)
    }
}

/// Position performance relative to holding the entry amounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IlEstimate {
    /// Entry amounts valued at current prices
    pub hodl_value: f64,
    /// Current composition plus fees earned since entry
    pub position_value: f64,
    pub fees_value: f64,
    /// Positive when the position outperforms holding
    pub il_pct: f64,
    pub il_absolute: f64,
    pub unit: ValuationUnit,
}

/// Compares the position, fees included, against holding the entry amounts.
///
/// Both sides use the same current valuation. A zero HODL value yields 0%.
pub fn impermanent_loss(
    entry: Holdings,
    current: Holdings,
    fees_since_entry: Holdings,
    valuation: &Valuation,
) -> IlEstimate {
    let hodl_value = entry.value(valuation);
    let fees_value = fees_since_entry.value(valuation);
    let position_value = current.value(valuation) + fees_value;
    let il_absolute = position_value - hodl_value;
    let il_pct = if hodl_value > 0.0 {
        il_absolute / hodl_value * 100.0
    } else {
        0.0
    };

    IlEstimate {
        hodl_value,
        position_value,
        fees_value,
        il_pct,
        il_absolute,
        unit: valuation.unit,
    }
}

/// Return on the entry value in percent, when both values share a unit.
pub fn pnl_pct(
    entry_value: f64,
    entry_unit: ValuationUnit,
    position_value: f64,
    unit: ValuationUnit,
) -> Option<f64> {
    if entry_unit != unit || entry_value <= 0.0 {
        return None;
    }
    Some((position_value - entry_value) / entry_value * 100.0)
}

/// Price move since entry in percent.
pub fn price_change_pct(entry_price: f64, price: f64) -> Option<f64> {
    (entry_price > 0.0).then(|| (price - entry_price) / entry_price * 100.0)
}

/// Thresholds of the rebalancing advice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceSettings {
    /// Loss against HODL, in percent, worth watching
    pub il_warning_pct: f64,
    /// Loss against HODL, in percent, worth rebalancing
    pub il_critical_pct: f64,
    /// Distance to the nearer edge, in percent of the range width, considered risky
    pub edge_danger_pct: f64,
    /// Distance from the range center, in percent of the half width, considered off center
    pub center_deviation_pct: f64,
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self {
            il_warning_pct: 2.0,
            il_critical_pct: 5.0,
            edge_danger_pct: 5.0,
            center_deviation_pct: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceUrgency {
    #[default]
    None,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RebalanceReason {
    HighLoss { loss_pct: f64 },
    ModerateLoss { loss_pct: f64 },
    OutOfRange,
    NearEdge { distance_pct: f64 },
    OffCenter { deviation_pct: f64 },
}

impl RebalanceReason {
    pub fn describe(&self) -> String {
        match self {
            Self::HighLoss { loss_pct } => format!("{loss_pct:.2}% loss vs HODL, consider rebalancing"),
            Self::ModerateLoss { loss_pct } => format!("{loss_pct:.2}% loss vs HODL, monitor closely"),
            Self::OutOfRange => "out of range and not earning fees".to_string(),
            Self::NearEdge { distance_pct } => {
                format!("{distance_pct:.1}% of the range from an edge, consider widening or recentering")
            }
            Self::OffCenter { deviation_pct } => {
                format!("price {deviation_pct:.0}% away from the range center")
            }
        }
    }
}

/// Rebalancing advice for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceAdvice {
    pub should_rebalance: bool,
    pub urgency: RebalanceUrgency,
    pub reasons: Vec<RebalanceReason>,
    /// 0 to 100, see [`position_efficiency`]
    pub efficiency: f64,
}

/// Distance from the current tick to the nearer edge in percent of the range
/// width, zero outside the range.
fn edge_distance_pct(snapshot: &PositionSnapshot) -> f64 {
    let width = (i64::from(snapshot.tick_upper) - i64::from(snapshot.tick_lower)) as f64;
    let nearer = snapshot.ticks_above_lower.min(snapshot.ticks_below_upper).max(0) as f64;
    nearer / width * 100.0
}

/// Distance from the range center in percent of the half width.
fn center_deviation_pct(snapshot: &PositionSnapshot) -> f64 {
    let lower = f64::from(snapshot.tick_lower);
    let upper = f64::from(snapshot.tick_upper);
    let center = (lower + upper) / 2.0;
    (f64::from(snapshot.current_tick) - center).abs() / ((upper - lower) / 2.0) * 100.0
}

fn loss_pct(il: &IlEstimate) -> f64 {
    (-il.il_pct).max(0.0)
}

/// Scores how well a position is working, from 0 to 100.
///
/// Losses against HODL cost twice their percentage up to 30 points, being out
/// of range costs 40, and sitting within 10% of the range width from an edge
/// costs up to 20. Full-range positions never score below 75.
pub fn position_efficiency(snapshot: &PositionSnapshot, il: &IlEstimate) -> f64 {
    let mut score = 100.0 - (loss_pct(il) * 2.0).min(MAX_IL_PENALTY);
    if !snapshot.status.is_in_range() {
        score -= OUT_OF_RANGE_PENALTY;
    }
    let edge = edge_distance_pct(snapshot);
    if edge < EDGE_PENALTY_START_PCT {
        score -= (EDGE_PENALTY_START_PCT - edge) * 2.0;
    }
    if snapshot.full_range {
        score = score.max(FULL_RANGE_EFFICIENCY);
    }
    score.clamp(0.0, 100.0)
}

/// Decides whether a position should be rebalanced and why.
///
/// Full-range positions are never advised to rebalance.
pub fn rebalance_recommendation(
    snapshot: &PositionSnapshot,
    il: &IlEstimate,
    settings: &RebalanceSettings,
) -> RebalanceAdvice {
    let efficiency = position_efficiency(snapshot, il);
    if snapshot.full_range {
        return RebalanceAdvice {
            should_rebalance: false,
            urgency: RebalanceUrgency::None,
            reasons: Vec::new(),
            efficiency,
        };
    }

    let mut reasons = Vec::new();
    let mut urgency = RebalanceUrgency::None;
    let mut should_rebalance = false;

    let loss = loss_pct(il);
    if loss > settings.il_critical_pct {
        should_rebalance = true;
        urgency = RebalanceUrgency::High;
        reasons.push(RebalanceReason::HighLoss { loss_pct: loss });
    } else if loss > settings.il_warning_pct {
        urgency = RebalanceUrgency::Medium;
        reasons.push(RebalanceReason::ModerateLoss { loss_pct: loss });
    }

    let in_range = snapshot.status.is_in_range();
    if !in_range {
        should_rebalance = true;
        urgency = RebalanceUrgency::High;
        reasons.push(RebalanceReason::OutOfRange);
    }

    let edge = edge_distance_pct(snapshot);
    if in_range && edge < settings.edge_danger_pct {
        urgency = urgency.max(RebalanceUrgency::Medium);
        reasons.push(RebalanceReason::NearEdge { distance_pct: edge });
    }

    let deviation = center_deviation_pct(snapshot);
    if deviation > settings.center_deviation_pct {
        urgency = urgency.max(RebalanceUrgency::Medium);
        reasons.push(RebalanceReason::OffCenter {
            deviation_pct: deviation,
        });
    }

    RebalanceAdvice {
        should_rebalance,
        urgency,
        reasons,
        efficiency,
    }
}
