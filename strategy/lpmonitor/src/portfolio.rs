//! Totals across every tracked position.

use serde::Serialize;

use crate::history::PositionHistory;
use crate::pricing::ValuationUnit;
use crate::threshold::RangeState;

/// Aggregate of the last metrics of every tracked position.
///
/// Value, fee and IL totals only include positions valued in USD; positions
/// valued in their token1 have no common unit with the rest.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PortfolioSummary {
    pub positions: usize,
    pub in_range: usize,
    pub near_boundary: usize,
    pub out_of_range: usize,
    /// Positions included in the USD totals
    pub usd_positions: usize,
    /// Current composition plus unclaimed fees
    pub total_value_usd: f64,
    pub total_fees_usd: f64,
    /// Position minus HODL value, negative when losing
    pub total_il_usd: f64,
    /// Mean over positions with an APR estimate
    pub average_apr_pct: Option<f64>,
}

impl PortfolioSummary {
    pub fn from_histories<'a>(histories: impl IntoIterator<Item = &'a PositionHistory>) -> Self {
        let mut summary = Self::default();
        let mut apr_sum = 0.0;
        let mut apr_count = 0usize;

        for history in histories {
            summary.positions += 1;
            match history.notification.last_range_state {
                Some(RangeState::InRange) => summary.in_range += 1,
                Some(RangeState::NearBoundary) => summary.near_boundary += 1,
                Some(RangeState::OutOfRange) => summary.out_of_range += 1,
                None => {}
            }

            let Some(metrics) = &history.last_metrics else {
                continue;
            };
            if let Some(apr) = metrics.apr.apr_pct {
                apr_sum += apr;
                apr_count += 1;
            }
            if metrics.valuation.unit == ValuationUnit::Usd {
                summary.usd_positions += 1;
                summary.total_value_usd +=
                    metrics.composition_value + metrics.unclaimed_fees_value;
                summary.total_fees_usd += metrics.unclaimed_fees_value;
                summary.total_il_usd += metrics.il.il_absolute;
            }
        }

        summary.average_apr_pct = (apr_count > 0).then(|| apr_sum / apr_count as f64);
        summary
    }
}

/// Sent after a cycle that opened or closed positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioUpdate {
    pub opened: usize,
    pub closed: usize,
    pub summary: PortfolioSummary,
    pub timestamp: u64,
}

impl PortfolioUpdate {
    pub fn title(&self) -> String {
        "LP portfolio update".to_string()
    }

    pub fn body(&self) -> String {
        let summary = &self.summary;
        let mut lines = vec![
            format!("Opened: {}", self.opened),
            format!("Closed: {}", self.closed),
            format!(
                "Positions: {} ({} in range, {} near boundary, {} out of range)",
                summary.positions, summary.in_range, summary.near_boundary, summary.out_of_range
            ),
        ];
        if summary.usd_positions > 0 {
            lines.push(format!("Total value: {:.2} USD", summary.total_value_usd));
            lines.push(format!("Unclaimed fees: {:.2} USD", summary.total_fees_usd));
            lines.push(format!("IL vs HODL: {:+.2} USD", summary.total_il_usd));
        }
        if let Some(apr) = summary.average_apr_pct {
            lines.push(format!("Average fee APR: {apr:.1}%"));
        }
        lines.join("\n")
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
