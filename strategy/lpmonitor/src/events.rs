//! Notification events and their text rendering.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::il::{RebalanceAdvice, RebalanceUrgency};
use crate::portfolio::PortfolioUpdate;
use crate::pricing::{Valuation, ValuationUnit};
use crate::snapshot::PositionSnapshot;
use crate::threshold::RangeState;
use crate::types::PositionKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    PositionOpened,
    EnteredRange,
    ExitedRange,
    NearBoundary,
    RangeReminder,
    FeeMilestone { level: f64 },
    IlMilestone { loss_pct: f64 },
    PositionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Analytics attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EventMetrics {
    pub fees_value: f64,
    pub il_pct: Option<f64>,
    pub apr_pct: Option<f64>,
}

/// Immutable notification payload handed to every channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub key: PositionKey,
    pub wallet: Address,
    pub pool_label: String,
    pub kind: EventKind,
    pub range_state: RangeState,
    pub price: f64,
    pub lower_price: f64,
    pub upper_price: f64,
    pub nearest_boundary_pct: Option<f64>,
    pub metrics: EventMetrics,
    pub advice: Option<RebalanceAdvice>,
    /// `USD` or the symbol of the pool's token1
    pub value_unit: String,
    pub timestamp: u64,
}

impl NotificationEvent {
    pub fn new(
        kind: EventKind,
        snapshot: &PositionSnapshot,
        range_state: RangeState,
        metrics: EventMetrics,
        valuation: &Valuation,
        timestamp: u64,
    ) -> Self {
        let value_unit = match valuation.unit {
            ValuationUnit::Usd => "USD".to_string(),
            ValuationUnit::Token1 => snapshot.pool.token1.symbol.clone(),
        };
        Self {
            key: snapshot.key.clone(),
            wallet: snapshot.owner,
            pool_label: snapshot.pool.label(),
            kind,
            range_state,
            price: snapshot.price,
            lower_price: snapshot.lower_price,
            upper_price: snapshot.upper_price,
            nearest_boundary_pct: snapshot.nearest_boundary_pct(),
            metrics,
            advice: None,
            value_unit,
            timestamp,
        }
    }

    pub fn with_advice(mut self, advice: RebalanceAdvice) -> Self {
        self.advice = Some(advice);
        self
    }

    pub fn severity(&self) -> Severity {
        match &self.kind {
            EventKind::ExitedRange | EventKind::IlMilestone { .. } => Severity::Critical,
            EventKind::NearBoundary | EventKind::PositionClosed => Severity::Warning,
            EventKind::RangeReminder if self.range_state == RangeState::OutOfRange => {
                Severity::Critical
            }
            EventKind::RangeReminder if self.range_state == RangeState::NearBoundary => {
                Severity::Warning
            }
            _ => Severity::Info,
        }
    }

    pub fn title(&self) -> String {
        let what = match &self.kind {
            EventKind::PositionOpened => "now monitored".to_string(),
            EventKind::EnteredRange => "back in range".to_string(),
            EventKind::ExitedRange => "out of range".to_string(),
            EventKind::NearBoundary => "near range boundary".to_string(),
            EventKind::RangeReminder => format!("still {}", state_label(self.range_state)),
            EventKind::FeeMilestone { level } => {
                format!("fees passed {} {}", format_amount(*level), self.value_unit)
            }
            EventKind::IlMilestone { loss_pct } => {
                format!("impermanent loss passed {loss_pct:.1}%")
            }
            EventKind::PositionClosed => "closed".to_string(),
        };
        format!("{} {}", self.pool_label, what)
    }

    pub fn body(&self) -> String {
        let mut lines = vec![
            format!("Position: {}", self.key),
            format!("Wallet: {}", self.wallet),
            format!("Status: {}", state_label(self.range_state)),
            format!(
                "Price: {} (range {} - {})",
                format_price(self.price),
                format_price(self.lower_price),
                format_price(self.upper_price)
            ),
        ];
        if let Some(pct) = self.nearest_boundary_pct {
            lines.push(format!("Nearest boundary: {pct:+.2}%"));
        }
        lines.push(format!(
            "Unclaimed fees: {} {}",
            format_amount(self.metrics.fees_value),
            self.value_unit
        ));
        if let Some(il) = self.metrics.il_pct {
            lines.push(format!("IL vs HODL: {il:+.2}%"));
        }
        if let Some(apr) = self.metrics.apr_pct {
            lines.push(format!("Fee APR: {apr:.1}%"));
        }
        if let Some(advice) = &self.advice {
            lines.push(format!("Efficiency: {:.0}/100", advice.efficiency));
            let verdict = match (advice.should_rebalance, advice.urgency) {
                (true, _) => "recommended",
                (false, RebalanceUrgency::None) => "not needed",
                (false, _) => "watch",
            };
            lines.push(format!("Rebalance: {verdict}"));
            for reason in &advice.reasons {
                lines.push(format!("- {}", reason.describe()));
            }
        }
        lines.join("\n")
    }
}

/// Anything a channel delivers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Position(NotificationEvent),
    Portfolio(PortfolioUpdate),
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Position(event) => event.severity(),
            Self::Portfolio(_) => Severity::Info,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::Position(event) => event.title(),
            Self::Portfolio(update) => update.title(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Position(event) => event.body(),
            Self::Portfolio(update) => update.body(),
        }
    }

    /// Position key, or `portfolio` for a portfolio update.
    pub fn subject(&self) -> String {
        match self {
            Self::Position(event) => event.key.to_string(),
            Self::Portfolio(_) => "portfolio".to_string(),
        }
    }
}

impl From<NotificationEvent> for Notification {
    fn from(event: NotificationEvent) -> Self {
        Self::Position(event)
    }
}

impl From<PortfolioUpdate> for Notification {
    fn from(update: PortfolioUpdate) -> Self {
        Self::Portfolio(update)
    }
}

fn state_label(state: RangeState) -> &'static str {
    match state {
        RangeState::InRange => "in range",
        RangeState::NearBoundary => "near boundary",
        RangeState::OutOfRange => "out of range",
    }
}

fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{price:.4}")
    } else if price >= 0.0001 {
        format!("{price:.6}")
    } else {
        format!("{price:.4e}")
    }
}

fn format_amount(amount: f64) -> String {
    if amount.abs() >= 1.0 || amount == 0.0 {
        format!("{amount:.2}")
    } else {
        format!("{amount:.4}")
    }
}
