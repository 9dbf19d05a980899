//! Range proximity classification and the per-position notification state machine.
//!
//! Notifications fire on a change relative to the last *notified* state, so a
//! position that stays put never produces a second alert unless a reminder
//! interval is configured for its state.

use serde::{Deserialize, Serialize};

use crate::events::EventKind;
use crate::snapshot::PositionSnapshot;
use crate::types::RangeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeState {
    InRange,
    NearBoundary,
    OutOfRange,
}

impl RangeState {
    /// Event announcing a transition into this state.
    fn transition_event(self) -> EventKind {
        match self {
            Self::InRange => EventKind::EnteredRange,
            Self::NearBoundary => EventKind::NearBoundary,
            Self::OutOfRange => EventKind::ExitedRange,
        }
    }
}

/// How wide the near-boundary band is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    /// Band width in multiples of the pool's tick spacing
    pub near_boundary_spacings: u32,
    /// Lower bound of the band in ticks
    pub min_band_ticks: u32,
    /// Upper bound of the band as a fraction of the position's range width
    pub max_range_fraction: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            near_boundary_spacings: 3,
            min_band_ticks: 10,
            max_range_fraction: 0.25,
        }
    }
}

/// Milestone levels, each strictly ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneSettings {
    /// Valued unclaimed fee levels
    pub fee_value: Vec<f64>,
    /// Impermanent loss levels in percent, as positive numbers
    pub il_loss_pct: Vec<f64>,
    /// A reached level re-arms only once the value drops this fraction below it
    pub rearm_fraction: f64,
}

impl Default for MilestoneSettings {
    fn default() -> Self {
        Self {
            fee_value: vec![1.0, 10.0, 100.0, 1_000.0],
            il_loss_pct: vec![2.0, 5.0, 10.0, 20.0],
            rearm_fraction: 0.1,
        }
    }
}

/// Optional re-notification intervals for a state that has not changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub in_range_secs: Option<u64>,
    pub near_boundary_secs: Option<u64>,
    pub out_of_range_secs: Option<u64>,
}

impl ReminderSettings {
    fn interval(&self, state: RangeState) -> Option<u64> {
        match state {
            RangeState::InRange => self.in_range_secs,
            RangeState::NearBoundary => self.near_boundary_secs,
            RangeState::OutOfRange => self.out_of_range_secs,
        }
    }
}

/// Near-boundary band of one pool, derived from its tick spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    band_ticks: i64,
    max_range_fraction: f64,
}

impl ThresholdConfig {
    pub fn for_pool(tick_spacing: i32, settings: &ThresholdSettings) -> Self {
        let scaled = i64::from(tick_spacing.max(1)) * i64::from(settings.near_boundary_spacings);
        Self {
            band_ticks: scaled.max(i64::from(settings.min_band_ticks)),
            max_range_fraction: settings.max_range_fraction,
        }
    }

    pub fn band_ticks(&self) -> i64 {
        self.band_ticks
    }

    /// Band applied to a range, capped so it never swallows a narrow range.
    pub fn band_for_range(&self, tick_lower: i32, tick_upper: i32) -> i64 {
        let width = i64::from(tick_upper) - i64::from(tick_lower);
        let cap = (width as f64 * self.max_range_fraction).floor() as i64;
        self.band_ticks.min(cap).max(0)
    }

    pub fn classify_ticks(
        &self,
        current_tick: i32,
        tick_lower: i32,
        tick_upper: i32,
        full_range: bool,
    ) -> RangeState {
        if !RangeStatus::classify(current_tick, tick_lower, tick_upper).is_in_range() {
            return RangeState::OutOfRange;
        }
        if full_range {
            return RangeState::InRange;
        }
        let band = self.band_for_range(tick_lower, tick_upper);
        let above_lower = i64::from(current_tick) - i64::from(tick_lower);
        let below_upper = i64::from(tick_upper) - i64::from(current_tick);
        if above_lower < band || below_upper <= band {
            RangeState::NearBoundary
        } else {
            RangeState::InRange
        }
    }

    pub fn classify(&self, snapshot: &PositionSnapshot) -> RangeState {
        self.classify_ticks(
            snapshot.current_tick,
            snapshot.tick_lower,
            snapshot.tick_upper,
            snapshot.full_range,
        )
    }
}

/// What has been notified so far for one position. Persisted with its history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationState {
    pub last_range_state: Option<RangeState>,
    pub last_range_notified_at: Option<u64>,
    pub fee_milestone: Option<f64>,
    pub il_milestone: Option<f64>,
}

/// Inputs of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub state: RangeState,
    pub fees_value: f64,
    /// IL in percent, negative when underperforming HODL
    pub il_pct: f64,
    pub timestamp: u64,
}

/// Advances `notification` with `observation` and returns the events to send.
pub fn evaluate(
    notification: &mut NotificationState,
    observation: &Observation,
    milestones: &MilestoneSettings,
    reminders: &ReminderSettings,
) -> Vec<EventKind> {
    let mut events = Vec::new();
    let now = observation.timestamp;

    match notification.last_range_state {
        None => {
            if observation.state != RangeState::InRange {
                events.push(observation.state.transition_event());
            }
            notification.last_range_state = Some(observation.state);
            notification.last_range_notified_at = Some(now);
        }
        Some(previous) if previous != observation.state => {
            events.push(observation.state.transition_event());
            notification.last_range_state = Some(observation.state);
            notification.last_range_notified_at = Some(now);
        }
        Some(unchanged) => {
            let since = notification.last_range_notified_at.unwrap_or(now);
            if let Some(interval) = reminders.interval(unchanged) {
                if interval > 0 && now.saturating_sub(since) >= interval {
                    events.push(EventKind::RangeReminder);
                    notification.last_range_notified_at = Some(now);
                }
            }
        }
    }

    if let Some(level) = advance_milestone(
        &mut notification.fee_milestone,
        &milestones.fee_value,
        observation.fees_value,
        milestones.rearm_fraction,
    ) {
        events.push(EventKind::FeeMilestone { level });
    }
    if let Some(level) = advance_milestone(
        &mut notification.il_milestone,
        &milestones.il_loss_pct,
        -observation.il_pct,
        milestones.rearm_fraction,
    ) {
        events.push(EventKind::IlMilestone { loss_pct: level });
    }

    events
}

/// Moves a milestone marker to the highest level `value` reaches.
///
/// Returns the level when it is higher than the marker. The marker holds while
/// `value` stays within `rearm_fraction` below it, then falls silently to the
/// highest level still reached so that level can fire again.
fn advance_milestone(
    marker: &mut Option<f64>,
    levels: &[f64],
    value: f64,
    rearm_fraction: f64,
) -> Option<f64> {
    let reached = levels
        .iter()
        .copied()
        .filter(|level| value >= *level)
        .fold(None, |best: Option<f64>, level| {
            Some(best.map_or(level, |b| b.max(level)))
        });

    let fired = match (reached, *marker) {
        (Some(level), Some(previous)) if level > previous => Some(level),
        (Some(level), None) => Some(level),
        _ => None,
    };
    let held = marker.filter(|previous| value >= previous * (1.0 - rearm_fraction));
    *marker = match (reached, held) {
        (Some(level), Some(previous)) => Some(level.max(previous)),
        (reached, held) => reached.or(held),
    };
    fired
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> ThresholdConfig {
        ThresholdConfig::for_pool(10, &ThresholdSettings::default())
    }

    fn observe(state: RangeState, timestamp: u64) -> Observation {
        Observation {
            state,
            fees_value: 0.0,
            il_pct: 0.0,
            timestamp,
        }
    }

    #[rstest]
    #[case(150, RangeState::InRange)]
    #[case(200, RangeState::OutOfRange)]
    #[case(99, RangeState::OutOfRange)]
    #[case(100, RangeState::NearBoundary)]
    #[case(175, RangeState::NearBoundary)]
    fn test_classify_closed_open_range(
        config: ThresholdConfig,
        #[case] tick: i32,
        #[case] expected: RangeState,
    ) {
        assert_eq!(config.classify_ticks(tick, 100, 200, false), expected);
    }

    #[rstest]
    #[case(1, 10)]
    #[case(10, 30)]
    #[case(60, 180)]
    #[case(200, 600)]
    fn test_band_scales_with_spacing(#[case] spacing: i32, #[case] band: i64) {
        let config = ThresholdConfig::for_pool(spacing, &ThresholdSettings::default());
        assert_eq!(config.band_ticks(), band);
        assert_eq!(config.band_for_range(-100_000, 100_000), band);
    }

    #[rstest]
    fn test_band_capped_by_range_width() {
        let config = ThresholdConfig::for_pool(60, &ThresholdSettings::default());
        assert_eq!(config.band_for_range(0, 240), 60);
    }

    #[rstest]
    fn test_full_range_is_never_near(config: ThresholdConfig) {
        assert_eq!(
            config.classify_ticks(-887_000, -887_200, 887_200, true),
            RangeState::InRange
        );
    }

    #[rstest]
    fn test_oscillation_notifies_each_transition() {
        let mut state = NotificationState::default();
        let milestones = MilestoneSettings::default();
        let reminders = ReminderSettings::default();

        let sequence = [
            (RangeState::NearBoundary, vec![EventKind::NearBoundary]),
            (RangeState::InRange, vec![EventKind::EnteredRange]),
            (RangeState::NearBoundary, vec![EventKind::NearBoundary]),
            (RangeState::InRange, vec![EventKind::EnteredRange]),
            (RangeState::InRange, vec![]),
        ];
        for (t, (range_state, expected)) in sequence.into_iter().enumerate() {
            let events = evaluate(&mut state, &observe(range_state, t as u64), &milestones, &reminders);
            assert_eq!(events, expected, "step {t}");
        }
    }

    #[rstest]
    fn test_unchanged_state_is_debounced() {
        let mut state = NotificationState::default();
        let milestones = MilestoneSettings::default();
        let reminders = ReminderSettings::default();

        let first = evaluate(&mut state, &observe(RangeState::OutOfRange, 0), &milestones, &reminders);
        assert_eq!(first, vec![EventKind::ExitedRange]);
        for t in 1..10 {
            let events = evaluate(
                &mut state,
                &observe(RangeState::OutOfRange, t * 3_600),
                &milestones,
                &reminders,
            );
            assert!(events.is_empty());
        }
    }

    #[rstest]
    fn test_first_in_range_observation_is_silent() {
        let mut state = NotificationState::default();
        let events = evaluate(
            &mut state,
            &observe(RangeState::InRange, 0),
            &MilestoneSettings::default(),
            &ReminderSettings::default(),
        );
        assert!(events.is_empty());
        assert_eq!(state.last_range_state, Some(RangeState::InRange));
    }

    #[rstest]
    fn test_out_of_range_reminder() {
        let mut state = NotificationState::default();
        let milestones = MilestoneSettings::default();
        let reminders = ReminderSettings {
            out_of_range_secs: Some(1_800),
            ..ReminderSettings::default()
        };

        let at = |state: &mut NotificationState, t: u64| {
            evaluate(state, &observe(RangeState::OutOfRange, t), &milestones, &reminders)
        };
        assert_eq!(at(&mut state, 0), vec![EventKind::ExitedRange]);
        assert!(at(&mut state, 1_000).is_empty());
        assert_eq!(at(&mut state, 1_800), vec![EventKind::RangeReminder]);
        assert!(at(&mut state, 2_000).is_empty());
        assert_eq!(at(&mut state, 3_600), vec![EventKind::RangeReminder]);
    }

    #[rstest]
    fn test_fee_milestones_fire_once_and_rearm() {
        let mut state = NotificationState::default();
        let milestones = MilestoneSettings {
            fee_value: vec![1.0, 10.0, 100.0],
            il_loss_pct: vec![],
            rearm_fraction: 0.1,
        };
        let reminders = ReminderSettings::default();
        let mut step = |fees_value: f64| {
            let observation = Observation {
                state: RangeState::InRange,
                fees_value,
                il_pct: 0.0,
                timestamp: 0,
            };
            evaluate(&mut state, &observation, &milestones, &reminders)
        };

        assert!(step(0.5).is_empty());
        assert_eq!(step(2.0), vec![EventKind::FeeMilestone { level: 1.0 }]);
        assert!(step(5.0).is_empty());
        assert_eq!(step(150.0), vec![EventKind::FeeMilestone { level: 100.0 }]);
        assert!(step(150.0).is_empty());
        // fees collected
        assert!(step(0.0).is_empty());
        assert_eq!(step(2.0), vec![EventKind::FeeMilestone { level: 1.0 }]);
    }

    #[rstest]
    fn test_il_milestones_track_losses_only() {
        let mut state = NotificationState::default();
        let milestones = MilestoneSettings {
            fee_value: vec![],
            il_loss_pct: vec![2.0, 5.0],
            rearm_fraction: 0.1,
        };
        let reminders = ReminderSettings::default();
        let mut step = |il_pct: f64| {
            let observation = Observation {
                state: RangeState::InRange,
                fees_value: 0.0,
                il_pct,
                timestamp: 0,
            };
            evaluate(&mut state, &observation, &milestones, &reminders)
        };

        assert!(step(3.0).is_empty());
        assert_eq!(step(-3.0), vec![EventKind::IlMilestone { loss_pct: 2.0 }]);
        assert_eq!(step(-6.0), vec![EventKind::IlMilestone { loss_pct: 5.0 }]);
        assert!(step(-4.0).is_empty());
        assert_eq!(step(-6.0), vec![EventKind::IlMilestone { loss_pct: 5.0 }]);
    }

    #[rstest]
    fn test_il_jitter_around_a_level_fires_once() {
        let mut state = NotificationState::default();
        let milestones = MilestoneSettings {
            fee_value: vec![],
            il_loss_pct: vec![2.0, 5.0],
            rearm_fraction: 0.1,
        };
        let reminders = ReminderSettings::default();
        let mut step = |il_pct: f64| {
            let observation = Observation {
                state: RangeState::InRange,
                fees_value: 0.0,
                il_pct,
                timestamp: 0,
            };
            evaluate(&mut state, &observation, &milestones, &reminders)
        };

        assert_eq!(step(-2.1), vec![EventKind::IlMilestone { loss_pct: 2.0 }]);
        for il_pct in [-1.9, -2.1, -1.85, -2.05] {
            assert!(step(il_pct).is_empty(), "il {il_pct}");
        }
        // recovered past the margin
        assert!(step(-1.5).is_empty());
        assert_eq!(step(-2.1), vec![EventKind::IlMilestone { loss_pct: 2.0 }]);
    }

    #[rstest]
    fn test_range_and_milestone_fire_together() {
        let mut state = NotificationState {
            last_range_state: Some(RangeState::InRange),
            last_range_notified_at: Some(0),
            fee_milestone: None,
            il_milestone: None,
        };
        let observation = Observation {
            state: RangeState::OutOfRange,
            fees_value: 12.0,
            il_pct: 0.0,
            timestamp: 60,
        };
        let events = evaluate(
            &mut state,
            &observation,
            &MilestoneSettings::default(),
            &ReminderSettings::default(),
        );
        assert_eq!(
            events,
            vec![EventKind::ExitedRange, EventKind::FeeMilestone { level: 10.0 }]
        );
    }
}
