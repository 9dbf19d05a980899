//! Rolling fee APR.
//!
//! Each poll appends the cumulative fees a position has earned (claimed plus
//! unclaimed, per token). The APR is the valued fee growth across the retained
//! window, annualised over the span the samples actually cover.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::pricing::Valuation;

pub const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// Cumulative fees earned by a position up to `timestamp`, in whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSample {
    pub timestamp: u64,
    pub fees0: f64,
    pub fees1: f64,
}

/// Retained fee samples of one position, oldest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeWindow {
    samples: VecDeque<FeeSample>,
}

impl FeeWindow {
    pub fn samples(&self) -> &VecDeque<FeeSample> {
        &self.samples
    }

    pub fn newest(&self) -> Option<&FeeSample> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&FeeSample> {
        self.samples.front()
    }

    /// Seconds between the oldest and newest retained sample.
    pub fn span_secs(&self) -> u64 {
        match (self.oldest(), self.newest()) {
            (Some(oldest), Some(newest)) => newest.timestamp.saturating_sub(oldest.timestamp),
            _ => 0,
        }
    }
}

/// Result of an APR computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AprEstimate {
    /// Annualised fee yield in percent, `None` when it cannot be computed yet
    pub apr_pct: Option<f64>,
    /// True until the samples cover the whole window
    pub warming_up: bool,
    pub seconds_until_full: u64,
    pub span_secs: u64,
    pub sample_count: usize,
}

/// Window settings shared by every tracked position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingApr {
    window_secs: u64,
    /// Slack for discrete polling: the window counts as full once the retained
    /// span is within one poll interval of `window_secs`
    tolerance_secs: u64,
}

impl RollingApr {
    pub fn new(window_secs: u64, tolerance_secs: u64) -> Self {
        Self {
            window_secs,
            tolerance_secs: tolerance_secs.min(window_secs),
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Appends `sample` and evicts samples older than the window.
    ///
    /// A sample not newer than the last one overwrites the last one's amounts,
    /// and cumulative amounts never decrease.
    pub fn record(&self, window: &mut FeeWindow, sample: FeeSample) {
        match window.samples.back_mut() {
            Some(last) if sample.timestamp <= last.timestamp => {
                last.fees0 = last.fees0.max(sample.fees0);
                last.fees1 = last.fees1.max(sample.fees1);
            }
            Some(last) => {
                let sample = FeeSample {
                    timestamp: sample.timestamp,
                    fees0: sample.fees0.max(last.fees0),
                    fees1: sample.fees1.max(last.fees1),
                };
                window.samples.push_back(sample);
            }
            None => window.samples.push_back(sample),
        }
        self.evict(window);
    }

    fn evict(&self, window: &mut FeeWindow) {
        let Some(newest) = window.newest().map(|s| s.timestamp) else {
            return;
        };
        let cutoff = newest.saturating_sub(self.window_secs);
        while window
            .samples
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            window.samples.pop_front();
        }
    }

    /// Annualised fee yield of `position_value` over the retained samples.
    pub fn estimate(
        &self,
        window: &FeeWindow,
        valuation: &Valuation,
        position_value: f64,
    ) -> AprEstimate {
        let span_secs = window.span_secs();
        let covered = span_secs.saturating_add(self.tolerance_secs);
        let warming_up = window.samples.len() < 2 || covered < self.window_secs;
        let seconds_until_full = if warming_up {
            self.window_secs.saturating_sub(covered)
        } else {
            0
        };

        let apr_pct = match (window.oldest(), window.newest()) {
            (Some(oldest), Some(newest)) if span_secs > 0 && position_value > 0.0 => {
                let earned = valuation.value(newest.fees0, newest.fees1)
                    - valuation.value(oldest.fees0, oldest.fees1);
                let years = span_secs as f64 / SECONDS_PER_YEAR;
                Some(earned.max(0.0) / position_value / years * 100.0)
            }
            _ => None,
        };

        AprEstimate {
            apr_pct,
            warming_up,
            seconds_until_full,
            span_secs,
            sample_count: window.samples.len(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
