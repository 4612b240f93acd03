//! Remaining time estimation from percentage updates.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const MAX_SAMPLES: usize = 10;
const MIN_SAMPLES: usize = 3;

/// Estimates seconds left from the slope of recent percentage updates.
#[derive(Debug, Default)]
pub(crate) struct RemainingEstimator {
    samples: VecDeque<(Instant, u32)>,
}

impl RemainingEstimator {
    pub(crate) fn reset(&mut self) {
        self.samples.clear();
    }

    pub(crate) fn add(&mut self, at: Instant, percentage: u32) {
        self.samples.push_back((at, percentage));
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// Seconds left, zero when there is not enough data.
    pub(crate) fn remaining(&self) -> u32 {
        if self.samples.len() < MIN_SAMPLES {
            return 0;
        }
        let (Some(&(first_at, first)), Some(&(last_at, last))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0;
        };
        let span = last_at.saturating_duration_since(first_at);
        if last <= first || span == Duration::ZERO || last >= 100 {
            return 0;
        }
        let per_second = f64::from(last - first) / span.as_secs_f64();
        (f64::from(100 - last) / per_second).round() as u32
    }
}
