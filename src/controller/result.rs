//! # Reconcile Result
//!
//! Outcome of every lifecycle step: whether to requeue, after how long, and the
//! error that caused it (if any). The state machine advances on results that
//! do not requeue and yields on results that do.

use crate::constants;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Tagged outcome of a reconcile step
#[derive(Default)]
pub struct ReconcileResult {
    requeue: bool,
    requeue_after: Duration,
    error: Option<anyhow::Error>,
}

impl ReconcileResult {
    /// Success, no requeue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requeue after a random delay in the short-delay window (1-2s)
    #[must_use]
    pub fn short_delay() -> Self {
        Self::delay(
            constants::SHORT_DELAY_MIN_SECS,
            constants::SHORT_DELAY_MAX_SECS,
            Duration::from_secs(1),
        )
    }

    /// Requeue after a uniform-random delay in `[min, max] * unit`
    #[must_use]
    pub fn delay(min: u64, max: u64, unit: Duration) -> Self {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let unit_ms = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX);
        let low_ms = low.saturating_mul(unit_ms);
        let high_ms = high.saturating_mul(unit_ms);
        let delay_ms = rand::thread_rng().gen_range(low_ms..=high_ms);
        Self::requeue_after(Duration::from_millis(delay_ms))
    }

    /// Requeue after exactly `delay`
    #[must_use]
    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: delay,
            error: None,
        }
    }

    /// Short-delay requeue carrying the error that caused it
    #[must_use]
    pub fn short_delay_with_error(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::short_delay()
        }
    }

    #[must_use]
    pub fn should_requeue(&self) -> bool {
        self.requeue
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn requeue_delay(&self) -> Duration {
        self.requeue_after
    }

    #[must_use]
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    /// Consume the result, keeping only the error
    #[must_use]
    pub fn into_error(self) -> Option<anyhow::Error> {
        self.error
    }
}

impl fmt::Debug for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcileResult")
            .field("requeue", &self.requeue)
            .field("requeue_after", &self.requeue_after)
            .field("error", &self.error.as_ref().map(|e| format!("{e:#}")))
            .finish()
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.requeue) {
            (Some(e), _) => write!(f, "requeue after {:?}: {e:#}", self.requeue_after),
            (None, true) => write!(f, "requeue after {:?}", self.requeue_after),
            (None, false) => f.write_str("done"),
        }
    }
}
