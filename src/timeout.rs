//! Timeouts for query evaluation.
//!
//! A query waits at most its timeout for its criterion to be met. The
//! timeout is either a fixed duration or a [`TimeoutBudget`]: a shared
//! countdown that several sequential assertions consume together, so a
//! chain of N assertions cannot take N times the stated timeout.
//!
//! ```
//! use std::sync::Arc;
//! use changeprobe::{RemainingTime, Timeout, TimeoutBudget};
//!
//! let budget = Arc::new(TimeoutBudget::new(5.0));
//! assert_eq!(budget.remaining_seconds(), 5.0); // not started yet
//!
//! let first = Timeout::from(&budget);
//! let second = Timeout::from(&budget);
//! budget.start();
//! assert!(first.remaining() <= budget.initial());
//! assert!(second.remaining() <= first.initial());
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Anything that can tell how much waiting time is left.
///
/// This is the seam used wherever a plain numeric timeout would otherwise
/// be accepted.
pub trait RemainingTime {
    /// Time left, clamped to `[0, initial]`.
    fn remaining(&self) -> Duration;

    /// The full budget this timeout started with.
    fn initial(&self) -> Duration;

    /// Begin counting down. Idempotent; fixed timeouts ignore it.
    fn start(&self) {}

    /// `remaining()` in fractional seconds.
    fn remaining_seconds(&self) -> f64 {
        self.remaining().as_secs_f64()
    }
}

/// Converts user-supplied seconds into a duration.
///
/// Negative, NaN and infinite inputs become zero ("check existing events
/// only"). Finite values too large for a `Duration` saturate to
/// `Duration::MAX`.
#[must_use]
pub fn duration_from_secs(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// A countdown shared by several sequential evaluations.
///
/// The clock starts lazily, on the first [`start`](Self::start) call
/// (evaluating a query that uses the budget starts it). Before that,
/// `remaining()` equals the initial value; afterwards it is
/// non-increasing and never below zero.
pub struct TimeoutBudget {
    initial: Duration,
    started: OnceLock<(Instant, DateTime<Utc>)>,
}

impl TimeoutBudget {
    /// Creates a budget of `seconds` (negative or non-finite become 0).
    #[must_use]
    pub fn new(seconds: f64) -> Self {
        Self::from_duration(duration_from_secs(seconds))
    }

    /// Creates a budget from a duration.
    #[must_use]
    pub const fn from_duration(initial: Duration) -> Self {
        Self {
            initial,
            started: OnceLock::new(),
        }
    }

    /// Creates a budget that is already counting down.
    #[must_use]
    pub fn started(seconds: f64) -> Self {
        let budget = Self::new(seconds);
        budget.start();
        budget
    }

    /// Start the countdown if it has not started yet.
    ///
    /// Returns the instant the countdown started, which is the same for
    /// every call.
    pub fn start(&self) -> Instant {
        self.started.get_or_init(|| (Instant::now(), Utc::now())).0
    }

    /// Whether the countdown has started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.get().is_some()
    }

    /// Wall-clock start of the countdown, if started.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.started.get().map(|(_, wall)| *wall)
    }

    /// Time consumed since the countdown started.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.started.get().map(|(at, _)| at.elapsed())
    }

    /// The full budget, as given at construction.
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// `initial()` in fractional seconds.
    #[must_use]
    pub fn initial_seconds(&self) -> f64 {
        self.initial.as_secs_f64()
    }

    /// Time left before the budget is exhausted.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        match self.started.get() {
            None => self.initial,
            Some((at, _)) => self.initial.saturating_sub(at.elapsed()),
        }
    }

    /// `remaining()` in fractional seconds.
    #[must_use]
    pub fn remaining_seconds(&self) -> f64 {
        self.remaining().as_secs_f64()
    }

    /// Whether a started budget has nothing left.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.is_started() && self.remaining().is_zero()
    }
}

impl RemainingTime for TimeoutBudget {
    fn remaining(&self) -> Duration {
        Self::remaining(self)
    }

    fn initial(&self) -> Duration {
        self.initial
    }

    fn start(&self) {
        Self::start(self);
    }
}

impl fmt::Debug for TimeoutBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutBudget")
            .field("initial", &self.initial)
            .field("started", &self.is_started())
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// The timeout of one query: fixed, or a share of a [`TimeoutBudget`].
#[derive(Debug, Clone)]
pub enum Timeout {
    /// A dedicated duration, counted from the evaluation start.
    Fixed(Duration),
    /// Whatever is left in a shared budget when the evaluation starts.
    Shared(Arc<TimeoutBudget>),
}

impl Timeout {
    /// No waiting: only events already received are checked.
    pub const NONE: Self = Self::Fixed(Duration::ZERO);

    /// A fixed timeout of `seconds` (negative or non-finite become 0).
    #[must_use]
    pub fn seconds(seconds: f64) -> Self {
        Self::Fixed(duration_from_secs(seconds))
    }

    /// The shared budget, if this timeout uses one.
    #[must_use]
    pub fn budget(&self) -> Option<&Arc<TimeoutBudget>> {
        match self {
            Self::Fixed(_) => None,
            Self::Shared(budget) => Some(budget),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::NONE
    }
}

impl RemainingTime for Timeout {
    fn remaining(&self) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::Shared(budget) => budget.remaining(),
        }
    }

    fn initial(&self) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::Shared(budget) => budget.initial(),
        }
    }

    fn start(&self) {
        if let Self::Shared(budget) = self {
            budget.start();
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Fixed(d)
    }
}

impl From<f64> for Timeout {
    fn from(seconds: f64) -> Self {
        Self::seconds(seconds)
    }
}

impl From<u64> for Timeout {
    fn from(seconds: u64) -> Self {
        Self::Fixed(Duration::from_secs(seconds))
    }
}

impl From<Arc<TimeoutBudget>> for Timeout {
    fn from(budget: Arc<TimeoutBudget>) -> Self {
        Self::Shared(budget)
    }
}

impl From<&Arc<TimeoutBudget>> for Timeout {
    fn from(budget: &Arc<TimeoutBudget>) -> Self {
        Self::Shared(Arc::clone(budget))
    }
}
