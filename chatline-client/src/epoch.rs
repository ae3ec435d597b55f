//! Stale-result suppression for asynchronous work.
//!
//! Every operation started while the clock reads `e` is tagged with `e`.
//! When it completes, its effect is applied only if the clock still reads
//! `e`; advancing the clock invalidates everything in flight at once.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// A point on the [`EpochClock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "e{}", self.0)
    }
}

/// A value produced by work started at `epoch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<T> {
    pub epoch: Epoch,
    pub value: T,
}

impl<T> Tagged<T> {
    #[must_use]
    pub const fn new(epoch: Epoch, value: T) -> Self {
        Self { epoch, value }
    }

    /// Carries the tag over to a derived value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tagged<U> {
        Tagged {
            epoch: self.epoch,
            value: f(self.value),
        }
    }
}

/// Monotonic counter; never goes backwards.
#[derive(Debug, Default)]
pub struct EpochClock {
    current: Epoch,
}

impl EpochClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn current(&self) -> Epoch {
        self.current
    }

    /// Moves to the next epoch and returns it.
    pub fn advance(&mut self) -> Epoch {
        self.current = Epoch(self.current.0.saturating_add(1));
        self.current
    }

    #[must_use]
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current == epoch
    }

    /// Tags `value` with the current epoch.
    pub fn tag<T>(&self, value: T) -> Tagged<T> {
        Tagged::new(self.current, value)
    }

    /// Unwraps `tagged` if it belongs to the current epoch.
    pub fn accept<T>(&self, tagged: Tagged<T>) -> Option<T> {
        self.is_current(tagged.epoch).then_some(tagged.value)
    }
}
