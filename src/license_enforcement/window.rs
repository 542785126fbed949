use chrono::{DateTime, Datelike, FixedOffset, Local};

/// The only calendar year in which the license is valid. There is no renewal
/// path: once the year is over every check fails.
pub const TARGET_YEAR: i32 = 2024;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Host wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    target_year: i32,
}

impl ValidityWindow {
    pub fn new(target_year: i32) -> Self {
        Self { target_year }
    }

    pub fn target_year(&self) -> i32 {
        self.target_year
    }

    /// True iff `now` falls in the target calendar year, judged in the
    /// timestamp's own time zone.
    pub fn contains(&self, now: &DateTime<FixedOffset>) -> bool {
        now.year() == self.target_year
    }
}

impl Default for ValidityWindow {
    fn default() -> Self {
        Self::new(TARGET_YEAR)
    }
}
