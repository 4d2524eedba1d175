//! Civil calendar: turns wall-clock time into "today"

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, Utc};

/// Calendar pinned to a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilCalendar {
    offset: FixedOffset,
}

impl CivilCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Civil date at the given instant
    pub fn today_at(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.today_at(Utc::now())
    }

    /// Next instant strictly after `now` whose civil time is `run_at`
    pub fn next_run_after(&self, now: DateTime<Utc>, run_at: NaiveTime) -> DateTime<Utc> {
        let shift = TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        let candidate = (self.today_at(now).and_time(run_at) - shift).and_utc();
        if candidate > now {
            candidate
        } else {
            candidate + TimeDelta::days(1)
        }
    }
}
