//! Civil-day bucketing in a fixed reference time zone.
//!
//! Study time is credited to calendar days as observed in one reference zone
//! (America/New_York by default) no matter where the student actually is.
//! [`DayBoundary`] converts between UTC instants and those civil days.

use chrono::{Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::types::Timestamp;

/// Zone used to bucket study time when nothing else is configured.
pub const REFERENCE_ZONE: Tz = chrono_tz::America::New_York;

/// Which UTC offset is applied when converting a target civil midnight back
/// to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetRule {
    /// Reuse the offset in effect at the reference instant. Off by one hour
    /// when the target day sits across a DST transition from the reference.
    ReferenceInstant,
    /// Resolve the offset in effect at the target civil midnight itself.
    #[default]
    TargetDay,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DayBoundaryError {
    #[error("Unknown time zone: {0}")]
    UnknownZone(String),

    #[error("Civil date {date} shifted by {offset_days} days is out of range")]
    DateOutOfRange { date: NaiveDate, offset_days: i64 },

    #[error("No local midnight can be resolved for {date} in {zone}")]
    NoLocalMidnight { date: NaiveDate, zone: &'static str },
}

/// Resolves civil days and their UTC start instants in a reference zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    zone: Tz,
    rule: OffsetRule,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::new(REFERENCE_ZONE)
    }
}

impl DayBoundary {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            rule: OffsetRule::default(),
        }
    }

    /// Build a resolver from an IANA zone name such as `"America/New_York"`.
    ///
    /// An unrecognised name is an error; there is no fallback to UTC.
    pub fn from_zone_name(name: &str) -> Result<Self, DayBoundaryError> {
        name.parse::<Tz>()
            .map(Self::new)
            .map_err(|_| DayBoundaryError::UnknownZone(name.to_string()))
    }

    pub fn with_rule(mut self, rule: OffsetRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn rule(&self) -> OffsetRule {
        self.rule
    }

    /// The reference zone's calendar day containing `instant`.
    pub fn civil_day(&self, instant: Timestamp) -> NaiveDate {
        instant.with_timezone(&self.zone).date_naive()
    }

    /// Shift a civil date by a signed number of days.
    pub fn shift_day(&self, date: NaiveDate, offset_days: i64) -> Result<NaiveDate, DayBoundaryError> {
        let shifted = if offset_days >= 0 {
            date.checked_add_days(Days::new(offset_days.unsigned_abs()))
        } else {
            date.checked_sub_days(Days::new(offset_days.unsigned_abs()))
        };
        shifted.ok_or(DayBoundaryError::DateOutOfRange { date, offset_days })
    }

    /// UTC instant of local midnight on `civil_day(instant) + offset_days`.
    ///
    /// `offset_days` of 0 is today, negative values reach into the past.
    /// Pure: the same arguments always produce the same instant.
    pub fn day_start(
        &self,
        instant: Timestamp,
        offset_days: i64,
    ) -> Result<Timestamp, DayBoundaryError> {
        let today = self.civil_day(instant);
        let target = self.shift_day(today, offset_days)?;

        match self.rule {
            OffsetRule::ReferenceInstant => {
                let offset_secs = instant
                    .with_timezone(&self.zone)
                    .offset()
                    .fix()
                    .local_minus_utc();
                target
                    .and_time(NaiveTime::MIN)
                    .and_utc()
                    .checked_sub_signed(chrono::Duration::seconds(i64::from(offset_secs)))
                    .ok_or(DayBoundaryError::DateOutOfRange {
                        date: today,
                        offset_days,
                    })
            }
            OffsetRule::TargetDay => self.civil_day_start(target),
        }
    }

    /// UTC instant at which `date` begins in the reference zone.
    ///
    /// An ambiguous midnight resolves to the earlier instant. A midnight that
    /// falls inside a DST gap resolves to the first instant after the gap.
    pub fn civil_day_start(&self, date: NaiveDate) -> Result<Timestamp, DayBoundaryError> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self.zone.from_local_datetime(&midnight) {
            LocalResult::Single(start) => Ok(start.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => self.start_after_gap(date, midnight),
        }
    }

    fn start_after_gap(
        &self,
        date: NaiveDate,
        midnight: NaiveDateTime,
    ) -> Result<Timestamp, DayBoundaryError> {
        // Clocks jump forward at midnight, so midnight under the offset in
        // force just before the jump is exactly the transition instant.
        let out_of_range = DayBoundaryError::DateOutOfRange {
            date,
            offset_days: 0,
        };
        let before = midnight
            .checked_sub_signed(chrono::Duration::hours(12))
            .ok_or_else(|| out_of_range.clone())?;
        let offset = self
            .zone
            .offset_from_local_datetime(&before)
            .earliest()
            .ok_or(DayBoundaryError::NoLocalMidnight {
                date,
                zone: self.zone.name(),
            })?
            .fix();

        let start = midnight
            .and_utc()
            .checked_sub_signed(chrono::Duration::seconds(i64::from(offset.local_minus_utc())))
            .ok_or(out_of_range)?;
        tracing::warn!(
            %date,
            zone = self.zone.name(),
            %start,
            "Local midnight falls in a DST gap, using first instant after the gap"
        );
        Ok(start)
    }
}
