//! Biweekly timetable arithmetic.
//!
//! Weeks are counted from a fixed term epoch; the epoch week is a numerator
//! week and parity alternates from there in both directions.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::{Group, ScheduleDay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeekParity {
    Numerator,
    Denominator,
}

impl WeekParity {
    pub fn label(self) -> &'static str {
        match self {
            WeekParity::Numerator => "Числитель",
            WeekParity::Denominator => "Знаменатель",
        }
    }
}

impl fmt::Display for WeekParity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleCalendar {
    epoch: NaiveDate,
}

impl Default for ScheduleCalendar {
    fn default() -> Self {
        Self::new(NaiveDate::from_ymd_opt(2023, 9, 1).expect("2023-09-01 is a valid date"))
    }
}

impl ScheduleCalendar {
    pub fn new(epoch: NaiveDate) -> Self {
        Self { epoch }
    }

    pub fn epoch(&self) -> NaiveDate {
        self.epoch
    }

    /// Zero-based week offset from the epoch; days before the epoch land in
    /// negative weeks (floor division, not truncation).
    pub fn week_index(&self, date: NaiveDate) -> i64 {
        (date - self.epoch).num_days().div_euclid(7)
    }

    pub fn is_numerator_week(&self, date: NaiveDate) -> bool {
        self.week_index(date).rem_euclid(2) == 0
    }

    pub fn week_parity(&self, date: NaiveDate) -> WeekParity {
        if self.is_numerator_week(date) {
            WeekParity::Numerator
        } else {
            WeekParity::Denominator
        }
    }

    pub fn schedule_for<'g>(&self, group: &'g Group, date: NaiveDate) -> &'g [ScheduleDay] {
        match self.week_parity(date) {
            WeekParity::Numerator => &group.numerator,
            WeekParity::Denominator => &group.denominator,
        }
    }

    /// Pair count for the first schedule entry matching the date's weekday,
    /// or 0 when the active week has no such entry.
    pub fn required_pairs(&self, group: &Group, date: NaiveDate) -> u32 {
        let weekday = date.weekday();
        self.schedule_for(group, date)
            .iter()
            .find(|entry| entry.day == weekday)
            .map(|entry| entry.pairs)
            .unwrap_or(0)
    }
}
