use crate::utils::format_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn as_strings(&self) -> [String; 2] {
        [format_date(self.start), format_date(self.end)]
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", format_date(self.start), format_date(self.end))
    }
}

/// Why a candidate date produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Fewer than two days of data before the date.
    TooEarly,
    /// The date is on or after the last day of the series.
    TooLate,
    /// The model did not finish in time.
    TimedOut,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::TooEarly => "too close to the start of the series",
            SkipReason::TooLate => "on or after the end of the series",
            SkipReason::TimedOut => "model timed out",
        };
        f.write_str(text)
    }
}

/// Pre/post split of a series around one candidate date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub date: NaiveDate,
    pub pre: Period,
    pub post: Period,
}

impl AnalysisWindow {
    /// Valid only when `min < date - 1` and `max > date`.
    pub fn resolve(date: NaiveDate, min: NaiveDate, max: NaiveDate) -> Result<Self, SkipReason> {
        let Some(day_before) = date.pred_opt() else {
            return Err(SkipReason::TooEarly);
        };
        if min >= day_before {
            return Err(SkipReason::TooEarly);
        }
        if max <= date {
            return Err(SkipReason::TooLate);
        }
        Ok(Self {
            date,
            pre: Period {
                start: min,
                end: day_before,
            },
            post: Period {
                start: date,
                end: max,
            },
        })
    }
}
