use crate::constants::{API_DATE_FORMAT, SCHEDULED_LOOKAHEAD_DAYS};
use crate::error::{IngestError, Result};
use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use chrono_tz::Asia::Seoul;

/// Which days a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatePlan {
    /// `periods` consecutive days starting at `start`.
    Range { start: NaiveDate, periods: u32 },
    /// The single day `SCHEDULED_LOOKAHEAD_DAYS` after the invocation.
    Scheduled,
}

impl DatePlan {
    /// Builds the plan from command-line values. `scheduled` wins over a range.
    pub fn from_args(start_date: Option<&str>, periods: Option<u32>, scheduled: bool) -> Result<Self> {
        if scheduled {
            return Ok(DatePlan::Scheduled);
        }
        match (start_date, periods) {
            (Some(start), Some(periods)) => {
                let start = parse_api_date(start)?;
                let last_offset = u64::from(periods.saturating_sub(1));
                if start.checked_add_days(Days::new(last_offset)).is_none() {
                    return Err(IngestError::Parse(format!(
                        "{periods} days from {start} is past the last representable date"
                    )));
                }
                Ok(DatePlan::Range { start, periods })
            }
            _ => Err(IngestError::Config(
                "Start date and period were not provided".into(),
            )),
        }
    }

    pub fn dates(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        match self {
            DatePlan::Range { start, periods } => (0..*periods)
                .map_while(|offset| start.checked_add_days(Days::new(u64::from(offset))))
                .collect(),
            DatePlan::Scheduled => vec![scheduled_date(now)],
        }
    }
}

/// `now` in Seoul plus the scheduled lookahead.
pub fn scheduled_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Seoul).date_naive() + Duration::days(SCHEDULED_LOOKAHEAD_DAYS)
}

pub fn parse_api_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), API_DATE_FORMAT)
        .map_err(|e| IngestError::Parse(format!("invalid date '{value}' (expected YYYYMMDD): {e}")))
}
