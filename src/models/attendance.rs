use crate::utils::time::parse_clock_time;
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    OnTime,
    Late,
}

/// How a check was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceMethod {
    Manual,
    Qr,
    Nfc,
}

/// What the user is expected to do next for the current day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    CheckIn,
    CheckOut,
    Completed,
}

/// One day of attendance for one user
///
/// Check times are `HH:MM` (or `HH:MM:SS`) strings; an empty string means the
/// check has not been recorded yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub agency_id: String,
    pub date: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub check_in_time: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub check_out_time: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub schedule_entry_time: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub schedule_exit_time: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub method_in: Option<AttendanceMethod>,
    #[serde(default)]
    pub method_out: Option<AttendanceMethod>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub updated_at: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Attendance {
    pub fn has_checked_in(&self) -> bool {
        !self.check_in_time.trim().is_empty()
    }

    pub fn has_checked_out(&self) -> bool {
        !self.check_out_time.trim().is_empty()
    }

    pub fn is_on_time(&self) -> bool {
        self.status == AttendanceStatus::OnTime
    }

    /// Time spent at work: until check-out if recorded, otherwise until `now`
    ///
    /// Returns `None` without a parseable check-in, or when the end precedes the start.
    pub fn worked_duration(&self, now: NaiveTime) -> Option<Duration> {
        let start = parse_clock_time(&self.check_in_time)?;
        let end = if self.has_checked_out() {
            parse_clock_time(&self.check_out_time)?
        } else {
            now
        };

        let worked = end - start;
        if worked < Duration::zero() {
            return None;
        }
        Some(worked)
    }
}

/// Derive the next action from an optional record of today
pub fn next_action(attendance: Option<&Attendance>) -> NextAction {
    match attendance {
        Some(a) if a.has_checked_in() && a.has_checked_out() => NextAction::Completed,
        Some(a) if a.has_checked_in() => NextAction::CheckOut,
        _ => NextAction::CheckIn,
    }
}
