use crate::models::attendance::AttendanceStatus;
use crate::utils::time::parse_clock_time;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Agency-level shift definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub agency_id: String,
    pub name: String,
    /// 0 = Sunday, 6 = Saturday
    pub days_of_week: Vec<u8>,
    pub entry_time: String,
    pub exit_time: String,
    pub grace_period_minutes: u32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub assigned_users_ids: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Schedule {
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self.days_of_week.contains(&weekday)
    }

    /// Latest check-in time still counted as on time, on the wall clock
    pub fn latest_on_time(&self) -> Option<NaiveTime> {
        let entry = parse_clock_time(&self.entry_time)?;
        Some(entry.overflowing_add_signed(self.grace()).0)
    }

    /// Status a check-in at `time` would receive; `None` if the entry time is malformed
    ///
    /// When the grace period runs past midnight, a check-in is measured against
    /// the nearest entry, so 23:58 and 00:03 both count for a 23:55 shift.
    pub fn status_for_check_in(&self, time: NaiveTime) -> Option<AttendanceStatus> {
        let entry = parse_clock_time(&self.entry_time)?;
        let (latest, wrapped) = entry.overflowing_add_signed(self.grace());

        let on_time = if wrapped == 0 {
            time <= latest
        } else {
            let mut offset = time.signed_duration_since(entry);
            if offset < -Duration::hours(12) {
                offset = offset + Duration::days(1);
            }
            offset <= self.grace()
        };

        Some(if on_time {
            AttendanceStatus::OnTime
        } else {
            AttendanceStatus::Late
        })
    }

    fn grace(&self) -> Duration {
        Duration::minutes(self.grace_period_minutes as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekday_schedule() -> Schedule {
        Schedule {
            id: "s1".to_string(),
            agency_id: "ag1".to_string(),
            name: "Office".to_string(),
            days_of_week: vec![1, 2, 3, 4, 5],
            entry_time: "09:00".to_string(),
            exit_time: "17:00".to_string(),
            grace_period_minutes: 10,
            is_default: true,
            assigned_users_ids: vec![],
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_is_working_day() {
        let schedule = weekday_schedule();
        // 2024-05-06 is a Monday, 2024-05-05 a Sunday
        assert!(schedule.is_working_day(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()));
        assert!(!schedule.is_working_day(NaiveDate::from_ymd_opt(2024, 5, 5).unwrap()));
    }

    #[test]
    fn test_grace_period_boundary() {
        let schedule = weekday_schedule();
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();

        assert_eq!(schedule.status_for_check_in(at(8, 45)), Some(AttendanceStatus::OnTime));
        assert_eq!(schedule.status_for_check_in(at(9, 10)), Some(AttendanceStatus::OnTime));
        assert_eq!(schedule.status_for_check_in(at(9, 11)), Some(AttendanceStatus::Late));
    }

    #[test]
    fn test_grace_period_past_midnight() {
        let mut schedule = weekday_schedule();
        schedule.entry_time = "23:55".to_string();
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();

        assert_eq!(schedule.latest_on_time(), Some(at(0, 5)));
        assert_eq!(schedule.status_for_check_in(at(23, 58)), Some(AttendanceStatus::OnTime));
        assert_eq!(schedule.status_for_check_in(at(0, 5)), Some(AttendanceStatus::OnTime));
        assert_eq!(schedule.status_for_check_in(at(0, 6)), Some(AttendanceStatus::Late));
        // early arrival before the shift starts
        assert_eq!(schedule.status_for_check_in(at(23, 30)), Some(AttendanceStatus::OnTime));
    }

    #[test]
    fn test_malformed_entry_time() {
        let mut schedule = weekday_schedule();
        schedule.entry_time = "nine".to_string();
        assert!(schedule.status_for_check_in(NaiveTime::MIN).is_none());
    }
}
