use crate::api::client::AttendanceApi;
use crate::coordination::debouncer::Debouncer;
use crate::coordination::request_coordinator::{Outcome, RequestCoordinator};
use crate::core::error::ValidationError;
use crate::models::attendance::{Attendance, AttendanceStatus};
use crate::utils::time::{format_date_for_api, Clock};
use chrono::{Days, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    Week,
    Month,
    Quarter,
    Custom,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Week => "week",
            TimePeriod::Month => "month",
            TimePeriod::Quarter => "quarter",
            TimePeriod::Custom => "custom",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "week" => Ok(TimePeriod::Week),
            "month" => Ok(TimePeriod::Month),
            "quarter" => Ok(TimePeriod::Quarter),
            "custom" => Ok(TimePeriod::Custom),
            other => Err(format!("unknown period '{}'", other)),
        }
    }
}

/// Inclusive range of days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: format_date_for_api(start),
                end: format_date_for_api(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Range ending today for a preset period; `None` for `Custom`
    pub fn for_period(period: TimePeriod, today: NaiveDate) -> Option<Self> {
        let start = match period {
            TimePeriod::Week => today.checked_sub_days(Days::new(7)),
            TimePeriod::Month => today.checked_sub_months(Months::new(1)),
            TimePeriod::Quarter => today.checked_sub_months(Months::new(3)),
            TimePeriod::Custom => return None,
        };
        Some(Self {
            start: start.unwrap_or(NaiveDate::MIN),
            end: today,
        })
    }

    /// De-duplication key: `YYYY-MM-DD-YYYY-MM-DD`
    pub fn request_id(&self) -> String {
        format!(
            "{}-{}",
            format_date_for_api(self.start),
            format_date_for_api(self.end)
        )
    }
}

/// Aggregates over a fetched set of records
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttendanceStats {
    pub total_days: usize,
    pub present_days: usize,
    pub on_time_days: usize,
    pub late_days: usize,
    /// present / total × 100, 0 without records
    pub attendance_rate: f64,
    /// on time / present × 100, 0 without presence
    pub punctuality_rate: f64,
}

impl AttendanceStats {
    pub fn from_records(records: &[Attendance]) -> Self {
        let total_days = records.len();
        let present_days = records.iter().filter(|a| a.has_checked_in()).count();
        let on_time_days = records
            .iter()
            .filter(|a| a.status == AttendanceStatus::OnTime)
            .count();
        let late_days = records
            .iter()
            .filter(|a| a.status == AttendanceStatus::Late)
            .count();

        Self {
            total_days,
            present_days,
            on_time_days,
            late_days,
            attendance_rate: percentage(present_days, total_days),
            punctuality_rate: percentage(on_time_days, present_days),
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[derive(Debug)]
struct HistoryState {
    records: Vec<Attendance>,
    loading: bool,
    refreshing: bool,
    error: Option<String>,
    period: TimePeriod,
    range: DateRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    /// Newest first
    pub records: Vec<Attendance>,
    pub loading: bool,
    pub refreshing: bool,
    pub error: Option<String>,
    pub period: TimePeriod,
    pub range: DateRange,
    pub stats: AttendanceStats,
}

struct HistoryInner {
    api: Arc<dyn AttendanceApi>,
    coordinator: RequestCoordinator,
    state: Mutex<HistoryState>,
}

impl HistoryInner {
    fn state(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(&self, pull_to_refresh: bool) -> Outcome<()> {
        let range = self.state().range;
        let key = range.request_id();

        let guard = match self.coordinator.try_begin(&key) {
            Ok(guard) => guard,
            Err(skip) => {
                debug!(key = %key, ?skip, "Duplicate history request skipped");
                return Outcome::Skipped(skip);
            }
        };

        {
            let mut state = self.state();
            if pull_to_refresh {
                state.refreshing = true;
            } else {
                state.loading = true;
            }
            state.error = None;
        }

        debug!(start = %range.start, end = %range.end, "Fetching attendance history");
        let outcome = RequestCoordinator::drive(
            guard,
            self.api.attendance_history(range.start, range.end),
        )
        .await;

        let mut state = self.state();
        state.loading = false;
        state.refreshing = false;
        match outcome {
            Outcome::Completed(result) if state.range != range => {
                debug!(key = %key, ok = result.is_ok(), "Discarding history for a stale range");
                Outcome::Completed(())
            }
            Outcome::Completed(Ok(mut records)) => {
                records.sort_by(|a, b| b.date.cmp(&a.date));
                info!(records = records.len(), key = %key, "Attendance history loaded");
                state.records = records;
                Outcome::Completed(())
            }
            Outcome::Completed(Err(e)) => {
                warn!(error = %e, key = %key, "Failed to load attendance history");
                state.records.clear();
                state.error = Some(e.to_string());
                Outcome::Completed(())
            }
            Outcome::Cancelled => Outcome::Cancelled,
            Outcome::Skipped(skip) => Outcome::Skipped(skip),
        }
    }
}

/// Attendance history for a selectable period
///
/// Period and range changes schedule a debounced fetch; identical requests
/// (same formatted range) are never in flight twice.
pub struct AttendanceHistory {
    inner: Arc<HistoryInner>,
    clock: Arc<dyn Clock>,
    debouncer: Debouncer,
}

impl AttendanceHistory {
    /// Starts on the `Week` period; nothing is fetched until asked
    pub fn new(api: Arc<dyn AttendanceApi>, clock: Arc<dyn Clock>, debounce: Duration) -> Self {
        let today = clock.today();
        let range = DateRange::for_period(TimePeriod::Week, today).unwrap_or(DateRange {
            start: today,
            end: today,
        });

        Self {
            inner: Arc::new(HistoryInner {
                api,
                coordinator: RequestCoordinator::unthrottled(),
                state: Mutex::new(HistoryState {
                    records: Vec::new(),
                    loading: false,
                    refreshing: false,
                    error: None,
                    period: TimePeriod::Week,
                    range,
                }),
            }),
            clock,
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Fetch after the debounce delay; calls within the delay collapse into one.
    /// Spawns onto the current Tokio runtime.
    pub fn schedule_refetch(&self) -> JoinHandle<bool> {
        let inner = Arc::clone(&self.inner);
        self.debouncer.schedule(async move {
            inner.fetch(false).await;
        })
    }

    pub async fn refetch(&self) -> Outcome<()> {
        self.inner.fetch(false).await
    }

    /// Pull-to-refresh: same request, flags `refreshing` instead of `loading`
    pub async fn refresh(&self) -> Outcome<()> {
        self.inner.fetch(true).await
    }

    /// Select a period, recomputing the range from today for preset periods.
    /// Returns the scheduled fetch when the range changed.
    pub fn set_period(&self, period: TimePeriod) -> Option<JoinHandle<bool>> {
        let new_range = DateRange::for_period(period, self.clock.today());
        {
            let mut state = self.inner.state();
            state.period = period;
            match new_range {
                Some(range) if range != state.range => {
                    info!(period = %period, start = %range.start, end = %range.end, "History range changed");
                    state.range = range;
                }
                _ => return None,
            }
        }

        self.inner.coordinator.cancel_all();
        Some(self.schedule_refetch())
    }

    /// Use an explicit range; switches the period to `Custom` only when the range changes
    pub fn set_custom_range(
        &self,
        range: DateRange,
    ) -> Result<Option<JoinHandle<bool>>, ValidationError> {
        let range = DateRange::new(range.start, range.end)?;
        {
            let mut state = self.inner.state();
            if state.range == range {
                return Ok(None);
            }
            info!(start = %range.start, end = %range.end, "Custom history range set");
            state.range = range;
            state.period = TimePeriod::Custom;
        }

        self.inner.coordinator.cancel_all();
        Ok(Some(self.schedule_refetch()))
    }

    pub fn stats(&self) -> AttendanceStats {
        AttendanceStats::from_records(&self.inner.state().records)
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        let state = self.inner.state();
        HistorySnapshot {
            records: state.records.clone(),
            loading: state.loading,
            refreshing: state.refreshing,
            error: state.error.clone(),
            period: state.period,
            range: state.range,
            stats: AttendanceStats::from_records(&state.records),
        }
    }
}
