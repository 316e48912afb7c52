use crate::api::client::AttendanceApi;
use crate::coordination::request_coordinator::{Outcome, RequestCoordinator, RequestGuard};
use crate::models::attendance::{next_action, Attendance, NextAction};
use chrono::{Duration as WorkedDuration, NaiveTime};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

const TODAY_KEY: &str = "attendance/today";

#[derive(Debug, Default)]
struct TodayState {
    attendance: Option<Attendance>,
    loading: bool,
    loaded: bool,
    error: Option<String>,
}

/// Point-in-time view of today's attendance
#[derive(Debug, Clone, PartialEq)]
pub struct TodaySnapshot {
    pub attendance: Option<Attendance>,
    pub loading: bool,
    /// At least one fetch has finished
    pub loaded: bool,
    pub error: Option<String>,
    pub has_checked_in: bool,
    pub has_checked_out: bool,
    pub can_check_out: bool,
    pub next_action: NextAction,
}

impl TodaySnapshot {
    pub fn worked_duration(&self, now: NaiveTime) -> Option<WorkedDuration> {
        self.attendance.as_ref()?.worked_duration(now)
    }
}

/// Today's attendance record for the signed-in user
///
/// Refetches are dropped while one is running, and [`refetch`](Self::refetch)
/// is additionally throttled to one start per `min_interval`.
pub struct TodayAttendance {
    api: Arc<dyn AttendanceApi>,
    coordinator: RequestCoordinator,
    state: Mutex<TodayState>,
}

impl TodayAttendance {
    pub fn new(api: Arc<dyn AttendanceApi>, min_interval: Duration) -> Self {
        Self {
            api,
            coordinator: RequestCoordinator::new(min_interval),
            state: Mutex::new(TodayState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TodayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Throttled fetch
    pub async fn refetch(&self) -> Outcome<()> {
        match self.coordinator.try_begin(TODAY_KEY) {
            Ok(guard) => self.fetch(guard).await,
            Err(skip) => {
                debug!(?skip, "Today's attendance fetch skipped");
                Outcome::Skipped(skip)
            }
        }
    }

    /// Fetch ignoring the throttle; still skipped while another fetch runs
    pub async fn reload(&self) -> Outcome<()> {
        match self.coordinator.try_begin_now(TODAY_KEY) {
            Ok(guard) => self.fetch(guard).await,
            Err(skip) => {
                debug!(?skip, "Today's attendance reload skipped");
                Outcome::Skipped(skip)
            }
        }
    }

    async fn fetch(&self, guard: RequestGuard<'_>) -> Outcome<()> {
        {
            let mut state = self.state();
            state.loading = true;
            state.error = None;
        }

        debug!("Fetching today's attendance");
        let outcome = RequestCoordinator::drive(guard, self.api.today_attendance()).await;

        let mut state = self.state();
        state.loading = false;
        match outcome {
            Outcome::Completed(Ok(attendance)) => {
                info!(
                    found = attendance.is_some(),
                    "Today's attendance loaded"
                );
                state.attendance = attendance;
                state.loaded = true;
                Outcome::Completed(())
            }
            Outcome::Completed(Err(e)) => {
                warn!(error = %e, "Failed to load today's attendance");
                state.error = Some(e.to_string());
                state.loaded = true;
                Outcome::Completed(())
            }
            Outcome::Cancelled => Outcome::Cancelled,
            Outcome::Skipped(skip) => Outcome::Skipped(skip),
        }
    }

    /// Replace the record with one the server just returned
    pub fn replace(&self, attendance: Attendance) {
        let mut state = self.state();
        state.attendance = Some(attendance);
        state.error = None;
        state.loaded = true;
    }

    pub fn cancel(&self) -> bool {
        self.coordinator.cancel(TODAY_KEY)
    }

    pub fn attendance(&self) -> Option<Attendance> {
        self.state().attendance.clone()
    }

    pub fn next_action(&self) -> NextAction {
        next_action(self.state().attendance.as_ref())
    }

    pub fn snapshot(&self) -> TodaySnapshot {
        let state = self.state();
        let has_checked_in = state
            .attendance
            .as_ref()
            .is_some_and(Attendance::has_checked_in);
        let has_checked_out = state
            .attendance
            .as_ref()
            .is_some_and(Attendance::has_checked_out);

        TodaySnapshot {
            attendance: state.attendance.clone(),
            loading: state.loading,
            loaded: state.loaded,
            error: state.error.clone(),
            has_checked_in,
            has_checked_out,
            can_check_out: has_checked_in && !has_checked_out,
            next_action: next_action(state.attendance.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::request_coordinator::Skip;
    use crate::models::attendance::AttendanceStatus;
    use crate::session::test_support::{record, FakeApi};

    fn controller(api: &Arc<FakeApi>, min_interval: Duration) -> TodayAttendance {
        TodayAttendance::new(api.clone(), min_interval)
    }

    #[tokio::test]
    async fn test_initial_snapshot() {
        let api = Arc::new(FakeApi::default());
        let today = controller(&api, Duration::from_secs(1));
        let snapshot = today.snapshot();

        assert!(!snapshot.loaded);
        assert!(!snapshot.has_checked_in);
        assert_eq!(snapshot.next_action, NextAction::CheckIn);
    }

    #[tokio::test]
    async fn test_refetch_derives_flags() {
        let api = Arc::new(FakeApi::default());
        *api.today.lock().unwrap() = Some(record("2024-05-02", "08:55", "", AttendanceStatus::OnTime));

        let today = controller(&api, Duration::from_secs(1));
        assert!(today.refetch().await.is_completed());

        let snapshot = today.snapshot();
        assert!(snapshot.loaded);
        assert!(!snapshot.loading);
        assert!(snapshot.has_checked_in);
        assert!(!snapshot.has_checked_out);
        assert!(snapshot.can_check_out);
        assert_eq!(snapshot.next_action, NextAction::CheckOut);
        assert_eq!(
            snapshot.worked_duration(NaiveTime::from_hms_opt(9, 55, 0).unwrap()),
            Some(WorkedDuration::hours(1))
        );
    }

    #[tokio::test]
    async fn test_rapid_refetch_makes_one_call() {
        let api = Arc::new(FakeApi::default());
        let today = controller(&api, Duration::from_secs(1));

        assert!(today.refetch().await.is_completed());
        assert!(matches!(
            today.refetch().await,
            Outcome::Skipped(Skip::TooSoon { .. })
        ));
        assert_eq!(FakeApi::calls(&api.today_calls), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refetch_makes_one_call() {
        let api = Arc::new(FakeApi::with_delay(Duration::from_millis(50)));
        let today = controller(&api, Duration::ZERO);

        let (first, second) = tokio::join!(today.refetch(), today.reload());
        assert!(first.is_completed());
        assert_eq!(second, Outcome::Skipped(Skip::InFlight));
        assert_eq!(FakeApi::calls(&api.today_calls), 1);
    }

    #[tokio::test]
    async fn test_reload_bypasses_throttle() {
        let api = Arc::new(FakeApi::default());
        let today = controller(&api, Duration::from_secs(60));

        assert!(today.refetch().await.is_completed());
        assert!(today.reload().await.is_completed());
        assert_eq!(FakeApi::calls(&api.today_calls), 2);
    }

    #[tokio::test]
    async fn test_error_is_stored_and_record_kept() {
        let api = Arc::new(FakeApi::default());
        *api.today.lock().unwrap() = Some(record("2024-05-02", "08:55", "17:00", AttendanceStatus::Late));
        let today = controller(&api, Duration::ZERO);
        today.refetch().await;

        *api.today_error.lock().unwrap() = Some("Service unavailable".to_string());
        today.refetch().await;

        let snapshot = today.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("Service unavailable"));
        assert_eq!(snapshot.next_action, NextAction::Completed);
    }

    #[tokio::test]
    async fn test_replace_clears_error() {
        let api = Arc::new(FakeApi::default());
        *api.today_error.lock().unwrap() = Some("boom".to_string());
        let today = controller(&api, Duration::ZERO);
        today.refetch().await;
        assert!(today.snapshot().error.is_some());

        today.replace(record("2024-05-02", "09:00", "", AttendanceStatus::OnTime));
        let snapshot = today.snapshot();
        assert!(snapshot.error.is_none());
        assert_eq!(today.next_action(), NextAction::CheckOut);
    }

    #[tokio::test]
    async fn test_cancel_pending_fetch() {
        let api = Arc::new(FakeApi::with_delay(Duration::from_secs(5)));
        let today = Arc::new(controller(&api, Duration::ZERO));

        let t = Arc::clone(&today);
        let pending = tokio::spawn(async move { t.refetch().await });

        while FakeApi::calls(&api.today_calls) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(today.cancel());
        assert_eq!(pending.await.unwrap(), Outcome::Cancelled);
        assert!(!today.snapshot().loaded);
    }
}
