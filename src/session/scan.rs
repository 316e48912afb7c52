use crate::api::client::AttendanceApi;
use crate::coordination::request_coordinator::Outcome;
use crate::models::attendance::{Attendance, AttendanceStatus};
use crate::session::today::TodayAttendance;
use crate::validation::qr::{CheckType, QrPayload};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub const MARK_FAILED_MESSAGE: &str = "Failed to record attendance";

/// QR scan workflow
///
/// `Ready → Scanning → Processing → Success | Error`, and `Reset` from anywhere
/// back to `Ready`. A scan is only accepted in `Ready` or `Scanning`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    Ready,
    Scanning,
    Processing {
        check_type: CheckType,
    },
    Success {
        attendance: Attendance,
        check_type: CheckType,
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    StartScanning,
    /// Payload failed local validation
    Rejected(String),
    /// Payload accepted and sent to the server
    Submitted(CheckType),
    Marked(Attendance),
    Failed(String),
    Reset,
}

impl ScanState {
    /// Next state for `event`, or `None` when the event is not valid here
    pub fn transition(&self, event: ScanEvent) -> Option<ScanState> {
        use ScanEvent as E;
        use ScanState as S;

        match (self, event) {
            (_, E::Reset) => Some(S::Ready),
            (S::Ready, E::StartScanning) => Some(S::Scanning),
            (S::Ready | S::Scanning, E::Rejected(message)) => Some(S::Error { message }),
            (S::Ready | S::Scanning, E::Submitted(check_type)) => {
                Some(S::Processing { check_type })
            }
            (S::Processing { check_type }, E::Marked(attendance)) => {
                let message = success_message(*check_type, attendance.status);
                Some(S::Success {
                    attendance,
                    check_type: *check_type,
                    message,
                })
            }
            (S::Processing { .. }, E::Failed(message)) => Some(S::Error { message }),
            _ => None,
        }
    }

    /// Whether a scanned code would be processed in this state
    pub fn accepts_scan(&self) -> bool {
        matches!(self, ScanState::Ready | ScanState::Scanning)
    }

    pub fn is_scanned(&self) -> bool {
        !self.accepts_scan()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Ready => "READY",
            ScanState::Scanning => "SCANNING",
            ScanState::Processing { .. } => "PROCESSING",
            ScanState::Success { .. } => "SUCCESS",
            ScanState::Error { .. } => "ERROR",
        }
    }

    /// Progress, success or error text for the current state
    pub fn message(&self) -> Option<&str> {
        match self {
            ScanState::Processing { .. } => Some("Processing attendance..."),
            ScanState::Success { message, .. } | ScanState::Error { message } => Some(message),
            _ => None,
        }
    }
}

pub fn success_message(check_type: CheckType, status: AttendanceStatus) -> String {
    match (check_type, status) {
        (CheckType::CheckIn, AttendanceStatus::OnTime) => "Check-in recorded on time".to_string(),
        (CheckType::CheckIn, AttendanceStatus::Late) => "Check-in recorded late".to_string(),
        (CheckType::CheckOut, _) => "Check-out recorded successfully".to_string(),
    }
}

/// Receives the outcome of each processed scan
pub trait ScanNotifier: Send + Sync {
    fn scan_succeeded(&self, attendance: &Attendance, message: &str);

    fn scan_failed(&self, message: &str);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl ScanNotifier for LogNotifier {
    fn scan_succeeded(&self, attendance: &Attendance, message: &str) {
        info!(date = %attendance.date, message, "Attendance recorded");
    }

    fn scan_failed(&self, message: &str) {
        warn!(message, "Attendance scan failed");
    }
}

/// Drives a QR scan from decoded payload to recorded attendance
pub struct QrAttendance {
    api: Arc<dyn AttendanceApi>,
    today: Arc<TodayAttendance>,
    notifier: Arc<dyn ScanNotifier>,
    state: Mutex<ScanState>,
}

impl QrAttendance {
    pub fn new(
        api: Arc<dyn AttendanceApi>,
        today: Arc<TodayAttendance>,
        notifier: Arc<dyn ScanNotifier>,
    ) -> Self {
        Self {
            api,
            today,
            notifier,
            state: Mutex::new(ScanState::Ready),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `event`, returning the new state; invalid events leave the state as is
    fn apply(&self, event: ScanEvent) -> ScanState {
        let mut state = self.lock();
        advance(&mut state, event);
        state.clone()
    }

    pub fn state(&self) -> ScanState {
        self.lock().clone()
    }

    pub fn today(&self) -> &Arc<TodayAttendance> {
        &self.today
    }

    /// Load today's record; skipped if a load is already running
    pub async fn load_today(&self) -> Outcome<()> {
        self.today.reload().await
    }

    pub fn start_scanning(&self) -> ScanState {
        self.apply(ScanEvent::StartScanning)
    }

    /// Process the decoded text of a QR code
    ///
    /// Ignored unless the workflow is `Ready` or `Scanning`. An invalid payload
    /// ends in `Error` without contacting the server.
    pub async fn handle_scan(&self, data: &str) -> ScanState {
        let payload = {
            let mut state = self.lock();
            if !state.accepts_scan() {
                debug!(state = state.name(), "Scan ignored, already scanned");
                return state.clone();
            }

            match QrPayload::parse(data) {
                Ok(payload) => {
                    advance(&mut state, ScanEvent::Submitted(payload.check_type));
                    payload
                }
                Err(e) => {
                    warn!(error = ?e, "Rejected QR payload");
                    let message = e.to_string();
                    advance(&mut state, ScanEvent::Rejected(message.clone()));
                    let rejected = state.clone();
                    drop(state);
                    self.notifier.scan_failed(&message);
                    return rejected;
                }
            }
        };

        info!(check_type = %payload.check_type, "Submitting QR attendance");

        match self.api.mark_qr_attendance(&payload).await {
            Ok(response) if response.success => match response.data {
                Some(attendance) => {
                    check_response_matches(payload.check_type, &attendance);
                    self.today.replace(attendance.clone());
                    let state = self.apply(ScanEvent::Marked(attendance.clone()));
                    if let Some(message) = state.message() {
                        self.notifier.scan_succeeded(&attendance, message);
                    }
                    state
                }
                None => self.fail(MARK_FAILED_MESSAGE.to_string()),
            },
            Ok(response) => {
                let message = if response.message.trim().is_empty() {
                    MARK_FAILED_MESSAGE.to_string()
                } else {
                    response.message
                };
                self.fail(message)
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn fail(&self, message: String) -> ScanState {
        warn!(message = %message, "QR attendance failed");
        let state = self.apply(ScanEvent::Failed(message.clone()));
        self.notifier.scan_failed(&message);
        state
    }

    /// Back to `Ready`, then reload today's record
    pub async fn reset(&self) -> ScanState {
        let state = self.apply(ScanEvent::Reset);
        if let Outcome::Skipped(skip) = self.today.reload().await {
            debug!(?skip, "Today's attendance reload after reset skipped");
        }
        state
    }
}

/// Move `state` along `event`; invalid events leave it unchanged
fn advance(state: &mut ScanState, event: ScanEvent) {
    match state.transition(event.clone()) {
        Some(next) => {
            debug!(from = state.name(), to = next.name(), "Scan state changed");
            *state = next;
        }
        None => debug!(state = state.name(), ?event, "Ignored scan event"),
    }
}

/// The action comes from the scanned code; a record that says otherwise is only logged
fn check_response_matches(check_type: CheckType, attendance: &Attendance) {
    let looks_like_check_in = !attendance.has_checked_out();
    let expected_check_in = check_type == CheckType::CheckIn;
    if looks_like_check_in != expected_check_in {
        warn!(
            check_type = %check_type,
            check_out_time = %attendance.check_out_time,
            "Server record does not match the scanned check type"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::ApiResponse;
    use crate::session::test_support::{record, FakeApi};
    use std::time::Duration;

    const CHECK_IN_URL: &str = "https://api.example.com/v1/api/attendance/qr?token=tok&type=check-in";
    const CHECK_OUT_URL: &str = "https://api.example.com/v1/api/attendance/qr?token=tok&type=check-out";

    #[derive(Default)]
    struct RecordingNotifier {
        successes: Mutex<Vec<String>>,
        failures: Mutex<Vec<String>>,
    }

    impl ScanNotifier for RecordingNotifier {
        fn scan_succeeded(&self, _attendance: &Attendance, message: &str) {
            self.successes.lock().unwrap().push(message.to_string());
        }

        fn scan_failed(&self, message: &str) {
            self.failures.lock().unwrap().push(message.to_string());
        }
    }

    fn setup(api: FakeApi) -> (Arc<FakeApi>, Arc<RecordingNotifier>, QrAttendance) {
        let api = Arc::new(api);
        let notifier = Arc::new(RecordingNotifier::default());
        let today = Arc::new(TodayAttendance::new(api.clone(), Duration::ZERO));
        let qr = QrAttendance::new(api.clone(), today, notifier.clone());
        (api, notifier, qr)
    }

    fn ok_response(attendance: Attendance) -> ApiResponse<Attendance> {
        ApiResponse {
            data: Some(attendance),
            message: "ok".to_string(),
            success: true,
        }
    }

    #[test]
    fn test_transitions() {
        let ready = ScanState::Ready;
        let scanning = ready.transition(ScanEvent::StartScanning).unwrap();
        assert_eq!(scanning, ScanState::Scanning);

        let processing = scanning
            .transition(ScanEvent::Submitted(CheckType::CheckIn))
            .unwrap();
        assert_eq!(processing.name(), "PROCESSING");

        let done = processing
            .transition(ScanEvent::Marked(record("2024-05-02", "09:15", "", AttendanceStatus::Late)))
            .unwrap();
        assert_eq!(done.message(), Some("Check-in recorded late"));

        assert!(done.transition(ScanEvent::StartScanning).is_none());
        assert_eq!(done.transition(ScanEvent::Reset), Some(ScanState::Ready));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(ScanState::Ready
            .transition(ScanEvent::Marked(record("2024-05-02", "", "", AttendanceStatus::OnTime)))
            .is_none());
        assert!(ScanState::Ready
            .transition(ScanEvent::Failed("x".to_string()))
            .is_none());
        assert!(ScanState::Scanning
            .transition(ScanEvent::StartScanning)
            .is_none());
        let error = ScanState::Error {
            message: "x".to_string(),
        };
        assert!(error
            .transition(ScanEvent::Submitted(CheckType::CheckOut))
            .is_none());
    }

    #[test]
    fn test_success_messages() {
        assert_eq!(
            success_message(CheckType::CheckIn, AttendanceStatus::OnTime),
            "Check-in recorded on time"
        );
        assert_eq!(
            success_message(CheckType::CheckOut, AttendanceStatus::Late),
            "Check-out recorded successfully"
        );
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_server() {
        let (api, notifier, qr) = setup(FakeApi::default());

        for payload in [
            "not a url",
            "https://x.test/attendance/qr?type=check-in",
            "https://x.test/attendance/qr?token=abc",
            "https://x.test/elsewhere?token=abc&type=check-in",
        ] {
            let state = qr.handle_scan(payload).await;
            assert_eq!(state.name(), "ERROR", "{} should be rejected", payload);
            qr.reset().await;
        }

        assert_eq!(FakeApi::calls(&api.qr_calls), 0);
        assert_eq!(notifier.failures.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rejected_scan_moves_scanning_to_error() {
        let (api, notifier, qr) = setup(FakeApi::default());

        assert_eq!(qr.start_scanning(), ScanState::Scanning);
        let state = qr.handle_scan("https://x.test/attendance/qr?token=abc&type=lunch").await;

        let message = "Invalid QR code. Please scan a valid attendance QR code.".to_string();
        assert_eq!(state, ScanState::Error { message: message.clone() });
        assert_eq!(qr.state(), state);
        assert_eq!(notifier.failures.lock().unwrap().as_slice(), [message]);
        assert_eq!(FakeApi::calls(&api.qr_calls), 0);

        // consumed until reset
        assert!(qr.start_scanning().is_scanned());
    }

    #[tokio::test]
    async fn test_successful_check_in_updates_today() {
        let api = FakeApi::default();
        *api.qr_response.lock().unwrap() =
            Some(ok_response(record("2024-05-02", "08:59", "", AttendanceStatus::OnTime)));
        let (api, notifier, qr) = setup(api);

        qr.start_scanning();
        let state = qr.handle_scan(CHECK_IN_URL).await;

        assert_eq!(state.name(), "SUCCESS");
        assert_eq!(state.message(), Some("Check-in recorded on time"));
        assert_eq!(FakeApi::calls(&api.qr_calls), 1);
        assert!(qr.today().snapshot().can_check_out);
        assert_eq!(
            notifier.successes.lock().unwrap().as_slice(),
            ["Check-in recorded on time".to_string()]
        );
    }

    #[tokio::test]
    async fn test_check_out_message_comes_from_payload_type() {
        let api = FakeApi::default();
        // server omits the check-out time; the scanned type still decides the message
        *api.qr_response.lock().unwrap() =
            Some(ok_response(record("2024-05-02", "08:59", "", AttendanceStatus::OnTime)));
        let (_, _, qr) = setup(api);

        let state = qr.handle_scan(CHECK_OUT_URL).await;
        assert_eq!(state.message(), Some("Check-out recorded successfully"));
    }

    #[tokio::test]
    async fn test_second_scan_is_ignored_until_reset() {
        let api = FakeApi::default();
        *api.qr_response.lock().unwrap() =
            Some(ok_response(record("2024-05-02", "08:59", "", AttendanceStatus::OnTime)));
        let (api, _, qr) = setup(api);

        qr.handle_scan(CHECK_IN_URL).await;
        let again = qr.handle_scan(CHECK_IN_URL).await;
        assert_eq!(again.name(), "SUCCESS");
        assert_eq!(FakeApi::calls(&api.qr_calls), 1);

        assert_eq!(qr.reset().await, ScanState::Ready);
        qr.handle_scan(CHECK_IN_URL).await;
        assert_eq!(FakeApi::calls(&api.qr_calls), 2);
    }

    #[tokio::test]
    async fn test_scan_during_processing_is_ignored() {
        let api = FakeApi::with_delay(Duration::from_millis(50));
        *api.qr_response.lock().unwrap() =
            Some(ok_response(record("2024-05-02", "08:59", "", AttendanceStatus::OnTime)));
        let (api, _, qr) = setup(api);

        let (first, second) = tokio::join!(qr.handle_scan(CHECK_IN_URL), qr.handle_scan(CHECK_IN_URL));
        assert_eq!(first.name(), "SUCCESS");
        assert_eq!(second.name(), "PROCESSING");
        assert_eq!(FakeApi::calls(&api.qr_calls), 1);
    }

    #[tokio::test]
    async fn test_server_error_message_is_verbatim() {
        let api = FakeApi::default();
        *api.qr_error.lock().unwrap() = Some("QR token expired".to_string());
        let (_, notifier, qr) = setup(api);

        let state = qr.handle_scan(CHECK_IN_URL).await;
        assert_eq!(
            state,
            ScanState::Error {
                message: "QR token expired".to_string()
            }
        );
        assert_eq!(
            notifier.failures.lock().unwrap().as_slice(),
            ["QR token expired".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_uses_fallback() {
        let api = FakeApi::default();
        *api.qr_response.lock().unwrap() = Some(ApiResponse {
            data: None,
            message: String::new(),
            success: false,
        });
        let (_, _, qr) = setup(api);

        let state = qr.handle_scan(CHECK_IN_URL).await;
        assert_eq!(state.message(), Some(MARK_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn test_reset_reloads_today() {
        let (api, _, qr) = setup(FakeApi::default());
        qr.load_today().await;
        qr.reset().await;
        assert_eq!(FakeApi::calls(&api.today_calls), 2);
    }
}
