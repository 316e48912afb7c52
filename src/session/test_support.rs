use crate::api::client::AttendanceApi;
use crate::core::error::ClientError;
use crate::models::attendance::{Attendance, AttendanceStatus};
use crate::models::response::ApiResponse;
use crate::models::user::{AuthUserResponse, User, UserStatus};
use crate::validation::credentials::Credentials;
use crate::validation::qr::QrPayload;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn record(date: &str, check_in: &str, check_out: &str, status: AttendanceStatus) -> Attendance {
    crate::models::attendance::tests::record(date, check_in, check_out, status)
}

pub(crate) fn user() -> User {
    User {
        id: "u-1".to_string(),
        email: "ana@example.com".to_string(),
        name: "Ana".to_string(),
        lastname: Some("Lopez".to_string()),
        status: UserStatus::Active,
        agency_id: Some("ag-1".to_string()),
        created_at: String::new(),
        updated_at: String::new(),
    }
}

fn api_error(message: &str) -> ClientError {
    ClientError::Api {
        status: 400,
        message: message.to_string(),
    }
}

/// Scripted backend counting every call
#[derive(Default)]
pub(crate) struct FakeApi {
    pub delay: Duration,
    pub today: Mutex<Option<Attendance>>,
    pub today_error: Mutex<Option<String>>,
    pub history: Mutex<Vec<Attendance>>,
    pub history_error: Mutex<Option<String>>,
    pub history_ranges: Mutex<Vec<(NaiveDate, NaiveDate)>>,
    pub qr_response: Mutex<Option<ApiResponse<Attendance>>>,
    pub qr_error: Mutex<Option<String>>,
    pub profile_unauthorized: Mutex<bool>,
    pub login_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub today_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub qr_calls: AtomicUsize,
}

impl FakeApi {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl AttendanceApi for FakeApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthUserResponse, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if credentials.password != "secret1" {
            return Err(api_error("Invalid credentials"));
        }
        Ok(AuthUserResponse {
            user: user(),
            token: "jwt-1".to_string(),
            message: None,
        })
    }

    async fn current_user(&self) -> Result<User, ClientError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if *self.profile_unauthorized.lock().unwrap() {
            return Err(ClientError::Unauthorized {
                message: "Token expired".to_string(),
            });
        }
        Ok(user())
    }

    async fn today_attendance(&self) -> Result<Option<Attendance>, ClientError> {
        self.today_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(message) = self.today_error.lock().unwrap().clone() {
            return Err(api_error(&message));
        }
        Ok(self.today.lock().unwrap().clone())
    }

    async fn attendance_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Attendance>, ClientError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history_ranges.lock().unwrap().push((start, end));
        self.pause().await;
        if let Some(message) = self.history_error.lock().unwrap().clone() {
            return Err(api_error(&message));
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn mark_qr_attendance(
        &self,
        _payload: &QrPayload,
    ) -> Result<ApiResponse<Attendance>, ClientError> {
        self.qr_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(message) = self.qr_error.lock().unwrap().clone() {
            return Err(api_error(&message));
        }
        self.qr_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| api_error("no scripted QR response"))
    }
}
