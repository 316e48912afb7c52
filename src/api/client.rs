use crate::core::error::{ClientError, UNEXPECTED_ERROR_MESSAGE};
use crate::models::attendance::Attendance;
use crate::models::response::{ApiResponse, ErrorBody};
use crate::models::user::{AuthUserResponse, User};
use crate::stores::token_store::TokenStore;
use crate::utils::time::format_date_for_api;
use crate::validation::credentials::Credentials;
use crate::validation::qr::QrPayload;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const LOGIN_PATH: &str = "users/login";
const PROFILE_PATH: &str = "users/me";
const TODAY_PATH: &str = "attendance/today";
const HISTORY_PATH: &str = "attendance/history/user";
const QR_PATH: &str = "attendance/qr";

/// Operations the attendance backend offers
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// `POST users/login`, the only call made without a bearer token
    async fn login(&self, credentials: &Credentials) -> Result<AuthUserResponse, ClientError>;

    /// `GET users/me`
    async fn current_user(&self) -> Result<User, ClientError>;

    /// `GET attendance/today`; `None` when nothing was recorded yet
    async fn today_attendance(&self) -> Result<Option<Attendance>, ClientError>;

    /// `GET attendance/history/user?startDate&endDate`
    async fn attendance_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Attendance>, ClientError>;

    /// `GET attendance/qr?token&type`
    async fn mark_qr_attendance(
        &self,
        payload: &QrPayload,
    ) -> Result<ApiResponse<Attendance>, ClientError>;
}

/// HTTP client for the attendance REST API
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        // Url::join drops the last path segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .context(format!("Invalid API base URL: {}", base_url))?;

        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    /// Attach the bearer token when asked, send, and turn non-2xx statuses into errors.
    /// A 401 removes the stored token.
    async fn send(&self, request: RequestBuilder, authorized: bool) -> Result<Response, ClientError> {
        let request = if authorized {
            match self.tokens.get().await? {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        } else {
            request
        };

        let response = request.send().await.map_err(ClientError::from_transport)?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "API response");

        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| UNEXPECTED_ERROR_MESSAGE.to_string());

        if status == StatusCode::UNAUTHORIZED {
            warn!("API rejected the session token, removing it");
            if let Err(e) = self.tokens.delete().await {
                warn!(error = %e, "Failed to remove rejected token");
            }
            return Err(ClientError::Unauthorized { message });
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AttendanceApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthUserResponse, ClientError> {
        let body = LoginRequest {
            email: &credentials.email,
            password: &credentials.password,
        };
        let request = self.client.post(self.endpoint(LOGIN_PATH)?).json(&body);

        self.send(request, false)
            .await?
            .json::<AuthUserResponse>()
            .await
            .map_err(ClientError::from_transport)
    }

    async fn current_user(&self) -> Result<User, ClientError> {
        let request = self.client.get(self.endpoint(PROFILE_PATH)?);

        self.send(request, true)
            .await?
            .json::<User>()
            .await
            .map_err(ClientError::from_transport)
    }

    async fn today_attendance(&self) -> Result<Option<Attendance>, ClientError> {
        let request = self.client.get(self.endpoint(TODAY_PATH)?);
        let body = self
            .send(request, true)
            .await?
            .text()
            .await
            .map_err(ClientError::from_transport)?;

        let body = body.trim();
        if body.is_empty() || body == "null" {
            return Ok(None);
        }
        Ok(serde_json::from_str::<Option<Attendance>>(body)?)
    }

    async fn attendance_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Attendance>, ClientError> {
        let request = self.client.get(self.endpoint(HISTORY_PATH)?).query(&[
            ("startDate", format_date_for_api(start)),
            ("endDate", format_date_for_api(end)),
        ]);

        self.send(request, true)
            .await?
            .json::<Vec<Attendance>>()
            .await
            .map_err(ClientError::from_transport)
    }

    async fn mark_qr_attendance(
        &self,
        payload: &QrPayload,
    ) -> Result<ApiResponse<Attendance>, ClientError> {
        let request = self.client.get(self.endpoint(QR_PATH)?).query(&[
            ("token", payload.token.as_str()),
            ("type", payload.check_type.as_str()),
        ]);

        self.send(request, true)
            .await?
            .json::<ApiResponse<Attendance>>()
            .await
            .map_err(ClientError::from_transport)
    }
}
