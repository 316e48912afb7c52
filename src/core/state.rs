// Application state (AppState)

use crate::api::client::{ApiClient, AttendanceApi};
use crate::core::config::Config;
use crate::session::auth::AuthSession;
use crate::session::history::AttendanceHistory;
use crate::session::scan::{QrAttendance, ScanNotifier};
use crate::session::today::TodayAttendance;
use crate::stores::token_store::{FallbackTokenStore, FileTokenStore, MemoryTokenStore, TokenStore};
use crate::utils::time::{Clock, SystemClock};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Everything a front end needs, wired from one config
///
/// All fields are wrapped in Arc so views can share them.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn TokenStore>,

    pub api: Arc<dyn AttendanceApi>,

    pub auth: Arc<AuthSession>,

    /// Shared by the dashboard and the scan flow
    pub today: Arc<TodayAttendance>,

    pub scan: Arc<QrAttendance>,

    pub history: Arc<AttendanceHistory>,

    pub clock: Arc<dyn Clock>,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, notifier: Arc<dyn ScanNotifier>) -> Result<Self> {
        let tokens = build_token_store(&config)?;

        let api: Arc<dyn AttendanceApi> = Arc::new(
            ApiClient::new(&config.api.base_url, config.request_timeout(), Arc::clone(&tokens))
                .context("Failed to create API client")?,
        );

        Ok(Self::with_parts(config, tokens, api, Arc::new(SystemClock), notifier))
    }

    /// Wire the controllers around an existing API, token store and clock
    pub fn with_parts(
        config: Config,
        tokens: Arc<dyn TokenStore>,
        api: Arc<dyn AttendanceApi>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn ScanNotifier>,
    ) -> Self {
        let config = Arc::new(config);

        let auth = Arc::new(AuthSession::new(Arc::clone(&api), Arc::clone(&tokens)));
        let today = Arc::new(TodayAttendance::new(
            Arc::clone(&api),
            config.today_min_interval(),
        ));
        let scan = Arc::new(QrAttendance::new(
            Arc::clone(&api),
            Arc::clone(&today),
            notifier,
        ));
        let history = Arc::new(AttendanceHistory::new(
            Arc::clone(&api),
            Arc::clone(&clock),
            config.history_debounce(),
        ));

        Self {
            tokens,
            api,
            auth,
            today,
            scan,
            history,
            clock,
            config,
        }
    }
}

fn build_token_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    if config.storage.memory_only {
        debug!("Using in-memory token store");
        return Ok(Arc::new(MemoryTokenStore::new()));
    }

    let path = match &config.storage.token_path {
        Some(path) => path.clone(),
        None => FileTokenStore::default_path().context("Failed to locate token file")?,
    };
    debug!(path = %path.display(), "Using file token store");

    Ok(Arc::new(FallbackTokenStore::new(FileTokenStore::new(path))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::auth::Route;
    use crate::session::scan::LogNotifier;
    use crate::session::test_support::FakeApi;
    use crate::utils::time::FixedClock;
    use chrono::{NaiveDate, NaiveTime};

    #[tokio::test]
    async fn test_new_with_memory_store() {
        let mut config = Config::default();
        config.storage.memory_only = true;

        let state = AppState::new(config, Arc::new(LogNotifier)).unwrap();
        assert_eq!(state.tokens.get().await.unwrap(), None);
        assert_eq!(state.auth.restore().await, Route::SignIn);
    }

    #[tokio::test]
    async fn test_new_with_token_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.token_path = Some(dir.path().join("token"));

        let state = AppState::new(config, Arc::new(LogNotifier)).unwrap();
        state.tokens.set("abc").await.unwrap();
        assert!(dir.path().join("token").exists());
    }

    #[tokio::test]
    async fn test_scan_and_dashboard_share_today() {
        let api = Arc::new(FakeApi::default());
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        ));
        let state = AppState::with_parts(
            Config::default(),
            Arc::new(MemoryTokenStore::new()),
            api,
            clock,
            Arc::new(LogNotifier),
        );

        assert!(Arc::ptr_eq(state.scan.today(), &state.today));
        assert_eq!(state.clock.now_time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(
            state.history.snapshot().range.start,
            NaiveDate::from_ymd_opt(2024, 5, 8).unwrap()
        );
    }
}
