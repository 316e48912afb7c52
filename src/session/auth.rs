use crate::api::client::AttendanceApi;
use crate::core::error::ClientError;
use crate::models::user::User;
use crate::stores::token_store::TokenStore;
use crate::validation::credentials::Credentials;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Which part of the app the user should see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    Main,
}

#[derive(Debug)]
struct AuthState {
    user: Option<User>,
    route: Route,
    loading: bool,
}

/// Signed-in user and token lifecycle
///
/// Passed explicitly to whatever needs the current user.
pub struct AuthSession {
    api: Arc<dyn AttendanceApi>,
    tokens: Arc<dyn TokenStore>,
    state: RwLock<AuthState>,
}

impl AuthSession {
    pub fn new(api: Arc<dyn AttendanceApi>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            tokens,
            state: RwLock::new(AuthState {
                user: None,
                route: Route::SignIn,
                loading: true,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, user: Option<User>, route: Route) -> Route {
        let mut state = self.write();
        state.user = user;
        state.route = route;
        state.loading = false;
        route
    }

    /// Startup probe: a stored token is valid if `users/me` accepts it.
    /// A rejected token is removed.
    pub async fn restore(&self) -> Route {
        let token = match self.tokens.get().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read stored token");
                None
            }
        };

        if token.is_none() {
            info!("No stored session");
            return self.set(None, Route::SignIn);
        }

        match self.api.current_user().await {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored");
                self.set(Some(user), Route::Main)
            }
            Err(e) => {
                warn!(error = %e, "Stored session is no longer valid");
                if let Err(e) = self.tokens.delete().await {
                    warn!(error = %e, "Failed to remove stored token");
                }
                self.set(None, Route::SignIn)
            }
        }
    }

    /// Validate locally, log in, persist the token
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let credentials = Credentials::validate(email, password)?;
        let response = self.api.login(&credentials).await?;
        self.tokens.set(&response.token).await?;

        info!(user_id = %response.user.id, "Signed in");
        self.set(Some(response.user.clone()), Route::Main);
        Ok(response.user)
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.tokens.delete().await?;
        info!("Signed out");
        self.set(None, Route::SignIn);
        Ok(())
    }

    /// Re-fetch the profile. A 401 leaves the route untouched; the token is
    /// already gone and the next protected call fails the same way.
    pub async fn profile(&self) -> Result<User, ClientError> {
        let user = self.api.current_user().await?;
        self.write().user = Some(user.clone());
        Ok(user)
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn route(&self) -> Route {
        self.read().route
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().user.is_some()
    }
}
