use serde::{Deserialize, Serialize};

/// Account state as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Pending,
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub lastname: Option<String>,
    pub status: UserStatus,
    #[serde(default)]
    pub agency_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Name and last name joined for display, last name omitted when absent
    pub fn full_name(&self) -> String {
        match self.lastname.as_deref().map(str::trim) {
            Some(lastname) if !lastname.is_empty() => format!("{} {}", self.name, lastname),
            _ => self.name.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Body returned by `POST users/login`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserResponse {
    pub user: User,
    pub token: String,
    #[serde(default)]
    pub message: Option<String>,
}
