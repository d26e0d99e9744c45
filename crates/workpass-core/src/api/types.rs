//! Wire types for the GoTrue auth and PostgREST endpoints.

use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::auth::UserProfile;

/// Token pair returned by the password, sign-up and refresh grants.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

impl TokenGrant {
    /// Access token lifetime, rejecting values chrono cannot represent.
    pub fn lifetime(&self) -> Result<chrono::Duration, ApiError> {
        if self.expires_in <= 0 {
            return Err(ApiError::InvalidResponse(format!(
                "Token grant has non-positive lifetime {}",
                self.expires_in
            )));
        }
        chrono::Duration::try_seconds(self.expires_in).ok_or_else(|| {
            ApiError::InvalidResponse(format!(
                "Token grant lifetime {} is out of range",
                self.expires_in
            ))
        })
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserMetadata {
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl AuthUser {
    /// Minimal profile built from the auth user alone, used until the
    /// profiles table has been consulted.
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            full_name: self.user_metadata.full_name.clone(),
            email: self.email.clone(),
            role: self.user_metadata.role.clone(),
            department: None,
            employee_code: None,
        }
    }
}

/// Sign-up either starts a session right away or waits for email
/// confirmation, depending on the project's auth settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(TokenGrant),
    Pending(AuthUser),
}

#[derive(Serialize)]
pub(crate) struct PasswordGrantBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct SignUpBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: SignUpData<'a>,
}

#[derive(Serialize)]
pub(crate) struct SignUpData<'a> {
    pub full_name: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RefreshGrantBody<'a> {
    pub refresh_token: &'a str,
}

/// Row of the `profiles` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, alias = "employee_id")]
    pub employee_code: Option<String>,
}

impl ProfileRow {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            department: self.department.clone(),
            employee_code: self.employee_code.clone(),
        }
    }
}
