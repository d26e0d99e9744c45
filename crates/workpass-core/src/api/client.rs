//! API client for the Supabase auth and REST endpoints.
//!
//! This module provides the `SupabaseClient` struct, which implements the
//! [`AuthProvider`] and [`ProfileStore`] seams over reqwest.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::provider::{AuthProvider, ProfileStore};
use super::types::{
    AuthUser, PasswordGrantBody, ProfileRow, RefreshGrantBody, SignUpBody, SignUpData,
    SignUpResponse, TokenGrant,
};
use super::ApiError;
use crate::auth::UserProfile;

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the GoTrue auth service
const AUTH_PATH: &str = "/auth/v1";

/// Path prefix of the PostgREST service
const REST_PATH: &str = "/rest/v1";

/// Table holding the employee profile rows
const PROFILES_TABLE: &str = "profiles";

/// Overall HTTP request timeout in seconds.
/// The session policy applies a tighter per-call timeout on top of this.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Supabase client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    /// Create a new client for a project URL such as `https://abc.supabase.co`
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, AUTH_PATH, path)
    }

    fn profile_url(&self, user_id: &str) -> String {
        format!(
            "{}{}/{}?id=eq.{}&select=*",
            self.base_url, REST_PATH, PROFILES_TABLE, user_id
        )
    }

    /// Every request carries the project key; authenticated ones add the bearer token.
    fn with_keys(&self, request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        let request = request
            .header("apikey", &self.anon_key)
            .header(header::ACCEPT, "application/json");
        match access_token {
            Some(token) => request.bearer_auth(token),
            None => request.bearer_auth(&self.anon_key),
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, ApiError> {
        let response = self
            .with_keys(self.client.get(self.auth_url("/user")), Some(access_token))
            .send()
            .await?;
        Self::parse(response, "user response").await
    }

    async fn grant(&self, grant_type: &str, body: &impl serde::Serialize) -> Result<TokenGrant, ApiError> {
        let url = self.auth_url(&format!("/token?grant_type={}", grant_type));
        let response = self
            .with_keys(self.client.post(&url), None)
            .json(body)
            .send()
            .await?;
        let grant: TokenGrant = Self::parse(response, "token grant").await?;
        grant.lifetime()?;
        debug!(grant_type, expires_in = grant.expires_in, "Token grant issued");
        Ok(grant)
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpResponse, ApiError> {
        let body = SignUpBody {
            email,
            password,
            data: SignUpData { full_name },
        };
        let response = self
            .with_keys(self.client.post(self.auth_url("/signup")), None)
            .json(&body)
            .send()
            .await?;
        Self::parse(response, "sign-up response").await
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let response = self
            .with_keys(self.client.post(self.auth_url("/logout")), Some(access_token))
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Option<UserProfile>, ApiError> {
        let response = self
            .with_keys(self.client.get(self.profile_url(user_id)), Some(access_token))
            .send()
            .await?;
        let rows: Vec<ProfileRow> = Self::parse(response, "profile rows").await?;
        if rows.len() > 1 {
            warn!(user_id, rows = rows.len(), "Multiple profile rows for one user, using the first");
        }
        Ok(rows.first().map(ProfileRow::to_profile))
    }
}

impl AuthProvider for SupabaseClient {
    fn get_user<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<AuthUser, ApiError>> {
        Box::pin(self.fetch_user(access_token))
    }

    fn refresh_session<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ApiError>> {
        Box::pin(async move {
            self.grant("refresh_token", &RefreshGrantBody { refresh_token })
                .await
        })
    }

    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ApiError>> {
        Box::pin(async move {
            self.grant("password", &PasswordGrantBody { email, password })
                .await
        })
    }

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        full_name: &'a str,
    ) -> BoxFuture<'a, Result<SignUpResponse, ApiError>> {
        Box::pin(self.create_user(email, password, full_name))
    }

    fn sign_out<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.logout(access_token))
    }
}

impl ProfileStore for SupabaseClient {
    fn get_profile<'a>(
        &'a self,
        access_token: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserProfile>, ApiError>> {
        Box::pin(self.fetch_profile(access_token, user_id))
    }
}
