//! In-process fakes for the provider traits.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::BoxFuture;
use tokio::sync::Notify;

use crate::api::{ApiError, AuthProvider, AuthUser, ProfileStore, SignUpResponse, TokenGrant};
use crate::api::types::UserMetadata;
use crate::auth::{SessionRecord, UserProfile};

pub(crate) const USER_ID: &str = "3c1f6a9e-0000-4000-8000-000000000001";
pub(crate) const PASSWORD: &str = "hunter2";

/// A fixed instant on a whole millisecond
pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

pub(crate) fn user() -> UserProfile {
    UserProfile {
        id: USER_ID.to_string(),
        full_name: Some("Ana Ruiz".into()),
        email: Some("ana@example.com".into()),
        role: Some("employee".into()),
        department: None,
        employee_code: None,
    }
}

/// A record that expires `expires_in` after `now`
pub(crate) fn record_expiring(now: DateTime<Utc>, expires_in: Duration) -> SessionRecord {
    SessionRecord {
        access_token: "access-0".into(),
        refresh_token: "refresh-0".into(),
        expires_at: now + expires_in,
        user: user(),
        saved_at: now,
    }
}

#[derive(Default)]
pub(crate) struct FakeAuth {
    pub reject_access: AtomicBool,
    pub reject_refresh: AtomicBool,
    pub refresh_outage: AtomicBool,
    pub pending_sign_up: AtomicBool,
    pub missing_profile: AtomicBool,
    pub get_user_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub sign_out_calls: AtomicU32,
    pub revoked_refresh: Mutex<HashSet<String>>,
    /// When set, refresh waits for a notification before answering
    pub refresh_gate: Mutex<Option<Arc<Notify>>>,
    /// Lifetime of issued access tokens in seconds
    pub ttl_secs: Mutex<Option<i64>>,
    /// Issue grants with these exact tokens instead of fresh ones
    pub echo_tokens: AtomicBool,
}

impl FakeAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn ttl(&self) -> i64 {
        self.ttl_secs.lock().unwrap().unwrap_or(3600)
    }

    fn auth_user(&self) -> AuthUser {
        AuthUser {
            id: USER_ID.to_string(),
            email: Some("ana@example.com".into()),
            user_metadata: UserMetadata {
                full_name: Some("Ana Ruiz".into()),
                role: Some("employee".into()),
            },
        }
    }

    fn issue(&self, previous_refresh: Option<&str>) -> TokenGrant {
        let n = self.refresh_calls.load(Ordering::SeqCst);
        let (access_token, refresh_token) = match previous_refresh {
            Some(prev) if self.echo_tokens.load(Ordering::SeqCst) => {
                ("access-0".to_string(), prev.to_string())
            }
            _ => (format!("access-{}", n), format!("refresh-{}", n)),
        };
        TokenGrant {
            access_token,
            refresh_token,
            expires_in: self.ttl(),
            token_type: Some("bearer".into()),
            user: Some(self.auth_user()),
        }
    }
}

impl AuthProvider for FakeAuth {
    fn get_user<'a>(&'a self, _access_token: &'a str) -> BoxFuture<'a, Result<AuthUser, ApiError>> {
        Box::pin(async move {
            self.get_user_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_access.load(Ordering::SeqCst) {
                return Err(ApiError::Unauthorized);
            }
            Ok(self.auth_user())
        })
    }

    fn refresh_session<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ApiError>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.refresh_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.refresh_outage.load(Ordering::SeqCst) {
                return Err(ApiError::ServerError("503 Service Unavailable".into()));
            }
            if self.reject_refresh.load(Ordering::SeqCst)
                || self.revoked_refresh.lock().unwrap().contains(refresh_token)
            {
                return Err(ApiError::Rejected("invalid_grant".into()));
            }
            Ok(self.issue(Some(refresh_token)))
        })
    }

    fn sign_in_with_password<'a>(
        &'a self,
        _email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ApiError>> {
        Box::pin(async move {
            if password != PASSWORD {
                return Err(ApiError::Rejected("invalid_credentials".into()));
            }
            let mut grant = self.issue(None);
            grant.access_token = "access-signin".into();
            grant.refresh_token = "refresh-signin".into();
            Ok(grant)
        })
    }

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        _password: &'a str,
        full_name: &'a str,
    ) -> BoxFuture<'a, Result<SignUpResponse, ApiError>> {
        Box::pin(async move {
            let mut user = self.auth_user();
            user.email = Some(email.to_string());
            user.user_metadata.full_name = Some(full_name.to_string());
            if self.pending_sign_up.load(Ordering::SeqCst) {
                return Ok(SignUpResponse::Pending(user));
            }
            let mut grant = self.issue(None);
            grant.access_token = "access-signup".into();
            grant.refresh_token = "refresh-signup".into();
            grant.user = Some(user);
            Ok(SignUpResponse::Session(grant))
        })
    }

    fn sign_out<'a>(&'a self, _access_token: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

impl ProfileStore for FakeAuth {
    fn get_profile<'a>(
        &'a self,
        _access_token: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserProfile>, ApiError>> {
        Box::pin(async move {
            if self.missing_profile.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(Some(UserProfile {
                id: user_id.to_string(),
                full_name: Some("Ana Ruiz".into()),
                email: Some("ana@example.com".into()),
                role: Some("supervisor".into()),
                department: Some("Field Ops".into()),
                employee_code: Some("EMP-0042".into()),
            }))
        })
    }
}
