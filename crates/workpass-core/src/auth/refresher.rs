use std::sync::Arc;

use tracing::{debug, info, warn};

use super::policy::RequestPolicy;
use super::store::SessionVault;
use super::{SessionErrorKind, SessionRecord, UserProfile};
use crate::api::{AuthProvider, ProfileStore};
use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New tokens were issued and persisted.
    Refreshed(SessionRecord),
    /// The provider refused or could not be reached; the stored session is gone.
    Failed(SessionErrorKind),
    /// The stored session changed while the refresh was in flight; nothing was written.
    Superseded,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed(_))
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            RefreshOutcome::Refreshed(record) => Some(record),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<SessionErrorKind> {
        match self {
            RefreshOutcome::Failed(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Exchanges refresh tokens for new sessions.
///
/// There is no retry loop beyond the request policy: a refresh that fails
/// clears the session and the user signs in again.
pub struct SessionRefresher {
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    vault: Arc<SessionVault>,
    clock: Arc<dyn Clock>,
    policy: RequestPolicy,
}

impl SessionRefresher {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        vault: Arc<SessionVault>,
        clock: Arc<dyn Clock>,
        policy: RequestPolicy,
    ) -> Self {
        Self {
            auth,
            profiles,
            vault,
            clock,
            policy,
        }
    }

    pub async fn refresh(&self, record: &SessionRecord) -> RefreshOutcome {
        let issued_at = self.clock.now();
        let grant = self
            .policy
            .run("refresh_session", || {
                self.auth.refresh_session(&record.refresh_token)
            })
            .await;

        let grant = match grant {
            Ok(grant)
                if grant.access_token != record.access_token
                    && grant.refresh_token != record.refresh_token =>
            {
                grant
            }
            Ok(_) => {
                warn!("Refresh returned the previous tokens, treating as failure");
                return self.fail(record).await;
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                return self.fail(record).await;
            }
        };

        let fallback = grant
            .user
            .as_ref()
            .map(|u| merge_profile(&record.user, &u.to_profile()))
            .unwrap_or_else(|| record.user.clone());
        let user = refresh_profile(
            self.profiles.as_ref(),
            &self.policy,
            &grant.access_token,
            fallback,
        )
        .await;

        let mut refreshed = match SessionRecord::from_grant(&grant, issued_at, user) {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, "Refresh grant unusable");
                return self.fail(record).await;
            }
        };
        refreshed.saved_at = self.clock.now();

        match self
            .vault
            .replace_if_current(&record.refresh_token, &refreshed)
            .await
        {
            Ok(true) => {
                info!(
                    user_id = %refreshed.user.id,
                    expires_at = %refreshed.expires_at,
                    "Session refreshed"
                );
                RefreshOutcome::Refreshed(refreshed)
            }
            Ok(false) => {
                debug!("Stored session changed during refresh, discarding result");
                RefreshOutcome::Superseded
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist refreshed session");
                self.fail(record).await
            }
        }
    }

    async fn fail(&self, record: &SessionRecord) -> RefreshOutcome {
        match self.vault.clear_if_current(&record.refresh_token).await {
            Ok(true) => RefreshOutcome::Failed(SessionErrorKind::RefreshFailed),
            Ok(false) => {
                debug!("Stored session changed during refresh, leaving it in place");
                RefreshOutcome::Superseded
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear session after refresh failure");
                RefreshOutcome::Failed(SessionErrorKind::RefreshFailed)
            }
        }
    }
}

/// Fill the gaps of `base` with whatever `update` knows.
fn merge_profile(base: &UserProfile, update: &UserProfile) -> UserProfile {
    UserProfile {
        id: update.id.clone(),
        full_name: update.full_name.clone().or_else(|| base.full_name.clone()),
        email: update.email.clone().or_else(|| base.email.clone()),
        role: update.role.clone().or_else(|| base.role.clone()),
        department: update.department.clone().or_else(|| base.department.clone()),
        employee_code: update
            .employee_code
            .clone()
            .or_else(|| base.employee_code.clone()),
    }
}

/// Look up the profile row once and fold it into the cached snapshot.
/// Any failure keeps `fallback`.
pub(crate) async fn refresh_profile(
    profiles: &dyn ProfileStore,
    policy: &RequestPolicy,
    access_token: &str,
    fallback: UserProfile,
) -> UserProfile {
    let lookup = policy
        .run("get_profile", || profiles.get_profile(access_token, &fallback.id))
        .await;
    match lookup {
        Ok(Some(profile)) => merge_profile(&fallback, &profile),
        Ok(None) => {
            debug!(user_id = %fallback.id, "No profile row, keeping cached snapshot");
            fallback
        }
        Err(e) => {
            warn!(user_id = %fallback.id, error = %e, "Profile lookup failed, keeping cached snapshot");
            fallback
        }
    }
}
