//! The session object the application holds on to.
//!
//! `SessionManager` is built once at startup from its dependencies (store,
//! auth provider, profile store, clock) and handed to whatever needs the
//! session. It owns the validator, refresher and monitor.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::monitor::{SessionMonitor, SessionStatus};
use super::policy::RequestPolicy;
use super::refresher::{refresh_profile, RefreshOutcome, SessionRefresher};
use super::store::{SessionStore, SessionVault};
use super::validator::{SessionValidator, Validation};
use super::{SessionErrorKind, SessionRecord};
use crate::api::{AuthProvider, ProfileStore, SignUpResponse, TokenGrant};
use crate::clock::Clock;
use crate::config::SessionSettings;

/// Result of the startup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The stored session is valid and was kept.
    Resumed(SessionRecord),
    /// The stored session was close to expiry or rejected and has been refreshed.
    Refreshed(SessionRecord),
    /// No usable session; the user has to sign in.
    SignInRequired(SessionErrorKind),
}

pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    vault: Arc<SessionVault>,
    clock: Arc<dyn Clock>,
    policy: RequestPolicy,
    validator: Arc<SessionValidator>,
    refresher: Arc<SessionRefresher>,
    monitor: SessionMonitor,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let vault = Arc::new(SessionVault::new(store));
        let validator = Arc::new(SessionValidator::new(
            auth.clone(),
            clock.clone(),
            settings.policy,
            settings.refresh_threshold,
        ));
        let refresher = Arc::new(SessionRefresher::new(
            auth.clone(),
            profiles.clone(),
            vault.clone(),
            clock.clone(),
            settings.policy,
        ));
        let monitor = SessionMonitor::new(
            validator.clone(),
            refresher.clone(),
            vault.clone(),
            settings.monitor_interval,
        );

        Self {
            auth,
            profiles,
            vault,
            clock,
            policy: settings.policy,
            validator,
            refresher,
            monitor,
        }
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.monitor.subscribe()
    }

    /// The stored session, if any. No validity check.
    pub fn current(&self) -> Result<Option<SessionRecord>> {
        self.vault.load()
    }

    /// Bearer token for backend calls, if a session is stored
    pub fn access_token(&self) -> Result<Option<String>> {
        Ok(self.vault.load()?.map(|r| r.access_token))
    }

    /// Validate the stored session without acting on the result
    pub async fn check(&self) -> Result<Validation> {
        let record = self.vault.load()?;
        Ok(self.validator.validate(record.as_ref()).await)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionRecord> {
        let issued_at = self.clock.now();
        let grant = self
            .policy
            .run("sign_in", || self.auth.sign_in_with_password(email, password))
            .await
            .context("Sign-in failed")?;

        let record = self.start_session(grant, issued_at).await?;
        info!(user_id = %record.user.id, "Signed in");
        Ok(record)
    }

    /// Create an account. Returns `None` when the project requires email
    /// confirmation before the first session is issued.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<Option<SessionRecord>> {
        let issued_at = self.clock.now();
        let response = self
            .auth
            .sign_up(email, password, full_name)
            .await
            .context("Sign-up failed")?;

        match response {
            SignUpResponse::Session(grant) => {
                let record = self.start_session(grant, issued_at).await?;
                info!(user_id = %record.user.id, "Signed up");
                Ok(Some(record))
            }
            SignUpResponse::Pending(user) => {
                info!(user_id = %user.id, "Signed up, waiting for email confirmation");
                Ok(None)
            }
        }
    }

    async fn start_session(
        &self,
        grant: TokenGrant,
        issued_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<SessionRecord> {
        let auth_user = grant
            .user
            .as_ref()
            .ok_or_else(|| anyhow!("Token grant did not include a user"))?;
        let user = refresh_profile(
            self.profiles.as_ref(),
            &self.policy,
            &grant.access_token,
            auth_user.to_profile(),
        )
        .await;

        let mut record = SessionRecord::from_grant(&grant, issued_at, user)
            .context("Token grant has an unusable lifetime")?;
        record.saved_at = self.clock.now();
        self.vault
            .save(&record)
            .await
            .context("Failed to persist session")?;
        self.monitor.publish(SessionStatus::Active {
            expires_at: record.expires_at,
        });
        Ok(record)
    }

    /// Stop monitoring, revoke the session server-side and forget it locally.
    /// The local session is cleared even if the server cannot be reached.
    pub async fn sign_out(&self) -> Result<()> {
        self.monitor.stop();

        if let Some(record) = self.vault.load()? {
            let revoked = self
                .policy
                .run("sign_out", || self.auth.sign_out(&record.access_token))
                .await;
            if let Err(e) = revoked {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }

        self.vault.clear().await.context("Failed to clear session")?;
        self.monitor.publish(SessionStatus::SignedOut);
        info!("Signed out");
        Ok(())
    }

    /// Startup check: resume, refresh, or ask for a sign-in.
    pub async fn restore(&self) -> Result<StartupOutcome> {
        let record = self.vault.load()?;
        let validation = self.validator.validate(record.as_ref()).await;

        let Some(record) = record else {
            self.monitor.publish(SessionStatus::SignedOut);
            return Ok(StartupOutcome::SignInRequired(SessionErrorKind::NoSession));
        };

        if validation.valid && !validation.needs_refresh {
            let record = self.refresh_snapshot(record).await?;
            self.monitor.publish(SessionStatus::Active {
                expires_at: record.expires_at,
            });
            info!(user_id = %record.user.id, "Session resumed");
            return Ok(StartupOutcome::Resumed(record));
        }

        // With a record present, every invalid outcome asks for a refresh.
        debug_assert!(validation.needs_refresh);
        debug!(error = ?validation.error, "Stored session needs refresh");
        match self.refresher.refresh(&record).await {
            RefreshOutcome::Refreshed(refreshed) => {
                self.monitor.publish(SessionStatus::Active {
                    expires_at: refreshed.expires_at,
                });
                Ok(StartupOutcome::Refreshed(refreshed))
            }
            RefreshOutcome::Failed(kind) => Ok(self.sign_in_required(kind)),
            RefreshOutcome::Superseded => match self.vault.load()? {
                Some(current) => {
                    self.monitor.publish(SessionStatus::Active {
                        expires_at: current.expires_at,
                    });
                    Ok(StartupOutcome::Resumed(current))
                }
                None => Ok(self.sign_in_required(SessionErrorKind::NoSession)),
            },
        }
    }

    fn sign_in_required(&self, kind: SessionErrorKind) -> StartupOutcome {
        warn!(reason = %kind, "Stored session is not usable");
        self.monitor.publish(SessionStatus::Lost { reason: kind });
        StartupOutcome::SignInRequired(kind)
    }

    /// Refresh the cached profile of a valid session once.
    async fn refresh_snapshot(&self, record: SessionRecord) -> Result<SessionRecord> {
        let user = refresh_profile(
            self.profiles.as_ref(),
            &self.policy,
            &record.access_token,
            record.user.clone(),
        )
        .await;
        if user == record.user {
            return Ok(record);
        }

        let mut updated = record.clone();
        updated.user = user;
        updated.saved_at = self.clock.now();
        if self
            .vault
            .replace_if_current(&record.refresh_token, &updated)
            .await?
        {
            Ok(updated)
        } else {
            Ok(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::monitor::MonitorState;
    use crate::auth::store::MemoryStore;
    use crate::auth::testing::{record_expiring, t0, FakeAuth, PASSWORD};
    use crate::clock::ManualClock;
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    struct Harness {
        auth: Arc<FakeAuth>,
        store: Arc<MemoryStore>,
        clock: ManualClock,
        manager: SessionManager,
    }

    fn harness() -> Harness {
        let auth = FakeAuth::new();
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(t0());
        let settings = SessionSettings {
            policy: RequestPolicy::no_retry(std::time::Duration::from_secs(5)),
            ..SessionSettings::default()
        };
        let manager = SessionManager::new(
            store.clone(),
            auth.clone(),
            auth.clone(),
            Arc::new(clock.clone()),
            settings,
        );
        Harness {
            auth,
            store,
            clock,
            manager,
        }
    }

    #[tokio::test]
    async fn test_sign_in_persists_session() {
        let h = harness();
        let record = h.manager.sign_in("ana@example.com", PASSWORD).await.unwrap();

        assert_eq!(record.access_token, "access-signin");
        assert_eq!(record.expires_at, t0() + Duration::hours(1));
        assert_eq!(record.user.department.as_deref(), Some("Field Ops"));
        assert_eq!(h.store.load().unwrap(), Some(record.clone()));
        assert_eq!(
            h.manager.monitor().status(),
            SessionStatus::Active {
                expires_at: record.expires_at
            }
        );
        assert_eq!(
            h.manager.access_token().unwrap().as_deref(),
            Some("access-signin")
        );
    }

    #[tokio::test]
    async fn test_wrong_password_stores_nothing() {
        let h = harness();
        assert!(h.manager.sign_in("ana@example.com", "nope").await.is_err());
        assert!(h.manager.current().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_stores_nothing() {
        let h = harness();
        *h.auth.ttl_secs.lock().unwrap() = Some(i64::MAX / 1000);
        assert!(h.manager.sign_in("ana@example.com", PASSWORD).await.is_err());
        assert!(h.manager.current().unwrap().is_none());
        assert_eq!(h.manager.monitor().status(), SessionStatus::SignedOut);
    }

    #[tokio::test]
    async fn test_sign_up_with_immediate_session() {
        let h = harness();
        let record = h
            .manager
            .sign_up("new@example.com", "pw", "New Hire")
            .await
            .unwrap()
            .expect("session expected");
        assert_eq!(record.refresh_token, "refresh-signup");
        assert!(h.store.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation() {
        let h = harness();
        h.auth.pending_sign_up.store(true, Ordering::SeqCst);
        let result = h
            .manager
            .sign_up("new@example.com", "pw", "New Hire")
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(h.store.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_clears_everything() {
        let h = harness();
        h.manager.sign_in("ana@example.com", PASSWORD).await.unwrap();
        h.manager.monitor().start();

        h.manager.sign_out().await.unwrap();

        assert!(h.store.load().unwrap().is_none());
        assert_eq!(h.auth.sign_out_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.manager.monitor().state(), MonitorState::Idle);
        assert_eq!(h.manager.monitor().status(), SessionStatus::SignedOut);
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_fine() {
        let h = harness();
        h.manager.sign_out().await.unwrap();
        assert_eq!(h.auth.sign_out_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restore_without_session() {
        let h = harness();
        assert_eq!(
            h.manager.restore().await.unwrap(),
            StartupOutcome::SignInRequired(SessionErrorKind::NoSession)
        );
    }

    #[tokio::test]
    async fn test_restore_resumes_and_refreshes_snapshot() {
        let h = harness();
        h.store
            .save(&record_expiring(t0(), Duration::minutes(45)))
            .unwrap();

        match h.manager.restore().await.unwrap() {
            StartupOutcome::Resumed(record) => {
                assert_eq!(record.access_token, "access-0");
                assert_eq!(record.user.employee_code.as_deref(), Some("EMP-0042"));
                assert_eq!(h.store.load().unwrap(), Some(record));
            }
            other => panic!("expected resume, got {:?}", other),
        }
        assert_eq!(h.auth.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restore_refreshes_near_expiry() {
        let h = harness();
        let old = record_expiring(t0(), Duration::minutes(5));
        h.store.save(&old).unwrap();

        match h.manager.restore().await.unwrap() {
            StartupOutcome::Refreshed(record) => {
                assert!(record.expires_at > old.expires_at);
                assert_eq!(h.store.load().unwrap(), Some(record));
            }
            other => panic!("expected refresh, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_restore_refreshes_rejected_token() {
        let h = harness();
        h.auth.reject_access.store(true, Ordering::SeqCst);
        let old = record_expiring(t0(), Duration::hours(2));
        h.store.save(&old).unwrap();

        match h.manager.restore().await.unwrap() {
            StartupOutcome::Refreshed(record) => {
                assert_ne!(record.refresh_token, old.refresh_token);
                assert_eq!(h.store.load().unwrap(), Some(record));
            }
            other => panic!("expected refresh, got {:?}", other),
        }
        assert_eq!(h.auth.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_expired_and_revoked() {
        let h = harness();
        h.auth.reject_refresh.store(true, Ordering::SeqCst);
        h.store
            .save(&record_expiring(t0(), Duration::minutes(-30)))
            .unwrap();

        assert_eq!(
            h.manager.restore().await.unwrap(),
            StartupOutcome::SignInRequired(SessionErrorKind::RefreshFailed)
        );
        assert!(h.store.load().unwrap().is_none());
        assert_eq!(
            h.manager.monitor().status(),
            SessionStatus::Lost {
                reason: SessionErrorKind::RefreshFailed
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_keeps_signed_in_session_alive() {
        let h = harness();
        let first = h.manager.sign_in("ana@example.com", PASSWORD).await.unwrap();
        let mut status = h.manager.subscribe();
        let _ = status.borrow_and_update();
        h.manager.monitor().start();

        // 55 minutes later the token is inside the refresh window
        h.clock.advance(Duration::minutes(55));
        status.changed().await.unwrap();

        let current = h.manager.current().unwrap().unwrap();
        assert_ne!(current.refresh_token, first.refresh_token);
        assert_eq!(current.expires_at, t0() + Duration::minutes(55) + Duration::hours(1));
        assert_eq!(h.manager.monitor().state(), MonitorState::Monitoring);
    }
}
