use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use super::policy::RequestPolicy;
use super::{SessionErrorKind, SessionRecord, UserProfile};
use crate::api::AuthProvider;
use crate::clock::Clock;

/// Refresh once less than this much lifetime is left.
pub const DEFAULT_REFRESH_THRESHOLD_MINUTES: i64 = 10;

/// Result of checking a stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub needs_refresh: bool,
    pub user: Option<UserProfile>,
    pub error: Option<SessionErrorKind>,
}

impl Validation {
    fn invalid(needs_refresh: bool, error: SessionErrorKind) -> Self {
        Self {
            valid: false,
            needs_refresh,
            user: None,
            error: Some(error),
        }
    }
}

pub struct SessionValidator {
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    policy: RequestPolicy,
    refresh_threshold: Duration,
}

impl SessionValidator {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        policy: RequestPolicy,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            auth,
            clock,
            policy,
            refresh_threshold,
        }
    }

    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    /// Check a session locally and against the auth provider.
    ///
    /// Has no side effects; clearing a rejected session is up to the caller.
    pub async fn validate(&self, record: Option<&SessionRecord>) -> Validation {
        let Some(record) = record else {
            return Validation {
                valid: false,
                needs_refresh: false,
                user: None,
                error: Some(SessionErrorKind::NoSession),
            };
        };

        let now = self.clock.now();
        if record.is_expired_at(now) {
            debug!(expires_at = %record.expires_at, "Session expired");
            return Validation::invalid(true, SessionErrorKind::Expired);
        }

        let needs_refresh = record.time_until_expiry(now) < self.refresh_threshold;

        let remote = self
            .policy
            .run("get_user", || self.auth.get_user(&record.access_token))
            .await;

        match remote {
            Ok(user) if user.id == record.user.id => {
                debug!(
                    user_id = %user.id,
                    minutes_left = record.minutes_until_expiry(now),
                    needs_refresh,
                    "Session valid"
                );
                Validation {
                    valid: true,
                    needs_refresh,
                    user: Some(record.user.clone()),
                    error: None,
                }
            }
            Ok(user) => {
                warn!(
                    expected = %record.user.id,
                    actual = %user.id,
                    "Access token belongs to a different user"
                );
                Validation::invalid(true, SessionErrorKind::ValidationFailed)
            }
            Err(e) => {
                warn!(error = %e, "Remote session check failed");
                Validation::invalid(true, SessionErrorKind::ValidationFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{record_expiring, t0, FakeAuth};
    use crate::clock::ManualClock;
    use std::sync::atomic::Ordering;

    fn validator(auth: Arc<FakeAuth>, clock: &ManualClock) -> SessionValidator {
        SessionValidator::new(
            auth,
            Arc::new(clock.clone()),
            RequestPolicy::no_retry(std::time::Duration::from_secs(5)),
            Duration::minutes(DEFAULT_REFRESH_THRESHOLD_MINUTES),
        )
    }

    #[tokio::test]
    async fn test_no_record() {
        let clock = ManualClock::new(t0());
        let result = validator(FakeAuth::new(), &clock).validate(None).await;
        assert!(!result.valid);
        assert!(!result.needs_refresh);
        assert_eq!(result.user, None);
        assert_eq!(result.error, Some(SessionErrorKind::NoSession));
    }

    #[tokio::test]
    async fn test_expired_record_needs_refresh_without_remote_call() {
        let clock = ManualClock::new(t0());
        let auth = FakeAuth::new();
        let record = record_expiring(t0(), Duration::milliseconds(-1000));

        let result = validator(auth.clone(), &clock).validate(Some(&record)).await;
        assert!(!result.valid);
        assert!(result.needs_refresh);
        assert_eq!(result.error, Some(SessionErrorKind::Expired));
        assert_eq!(auth.get_user_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expiry_boundary_counts_as_expired() {
        let clock = ManualClock::new(t0());
        let record = record_expiring(t0(), Duration::zero());
        let result = validator(FakeAuth::new(), &clock).validate(Some(&record)).await;
        assert_eq!(result.error, Some(SessionErrorKind::Expired));
    }

    #[tokio::test]
    async fn test_far_from_expiry_is_valid_without_refresh() {
        let clock = ManualClock::new(t0());
        let record = record_expiring(t0(), Duration::minutes(15));

        let result = validator(FakeAuth::new(), &clock).validate(Some(&record)).await;
        assert!(result.valid);
        assert!(!result.needs_refresh);
        assert_eq!(result.user, Some(record.user.clone()));
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_close_to_expiry_is_valid_but_needs_refresh() {
        let clock = ManualClock::new(t0());
        let record = record_expiring(t0(), Duration::minutes(5));

        let result = validator(FakeAuth::new(), &clock).validate(Some(&record)).await;
        assert!(result.valid);
        assert!(result.needs_refresh);
    }

    #[tokio::test]
    async fn test_threshold_moves_with_clock() {
        let clock = ManualClock::new(t0());
        let record = record_expiring(t0(), Duration::minutes(30));
        let validator = validator(FakeAuth::new(), &clock);

        assert!(!validator.validate(Some(&record)).await.needs_refresh);
        clock.advance(Duration::minutes(21));
        assert!(validator.validate(Some(&record)).await.needs_refresh);
        clock.advance(Duration::minutes(9));
        assert_eq!(
            validator.validate(Some(&record)).await.error,
            Some(SessionErrorKind::Expired)
        );
    }

    #[tokio::test]
    async fn test_rejected_token_fails_validation() {
        let clock = ManualClock::new(t0());
        let auth = FakeAuth::new();
        auth.reject_access.store(true, Ordering::SeqCst);
        let record = record_expiring(t0(), Duration::minutes(30));

        let result = validator(auth, &clock).validate(Some(&record)).await;
        assert!(!result.valid);
        assert!(result.needs_refresh);
        assert_eq!(result.user, None);
        assert_eq!(result.error, Some(SessionErrorKind::ValidationFailed));
    }

    #[tokio::test]
    async fn test_token_for_other_user_fails_validation() {
        let clock = ManualClock::new(t0());
        let mut record = record_expiring(t0(), Duration::minutes(30));
        record.user.id = "someone-else".into();

        let result = validator(FakeAuth::new(), &clock).validate(Some(&record)).await;
        assert_eq!(result.error, Some(SessionErrorKind::ValidationFailed));
    }
}
