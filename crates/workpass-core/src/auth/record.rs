use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, TokenGrant};

/// Profile fields cached alongside the tokens so a cold start can render
/// the signed-in user without a network round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub employee_code: Option<String>,
}

impl UserProfile {
    /// Name to show in prompts and logs, falling back to the email and then the id
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// The persisted session of this installation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub saved_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a record from a token grant.
    ///
    /// `issued_at` is the clock reading taken before the grant request went
    /// out, so the computed expiry never runs past the server's.
    pub fn from_grant(
        grant: &TokenGrant,
        issued_at: DateTime<Utc>,
        user: UserProfile,
    ) -> Result<Self, ApiError> {
        let expires_at = issued_at
            .checked_add_signed(grant.lifetime()?)
            .ok_or_else(|| {
                ApiError::InvalidResponse(format!(
                    "Token grant lifetime {} overflows the expiry",
                    grant.expires_in
                ))
            })?;
        Ok(Self {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            expires_at,
            user,
            saved_at: issued_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grant(expires_in: i64) -> TokenGrant {
        TokenGrant {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            expires_in,
            token_type: Some("bearer".into()),
            user: None,
        }
    }

    #[test]
    fn test_expiry_is_issue_time_plus_ttl() {
        let issued = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let record = SessionRecord::from_grant(&grant(3600), issued, UserProfile::default()).unwrap();
        assert_eq!(record.expires_at, issued + Duration::hours(1));
        assert!(!record.is_expired_at(issued + Duration::minutes(59)));
        assert!(record.is_expired_at(issued + Duration::hours(1)));
        assert_eq!(record.minutes_until_expiry(issued + Duration::minutes(45)), 15);
        assert_eq!(record.minutes_until_expiry(issued + Duration::hours(2)), 0);
    }

    #[test]
    fn test_oversized_lifetime_is_an_error() {
        let issued = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        // Representable as a duration but far past the last DateTime.
        let user = UserProfile::default();
        let err = SessionRecord::from_grant(&grant(i64::MAX / 1000), issued, user.clone()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
        assert!(SessionRecord::from_grant(&grant(i64::MAX), issued, user).is_err());
    }

    #[test]
    fn test_timestamps_persist_as_epoch_millis() {
        let issued = Utc.timestamp_millis_opt(1_760_860_800_123).unwrap();
        let record = SessionRecord::from_grant(&grant(60), issued, UserProfile::default()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["saved_at"], 1_760_860_800_123i64);
        assert_eq!(json["expires_at"], 1_760_860_860_123i64);

        let back: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let record = SessionRecord::from_grant(&grant(60), Utc::now(), UserProfile::default()).unwrap();
        let debug = format!("{:?}", record);
        assert!(!debug.contains("access-1"));
        assert!(!debug.contains("refresh-1"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = UserProfile {
            id: "u-1".into(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "u-1");
        user.email = Some("ana@example.com".into());
        assert_eq!(user.display_name(), "ana@example.com");
        user.full_name = Some("  ".into());
        assert_eq!(user.display_name(), "ana@example.com");
        user.full_name = Some("Ana Ruiz".into());
        assert_eq!(user.display_name(), "Ana Ruiz");
    }
}
