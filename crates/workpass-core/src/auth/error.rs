use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a session stopped being usable.
///
/// Every kind is terminal for the monitor: the stored session is cleared
/// and the user has to sign in again.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionErrorKind {
    #[error("No stored session")]
    NoSession,

    #[error("Session expired")]
    Expired,

    #[error("Session was rejected by the auth provider")]
    ValidationFailed,

    #[error("Session could not be refreshed")]
    RefreshFailed,
}
