//! Authentication module for managing the signed-in session.
//!
//! This module provides:
//! - `SessionRecord`: the persisted token pair, expiry and cached profile
//! - `SessionStore` and its file, sealed file, keychain and memory backends
//! - `SessionValidator`, `SessionRefresher` and `SessionMonitor`: the
//!   validate / refresh state machine
//! - `SessionManager`: the object the application talks to
//!
//! Access tokens are refreshed once less than 10 minutes of lifetime remain;
//! the monitor checks every 5 minutes.

pub mod error;
pub mod manager;
pub mod monitor;
pub mod policy;
pub mod record;
pub mod refresher;
pub mod sealed;
pub mod store;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SessionErrorKind;
pub use manager::{SessionManager, StartupOutcome};
pub use monitor::{MonitorState, SessionMonitor, SessionStatus, TickOutcome};
pub use policy::RequestPolicy;
pub use record::{SessionRecord, UserProfile};
pub use refresher::{RefreshOutcome, SessionRefresher};
pub use sealed::SealedFileStore;
pub use store::{FileStore, KeyringStore, MemoryStore, SessionStore, SessionVault};
pub use validator::{SessionValidator, Validation};
