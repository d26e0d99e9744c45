//! Workpass core - session management for the Workpass workforce app.
//!
//! This crate owns the signed-in session of a Workpass installation:
//!
//! - [`auth`]: the persisted `SessionRecord`, its stores, and the
//!   validate / refresh / monitor state machine built on top of them
//! - [`api`]: the Supabase backend client and the provider traits the
//!   session core is written against
//! - [`clock`]: wall-clock abstraction so expiry logic can be tested
//! - [`config`]: user configuration and derived session settings

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;

pub use api::{ApiError, AuthProvider, ProfileStore, SupabaseClient};
pub use auth::{
    SessionErrorKind, SessionManager, SessionMonitor, SessionRecord, SessionStatus, UserProfile,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, SessionSettings, StorageBackend};
