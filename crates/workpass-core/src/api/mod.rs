//! Backend client module for the hosted Supabase project.
//!
//! This module provides the `SupabaseClient` for the GoTrue auth endpoints
//! (sign-in, sign-up, refresh, user lookup, logout) and the PostgREST
//! `profiles` table, plus the `AuthProvider` and `ProfileStore` traits the
//! session core depends on.

pub mod client;
pub mod error;
pub mod provider;
pub mod types;

pub use client::SupabaseClient;
pub use error::ApiError;
pub use provider::{AuthProvider, ProfileStore};
pub use types::{AuthUser, SignUpResponse, TokenGrant};
