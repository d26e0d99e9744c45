//! Seams between the session core and the hosted backend.
//!
//! The session core only ever talks to these traits; [`SupabaseClient`]
//! is the production implementation and tests substitute fakes.
//!
//! [`SupabaseClient`]: super::SupabaseClient

use futures::future::BoxFuture;

use super::types::{AuthUser, SignUpResponse, TokenGrant};
use super::ApiError;
use crate::auth::UserProfile;

pub trait AuthProvider: Send + Sync {
    /// Present an access token and get back the user it belongs to.
    fn get_user<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<AuthUser, ApiError>>;

    /// Exchange a refresh token for a new token pair.
    fn refresh_session<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ApiError>>;

    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ApiError>>;

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        full_name: &'a str,
    ) -> BoxFuture<'a, Result<SignUpResponse, ApiError>>;

    /// Revoke the refresh token server-side.
    fn sign_out<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;
}

pub trait ProfileStore: Send + Sync {
    /// Look up the profile row for a user. `Ok(None)` when no row exists.
    fn get_profile<'a>(
        &'a self,
        access_token: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserProfile>, ApiError>>;
}
