//! Auth routes: register, login, logout, and the session extractor.

use axum::extract::{FromRef, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;
use tracing::{info, warn};

use super::error::ApiError;
use crate::error::LedgerError;
use crate::models::User;
use crate::services::{account, session};
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";

/// Token from the session cookie, or an `Authorization: Bearer` header for
/// non-browser clients.
pub(crate) fn request_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(COOKIE_NAME).map(Cookie::value).filter(|v| !v.is_empty()) {
        return Some(cookie.to_owned());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.cookie_secure)
        .max_age(Duration::hours(state.config.session_ttl_hours))
        .build()
}

fn cleared_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.cookie_secure)
        .max_age(Duration::ZERO)
        .build()
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated caller. The account is read from the ledger, so bans and
/// role changes apply to live sessions immediately.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl AuthUser {
    #[must_use]
    pub fn id(&self) -> uuid::Uuid {
        self.user.id
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = request_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let app_state = AppState::from_ref(state);
        let user_id = session::validate_session(&app_state.pool, &token)
            .await?
            .ok_or(ApiError::Unauthorized)?;
        let user = account::get_user(&app_state, user_id).await.map_err(|_| ApiError::Unauthorized)?;
        if user.is_banned {
            return Err(LedgerError::AccountBanned.into());
        }
        Ok(Self { user, token })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct RegisterBody {
    email: String,
    #[serde(default)]
    name: String,
    password: String,
    #[serde(default)]
    referral_code: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    email: String,
    password: String,
}

/// `POST /api/auth/register`: create an account and sign it in.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user = account::register(&state, &body.email, &body.name, &body.password, body.referral_code.as_deref()).await?;
    let token = session::create_session(&state.pool, user.id, state.config.session_ttl_hours).await?;
    let jar = jar.add(session_cookie(&state, token));
    Ok((StatusCode::CREATED, jar, Json(user)))
}

/// `POST /api/auth/login`: check credentials and set the session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user = account::authenticate(&state, &body.email, &body.password).await?;
    let token = session::create_session(&state.pool, user.id, state.config.session_ttl_hours).await?;
    info!(user_id = %user.id, "login");
    Ok((jar.add(session_cookie(&state, token)), Json(user)))
}

/// `GET /api/auth/me`: return the current user.
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// `POST /api/auth/logout`: delete the session, clear the cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar, auth: AuthUser) -> impl IntoResponse {
    if let Err(e) = session::delete_session(&state.pool, &auth.token).await {
        warn!(error = %e, user_id = %auth.id(), "session delete failed");
    }
    (jar.add(cleared_cookie(&state)), StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
