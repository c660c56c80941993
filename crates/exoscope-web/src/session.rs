//! Browser session and admin access.
//!
//! The analysis session key lives in a signed cookie. Admin access is
//! granted by a bearer token, a `?token=` query parameter or the signed
//! cookie set by `/admin/login`.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use exoscope_common::AppError;
use exoscope_db::AnalysisSession;

use crate::error::PageError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "exoscope_session";
pub const ADMIN_COOKIE: &str = "exoscope_admin";
const ADMIN_GRANTED: &str = "granted";

fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Resume the caller's analysis session or start a new one. The returned
/// jar must be part of the response so a new key reaches the browser.
pub async fn current(
    state: &AppState,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, AnalysisSession), AppError> {
    let presented = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let session = state
        .sessions
        .resume_or_start(presented.as_deref(), state.session_ttl())
        .await?;

    let jar = if presented.as_deref() == Some(session.session_key.as_str()) {
        jar
    } else {
        jar.add(cookie(SESSION_COOKIE, session.session_key.clone()))
    };
    Ok((jar, session))
}

/// Session of the caller without starting one.
pub async fn existing(state: &AppState, jar: &SignedCookieJar) -> Result<Option<AnalysisSession>, AppError> {
    match jar.get(SESSION_COOKIE) {
        Some(c) => Ok(state.sessions.find_active(c.value()).await?),
        None => Ok(None),
    }
}

pub fn grant_admin(jar: SignedCookieJar) -> SignedCookieJar {
    jar.add(cookie(ADMIN_COOKIE, ADMIN_GRANTED.to_string()))
}

pub fn revoke_admin(jar: SignedCookieJar) -> SignedCookieJar {
    jar.remove(Cookie::build(ADMIN_COOKIE).path("/"))
}

/// Extractor that rejects requests without admin access. Always passes
/// when no admin token is configured.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let security = &state.config.security;
        if security.admin_token.is_none() {
            return Ok(AdminAccess);
        }

        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if bearer.is_some() && security.admin_token_matches(bearer) {
            return Ok(AdminAccess);
        }

        let query_token = parts.uri.query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "token")
                .map(|(_, v)| v.into_owned())
        });
        if query_token.is_some() && security.admin_token_matches(query_token.as_deref()) {
            return Ok(AdminAccess);
        }

        let jar = SignedCookieJar::from_headers(&parts.headers, state.key().clone());
        if jar.get(ADMIN_COOKIE).is_some_and(|c| c.value() == ADMIN_GRANTED) {
            return Ok(AdminAccess);
        }

        Err(PageError(AppError::Forbidden))
    }
}
