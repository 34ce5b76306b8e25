use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use warbler_db::models::UserRow;
use warbler_types::models::FlashCategory;

use crate::auth::AppState;
use crate::error::{AppError, blocking};
use crate::flash;

pub const SESSION_COOKIE: &str = "session";

/// Lifetime of both the session token and its cookie.
const SESSION_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user ID
    pub exp: usize,
}

/// The logged-in user for this request, if any.
#[derive(Clone)]
pub struct CurrentUser(pub Option<UserRow>);

/// Present on login-required routes only.
#[derive(Clone)]
pub struct AuthUser(pub UserRow);

/// Start a session for `user`.
pub fn do_login(jar: CookieJar, secret: &str, user: &UserRow) -> anyhow::Result<CookieJar> {
    let claims = Claims {
        sub: user.id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(jar.add(
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(SESSION_DAYS)),
    ))
}

pub fn do_logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

fn session_user_id(jar: &CookieJar, secret: &str) -> Option<i64> {
    let token = jar.get(SESSION_COOKIE)?;

    let token_data = decode::<Claims>(
        token.value(),
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| debug!("Rejected session token: {}", e))
    .ok()?;

    token_data.claims.sub.parse().ok()
}

/// Resolve the session cookie to a user and attach [`CurrentUser`].
pub async fn load_current_user(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match session_user_id(&jar, &state.secret) {
        Some(user_id) => blocking(&state, move |s| Ok(s.db.get_user_by_id(user_id)?)).await?,
        None => None,
    };

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Send anonymous visitors to the login page, remembering where they were headed.
pub async fn require_login(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .and_then(|current| current.0.clone());

    match user {
        Some(user) => {
            req.extensions_mut().insert(AuthUser(user));
            next.run(req).await
        }
        None => {
            let wanted = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
            warn!("Unauthenticated {} {}", req.method(), wanted);
            let jar = flash::push(jar, &state.secret, FlashCategory::Danger, "Access unauthorized.");
            let target = format!("/login?next={}", encode_query_value(wanted));
            (jar, Redirect::to(&target)).into_response()
        }
    }
}

/// Only local paths are followed after login.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next(Some("/users/3/likes")), Some("/users/3/likes"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn query_value_encoding_keeps_paths_readable() {
        assert_eq!(encode_query_value("/users/3/likes"), "/users/3/likes");
        assert_eq!(encode_query_value("/a b&c"), "/a%20b%26c");
        assert_eq!(encode_query_value("/users/3/likes?page=2"), "/users/3/likes%3Fpage%3D2");
    }
}
