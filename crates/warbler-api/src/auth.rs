use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Extension, Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use rand_core::OsRng;
use serde::Deserialize;
use tracing::info;

use warbler_db::models::{NewUser, UserRow};
use warbler_db::{Database, is_unique_violation};
use warbler_types::api::{LoginPage, LoginRequest, SignupPage, SignupRequest};
use warbler_types::models::FlashCategory;

use crate::error::{AppError, blocking};
use crate::flash;
use crate::middleware::{CurrentUser, do_login, do_logout, safe_next};
use crate::views::render;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Signs session cookies.
    pub secret: String,
    pub hasher: Argon2<'static>,
}

impl AppStateInner {
    pub fn new(db: Database, secret: String) -> Self {
        Self::with_hasher(db, secret, Argon2::default())
    }

    pub fn with_hasher(db: Database, secret: String, hasher: Argon2<'static>) -> Self {
        Self { db, secret, hasher }
    }
}

pub const MIN_PASSWORD_LEN: usize = 6;

// -- Model operations --

/// Hash the password and insert a new user. A taken username or email is
/// reported as [`AppError::Conflict`] and leaves no row behind.
pub fn signup(
    state: &AppStateInner,
    username: &str,
    password: &str,
    email: &str,
    image_url: Option<&str>,
) -> Result<UserRow, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = state
        .hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = state
        .db
        .create_user(&NewUser {
            username,
            email,
            password_hash: &password_hash,
            image_url,
        })
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict
            } else {
                AppError::Internal(e)
            }
        })?;

    state
        .db
        .get_user_by_id(user_id)?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("user {} vanished after insert", user_id)))
}

/// Returns the user when `password` matches, `None` on unknown username or
/// wrong password.
pub fn authenticate(
    state: &AppStateInner,
    username: &str,
    password: &str,
) -> Result<Option<UserRow>, AppError> {
    let Some(user) = state.db.get_user_by_username(username)? else {
        return Ok(None);
    };

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash for user {} is unreadable: {}", user.id, e))?;

    match state.hasher.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(Some(user)),
        Err(_) => Ok(None),
    }
}

fn validate_signup(req: &SignupRequest) -> Option<&'static str> {
    if req.username.trim().is_empty() {
        return Some("Username is required.");
    }
    if !req.email.contains('@') {
        return Some("A valid email is required.");
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Some("Password must be at least 6 characters.");
    }
    None
}

// -- Handlers --

pub async fn show_signup(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Response {
    render(jar, &state.secret, current.0.as_ref(), SignupPage::default()).into_response()
}

pub async fn handle_signup(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
    Form(req): Form<SignupRequest>,
) -> Result<Response, AppError> {
    let page = SignupPage {
        username: req.username.clone(),
        email: req.email.clone(),
        image_url: req.image_url.clone(),
    };

    if let Some(problem) = validate_signup(&req) {
        let jar = flash::push(jar, &state.secret, FlashCategory::Danger, problem);
        return Ok(render(jar, &state.secret, current.0.as_ref(), page).into_response());
    }

    let result = blocking(&state, move |s| {
        let image_url = Some(req.image_url.trim()).filter(|url| !url.is_empty());
        signup(s, req.username.trim(), &req.password, req.email.trim(), image_url)
    })
    .await;

    let user = match result {
        Ok(user) => user,
        Err(AppError::Conflict) => {
            let jar = flash::push(jar, &state.secret, FlashCategory::Danger, "Username already taken");
            return Ok(render(jar, &state.secret, current.0.as_ref(), page).into_response());
        }
        Err(e) => return Err(e),
    };

    info!("New user {} signed up as '{}'", user.id, user.username);
    let jar = do_login(jar, &state.secret, &user)?;
    Ok((jar, Redirect::to("/")).into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

pub async fn show_login(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    let page = LoginPage {
        username: String::new(),
        next: safe_next(query.next.as_deref()).map(str::to_string),
    };
    render(jar, &state.secret, current.0.as_ref(), page).into_response()
}

pub async fn handle_login(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
    Form(req): Form<LoginRequest>,
) -> Result<Response, AppError> {
    let next = safe_next(req.next.as_deref()).map(str::to_string);

    let user = if req.username.is_empty() || req.password.is_empty() {
        None
    } else {
        let (username, password) = (req.username.clone(), req.password);
        blocking(&state, move |s| authenticate(s, &username, &password)).await?
    };

    match user {
        Some(user) => {
            info!("User {} logged in", user.id);
            let jar = do_login(jar, &state.secret, &user)?;
            let greeting = format!("Hello, {}!", user.username);
            let jar = flash::push(jar, &state.secret, FlashCategory::Success, greeting);
            let target = next.unwrap_or_else(|| "/".to_string());
            Ok((jar, Redirect::to(&target)).into_response())
        }
        None => {
            let jar = flash::push(jar, &state.secret, FlashCategory::Danger, "Invalid credentials.");
            let page = LoginPage {
                username: req.username,
                next,
            };
            Ok(render(jar, &state.secret, current.0.as_ref(), page).into_response())
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Response {
    if let Some(user) = &current.0 {
        info!("User {} logged out", user.id);
    }

    let jar = do_logout(jar);
    let jar = flash::push(jar, &state.secret, FlashCategory::Success, "Logout successful!");
    (jar, Redirect::to("/login")).into_response()
}
