use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use warbler_db::models::MessageDelete;
use warbler_types::api::{HomePage, LandingPage, MessagePage, MessageRequest, NewMessagePage};
use warbler_types::models::FlashCategory;

use crate::auth::AppState;
use crate::error::{AppError, blocking};
use crate::flash;
use crate::middleware::{AuthUser, CurrentUser};
use crate::views::{self, MESSAGE_LIMIT, render};

pub const MAX_MESSAGE_LEN: usize = 140;

/// Anonymous visitors get the landing page; logged-in users get the 100 most
/// recent messages from themselves and everyone they follow.
pub async fn homepage(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let Some(user) = current.0 else {
        return Ok(render(jar, &state.secret, None, LandingPage { anonymous: true }).into_response());
    };

    let user_id = user.id;
    let (counts, rows, likes) = blocking(&state, move |s| {
        let counts = s.db.user_counts(user_id)?;
        let rows = s.db.feed_for(user_id, MESSAGE_LIMIT)?;
        let likes = s.db.liked_message_ids(user_id)?;
        Ok((counts, rows, likes))
    })
    .await?;

    let page = HomePage {
        user: views::user_profile(&user, counts),
        messages: views::messages(rows),
        likes,
    };
    Ok(render(jar, &state.secret, Some(&user), page).into_response())
}

pub async fn new_message_form(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
) -> Response {
    render(jar, &state.secret, Some(&user), NewMessagePage::default()).into_response()
}

pub async fn create_message(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
    Form(req): Form<MessageRequest>,
) -> Result<Response, AppError> {
    let len = req.text.trim().chars().count();
    if len == 0 || req.text.chars().count() > MAX_MESSAGE_LEN {
        let jar = flash::push(
            jar,
            &state.secret,
            FlashCategory::Danger,
            format!("Messages must be between 1 and {} characters.", MAX_MESSAGE_LEN),
        );
        return Ok(render(jar, &state.secret, Some(&user), NewMessagePage { text: req.text }).into_response());
    }

    let user_id = user.id;
    let message_id = blocking(&state, move |s| Ok(s.db.insert_message(user_id, &req.text)?)).await?;
    info!("User {} posted message {}", user_id, message_id);

    Ok((jar, Redirect::to(&format!("/users/{}", user_id))).into_response())
}

pub async fn show_message(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
    Path(message_id): Path<i64>,
) -> Result<Response, AppError> {
    let row = blocking(&state, move |s| Ok(s.db.get_message(message_id)?))
        .await?
        .ok_or(AppError::NotFound)?;

    let page = MessagePage {
        message: views::message(row),
    };
    Ok(render(jar, &state.secret, current.0.as_ref(), page).into_response())
}

/// Only the author may delete a message; anyone else is bounced home with a
/// warning.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
    Path(message_id): Path<i64>,
) -> Result<Response, AppError> {
    let user_id = user.id;
    match blocking(&state, move |s| Ok(s.db.delete_message(user_id, message_id)?)).await? {
        MessageDelete::Missing => Err(AppError::NotFound),
        MessageDelete::NotOwner { owner_id } => {
            warn!("User {} tried to delete message {} owned by {}", user_id, message_id, owner_id);
            let jar = flash::push(jar, &state.secret, FlashCategory::Danger, "Access unauthorized.");
            Ok((jar, Redirect::to("/")).into_response())
        }
        MessageDelete::Deleted => {
            info!("User {} deleted message {}", user_id, message_id);
            Ok((jar, Redirect::to(&format!("/users/{}", user_id))).into_response())
        }
    }
}
