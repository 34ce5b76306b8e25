use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use warbler_db::is_unique_violation;
use warbler_db::models::{ProfileUpdate, UserRow};
use warbler_types::api::{
    EditProfilePage, EditProfileRequest, FollowListPage, LikesPage, UserListPage, UserPage,
    UserSearch,
};
use warbler_types::models::FlashCategory;

use crate::auth::{AppState, authenticate};
use crate::error::{AppError, blocking};
use crate::flash;
use crate::middleware::{AuthUser, CurrentUser, do_logout};
use crate::views::{self, MESSAGE_LIMIT, render};

/// All users, or those whose username contains `q`.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
    Query(search): Query<UserSearch>,
) -> Result<Response, AppError> {
    let query = search.q.filter(|q| !q.is_empty());

    let q = query.clone();
    let rows = blocking(&state, move |s| Ok(s.db.list_users(q.as_deref())?)).await?;

    let page = UserListPage {
        query,
        users: rows.iter().map(views::user_summary).collect(),
    };
    Ok(render(jar, &state.secret, current.0.as_ref(), page).into_response())
}

pub async fn show_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let viewer_id = current.0.as_ref().map(|u| u.id);

    let (user, counts, rows, is_following) = blocking(&state, move |s| {
        let user = s.db.get_user_by_id(user_id)?.ok_or(AppError::NotFound)?;
        let counts = s.db.user_counts(user_id)?;
        let rows = s.db.messages_by_user(user_id, MESSAGE_LIMIT)?;
        let is_following = match viewer_id {
            Some(viewer_id) => Some(s.db.is_following(viewer_id, user_id)?),
            None => None,
        };
        Ok((user, counts, rows, is_following))
    })
    .await?;

    let page = UserPage {
        user: views::user_profile(&user, counts),
        messages: views::messages(rows),
        is_following,
    };
    Ok(render(jar, &state.secret, current.0.as_ref(), page).into_response())
}

#[derive(Clone, Copy)]
enum Direction {
    Following,
    Followers,
}

async fn follow_list(
    state: AppState,
    viewer: UserRow,
    jar: CookieJar,
    user_id: i64,
    direction: Direction,
) -> Result<Response, AppError> {
    let (user, counts, rows) = blocking(&state, move |s| {
        let user = s.db.get_user_by_id(user_id)?.ok_or(AppError::NotFound)?;
        let counts = s.db.user_counts(user_id)?;
        let rows = match direction {
            Direction::Following => s.db.following(user_id)?,
            Direction::Followers => s.db.followers(user_id)?,
        };
        Ok((user, counts, rows))
    })
    .await?;

    let page = FollowListPage {
        user: views::user_profile(&user, counts),
        users: rows.iter().map(views::user_summary).collect(),
    };
    Ok(render(jar, &state.secret, Some(&viewer), page).into_response())
}

pub async fn show_following(
    State(state): State<AppState>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    follow_list(state, viewer, jar, user_id, Direction::Following).await
}

pub async fn show_followers(
    State(state): State<AppState>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    follow_list(state, viewer, jar, user_id, Direction::Followers).await
}

pub async fn show_likes(
    State(state): State<AppState>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let (user, counts, rows) = blocking(&state, move |s| {
        let user = s.db.get_user_by_id(user_id)?.ok_or(AppError::NotFound)?;
        let counts = s.db.user_counts(user_id)?;
        let rows = s.db.liked_messages(user_id)?;
        Ok((user, counts, rows))
    })
    .await?;

    let page = LikesPage {
        user: views::user_profile(&user, counts),
        messages: views::messages(rows),
    };
    Ok(render(jar, &state.secret, Some(&viewer), page).into_response())
}

pub async fn add_follow(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
    Path(follow_id): Path<i64>,
) -> Result<Response, AppError> {
    let following_page = format!("/users/{}/following", user.id);

    if follow_id == user.id {
        let jar = flash::push(jar, &state.secret, FlashCategory::Warning, "You can't follow yourself.");
        return Ok((jar, Redirect::to(&following_page)).into_response());
    }

    let user_id = user.id;
    let created = blocking(&state, move |s| Ok(s.db.follow(user_id, follow_id)?))
        .await?
        .ok_or(AppError::NotFound)?;

    if created {
        info!("User {} followed {}", user_id, follow_id);
    }
    Ok((jar, Redirect::to(&following_page)).into_response())
}

pub async fn stop_following(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
    Path(follow_id): Path<i64>,
) -> Result<Response, AppError> {
    let user_id = user.id;
    let removed = blocking(&state, move |s| Ok(s.db.unfollow(user_id, follow_id)?))
        .await?
        .ok_or(AppError::NotFound)?;

    if removed {
        info!("User {} stopped following {}", user_id, follow_id);
    }
    Ok((jar, Redirect::to(&format!("/users/{}/following", user_id))).into_response())
}

fn edit_page(user: &UserRow) -> EditProfilePage {
    EditProfilePage {
        username: user.username.clone(),
        email: user.email.clone(),
        image_url: user.image_url.clone(),
        header_image_url: user.header_image_url.clone(),
        bio: user.bio.clone().unwrap_or_default(),
        location: user.location.clone().unwrap_or_default(),
    }
}

pub async fn profile_form(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
) -> Response {
    let page = edit_page(&user);
    render(jar, &state.secret, Some(&user), page).into_response()
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

/// Edit the current user's profile. The current password must be supplied.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
    Form(req): Form<EditProfileRequest>,
) -> Result<Response, AppError> {
    let page = EditProfilePage {
        username: req.username.clone(),
        email: req.email.clone(),
        image_url: req.image_url.clone(),
        header_image_url: req.header_image_url.clone(),
        bio: req.bio.clone(),
        location: req.location.clone(),
    };

    if req.username.trim().is_empty() || !req.email.contains('@') {
        let jar = flash::push(
            jar,
            &state.secret,
            FlashCategory::Danger,
            "Username and a valid email are required.",
        );
        return Ok(render(jar, &state.secret, Some(&user), page).into_response());
    }

    let user_id = user.id;
    let username = user.username.clone();
    let outcome = blocking(&state, move |s| {
        if authenticate(s, &username, &req.password)?.is_none() {
            return Ok(None);
        }

        let update = ProfileUpdate {
            username: req.username.trim(),
            email: req.email.trim(),
            image_url: non_empty(&req.image_url),
            header_image_url: non_empty(&req.header_image_url),
            bio: non_empty(&req.bio),
            location: non_empty(&req.location),
        };

        match s.db.update_profile(user_id, &update) {
            Ok(_) => Ok(Some(true)),
            Err(e) if is_unique_violation(&e) => Ok(Some(false)),
            Err(e) => Err(AppError::Internal(e)),
        }
    })
    .await?;

    match outcome {
        None => {
            warn!("Wrong password on profile edit for user {}", user_id);
            let jar = flash::push(jar, &state.secret, FlashCategory::Danger, "Wrong Password");
            Ok(render(jar, &state.secret, Some(&user), page).into_response())
        }
        Some(false) => {
            let jar = flash::push(
                jar,
                &state.secret,
                FlashCategory::Danger,
                "Username or email already taken",
            );
            Ok(render(jar, &state.secret, Some(&user), page).into_response())
        }
        Some(true) => {
            info!("User {} updated their profile", user_id);
            let jar = flash::push(jar, &state.secret, FlashCategory::Success, "Update Successful!");
            Ok((jar, Redirect::to(&format!("/users/{}", user_id))).into_response())
        }
    }
}

/// Log out and delete the current account along with everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let jar = do_logout(jar);

    let user_id = user.id;
    blocking(&state, move |s| Ok(s.db.delete_user(user_id)?)).await?;
    info!("User {} deleted their account", user_id);

    Ok((jar, Redirect::to("/signup")).into_response())
}
