use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use warbler_db::models::LikeOutcome;
use warbler_types::api::LikeResponse;

use crate::auth::AppState;
use crate::error::{AppError, blocking};
use crate::middleware::AuthUser;

/// Like the message if the current user hasn't yet, unlike it otherwise.
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(message_id): Path<i64>,
) -> Result<Response, AppError> {
    let user_id = user.id;
    let outcome = blocking(&state, move |s| Ok(s.db.toggle_like(user_id, message_id)?)).await?;

    let verb = match outcome {
        LikeOutcome::Liked => "liked",
        LikeOutcome::Unliked => "unliked",
        LikeOutcome::MissingMessage => return Err(AppError::NotFound),
        LikeOutcome::OwnMessage => {
            warn!("User {} tried to like their own message {}", user_id, message_id);
            let body = LikeResponse {
                message: "You cannot like your own message".to_string(),
            };
            return Ok((StatusCode::FORBIDDEN, Json(body)).into_response());
        }
    };
    info!("User {} {} message {}", user_id, verb, message_id);

    Ok(Json(LikeResponse {
        message: format!("Message number {} {}", message_id, verb),
    })
    .into_response())
}
