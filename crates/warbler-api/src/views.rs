//! Row-to-document conversion and the page envelope.

use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use warbler_db::models::{MessageRow, UserCounts as CountsRow, UserRow};
use warbler_types::api::Page;
use warbler_types::models::{Message, UserCounts, UserProfile, UserSummary};

use crate::flash;

/// Most messages shown on any single page.
pub const MESSAGE_LIMIT: u32 = 100;

/// Wrap `body` in the page envelope, draining pending flashes.
pub fn render<T: Serialize>(
    jar: CookieJar,
    secret: &str,
    current_user: Option<&UserRow>,
    body: T,
) -> (CookieJar, Json<Page<T>>) {
    let (jar, flashes) = flash::take(jar, secret);
    let page = Page {
        current_user: current_user.map(user_summary),
        flashes,
        body,
    };
    (jar, Json(page))
}

pub fn user_summary(row: &UserRow) -> UserSummary {
    UserSummary {
        id: row.id,
        username: row.username.clone(),
        image_url: row.image_url.clone(),
    }
}

pub fn user_profile(row: &UserRow, counts: CountsRow) -> UserProfile {
    UserProfile {
        id: row.id,
        username: row.username.clone(),
        image_url: row.image_url.clone(),
        header_image_url: row.header_image_url.clone(),
        bio: row.bio.clone(),
        location: row.location.clone(),
        counts: UserCounts {
            messages: counts.messages,
            following: counts.following,
            followers: counts.followers,
            likes: counts.likes,
        },
    }
}

pub fn message(row: MessageRow) -> Message {
    let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message {}: {}", row.timestamp, row.id, e);
            DateTime::default()
        });

    Message {
        id: row.id,
        text: row.text,
        timestamp,
        user: UserSummary {
            id: row.user_id,
            username: row.author_username,
            image_url: row.author_image_url,
        },
    }
}

pub fn messages(rows: Vec<MessageRow>) -> Vec<Message> {
    rows.into_iter().map(message).collect()
}
