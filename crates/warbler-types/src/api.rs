use serde::{Deserialize, Serialize};

use crate::models::{Flash, Message, UserProfile, UserSummary};

// -- Page documents --

/// Envelope for every page: who is looking, pending flashes, and the page body.
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub current_user: Option<UserSummary>,
    pub flashes: Vec<Flash>,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LandingPage {
    pub anonymous: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HomePage {
    pub user: UserProfile,
    pub messages: Vec<Message>,
    /// Ids of messages the viewer has liked.
    pub likes: Vec<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SignupPage {
    pub username: String,
    pub email: String,
    pub image_url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoginPage {
    pub username: String,
    pub next: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListPage {
    pub query: Option<String>,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserPage {
    pub user: UserProfile,
    pub messages: Vec<Message>,
    /// Whether the viewer follows this user; absent for anonymous viewers.
    pub is_following: Option<bool>,
}

/// Following or followers listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct FollowListPage {
    pub user: UserProfile,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikesPage {
    pub user: UserProfile,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EditProfilePage {
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: String,
    pub location: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NewMessagePage {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagePage {
    pub message: Message,
}

// -- Form submissions --

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct EditProfileRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub header_image_url: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
}

// -- JSON payloads --

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub message: String,
}
