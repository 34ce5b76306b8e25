//! One-shot flashed messages carried between requests in a signed cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use warbler_types::models::{Flash, FlashCategory};

pub const FLASH_COOKIE: &str = "flash";

/// Pending flashes expire if the client never loads another page.
const FLASH_TTL_MINUTES: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct FlashClaims {
    flashes: Vec<Flash>,
    exp: usize,
}

/// Queue a flash for the next page the client loads.
pub fn push(jar: CookieJar, secret: &str, category: FlashCategory, message: impl Into<String>) -> CookieJar {
    let mut flashes = read(&jar, secret);
    flashes.push(Flash {
        category,
        message: message.into(),
    });

    let claims = FlashClaims {
        flashes,
        exp: (chrono::Utc::now() + chrono::Duration::minutes(FLASH_TTL_MINUTES)).timestamp() as usize,
    };

    let value = match encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())) {
        Ok(token) => token,
        Err(e) => {
            warn!("Dropping flash, encode failed: {}", e);
            return jar;
        }
    };

    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Drain all pending flashes.
pub fn take(jar: CookieJar, secret: &str) -> (CookieJar, Vec<Flash>) {
    let flashes = read(&jar, secret);
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, flashes);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), flashes)
}

/// Flashes whose signature doesn't verify are dropped.
fn read(jar: &CookieJar, secret: &str) -> Vec<Flash> {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return Vec::new();
    };

    match decode::<FlashClaims>(
        cookie.value(),
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data.claims.flashes,
        Err(e) => {
            warn!("Ignoring flash cookie: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(flashes: &[Flash]) -> Vec<&str> {
        flashes.iter().map(|f| f.message.as_str()).collect()
    }

    #[test]
    fn pushed_flashes_come_back_in_order() {
        let jar = push(CookieJar::new(), "secret", FlashCategory::Success, "first");
        let jar = push(jar, "secret", FlashCategory::Danger, "second");

        let (jar, flashes) = take(jar, "secret");
        assert_eq!(messages(&flashes), vec!["first", "second"]);
        assert_eq!(flashes[1].category, FlashCategory::Danger);

        let (_, again) = take(jar, "secret");
        assert!(again.is_empty());
    }

    #[test]
    fn flashes_signed_with_another_key_are_dropped() {
        let jar = push(CookieJar::new(), "other-secret", FlashCategory::Success, "forged");
        let (_, flashes) = take(jar, "secret");
        assert!(flashes.is_empty());
    }

    #[test]
    fn unsigned_flash_cookie_is_dropped() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "W3sibWVzc2FnZSI6ImhpIn1d"));
        let (_, flashes) = take(jar, "secret");
        assert!(flashes.is_empty());
    }
}
