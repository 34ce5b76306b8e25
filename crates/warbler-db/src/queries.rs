use crate::Database;
use crate::models::{LikeOutcome, MessageDelete, MessageRow, NewUser, ProfileUpdate, UserCounts, UserRow};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

const USER_COLUMNS: &str =
    "u.id, u.email, u.username, u.image_url, u.header_image_url, u.bio, u.location, u.password";

const MESSAGE_COLUMNS: &str = "m.id, m.text, m.timestamp, m.user_id, u.username, u.image_url";

impl Database {
    // -- Users --

    /// Insert a user and return its id. A taken username or email fails with a
    /// constraint violation (see [`crate::is_unique_violation`]).
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            match user.image_url {
                Some(image_url) => conn.execute(
                    "INSERT INTO users (username, email, password, image_url) VALUES (?1, ?2, ?3, ?4)",
                    params![user.username, user.email, user.password_hash, image_url],
                )?,
                None => conn.execute(
                    "INSERT INTO users (username, email, password) VALUES (?1, ?2, ?3)",
                    params![user.username, user.email, user.password_hash],
                )?,
            };
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id = ?1", params![id]))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.username = ?1", params![username]))
    }

    /// All users, or those whose username contains `search`.
    pub fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| match search {
            Some(q) => query_users(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE instr(u.username, ?1) > 0 ORDER BY u.id"),
                params![q],
            ),
            None => query_users(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.id"),
                params![],
            ),
        })
    }

    /// Returns false when no such user exists.
    pub fn update_profile(&self, id: i64, update: &ProfileUpdate<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    username = ?2,
                    email = ?3,
                    image_url = COALESCE(?4, image_url),
                    header_image_url = COALESCE(?5, header_image_url),
                    bio = ?6,
                    location = ?7
                 WHERE id = ?1",
                params![
                    id,
                    update.username,
                    update.email,
                    update.image_url,
                    update.header_image_url,
                    update.bio,
                    update.location
                ],
            )?;
            Ok(changed == 1)
        })
    }

    /// Delete a user; messages, likes and follow edges go with it.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? == 1))
    }

    pub fn user_counts(&self, id: i64) -> Result<UserCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_following_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_being_followed_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [id],
                |row| {
                    Ok(UserCounts {
                        messages: row.get(0)?,
                        following: row.get(1)?,
                        followers: row.get(2)?,
                        likes: row.get(3)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, user_id: i64, text: &str) -> Result<i64> {
        self.insert_message_at(user_id, text, Utc::now())
    }

    pub fn insert_message_at(&self, user_id: i64, text: &str, timestamp: DateTime<Utc>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (text, timestamp, user_id) VALUES (?1, ?2, ?3)",
                params![text, format_timestamp(timestamp), user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m JOIN users u ON u.id = m.user_id WHERE m.id = ?1"
            );
            let row = conn.query_row(&sql, [id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Newest-first messages written by one user.
    pub fn messages_by_user(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS}
                     FROM messages m
                     JOIN users u ON u.id = m.user_id
                     WHERE m.user_id = ?1
                     ORDER BY m.timestamp DESC, m.id DESC
                     LIMIT ?2"
                ),
                params![user_id, limit],
            )
        })
    }

    /// Home feed: messages by `user_id` and everyone they follow, newest first.
    pub fn feed_for(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS}
                     FROM messages m
                     JOIN users u ON u.id = m.user_id
                     WHERE m.user_id = ?1
                        OR m.user_id IN (
                            SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1
                        )
                     ORDER BY m.timestamp DESC, m.id DESC
                     LIMIT ?2"
                ),
                params![user_id, limit],
            )
        })
    }

    /// Delete `message_id` if `user_id` wrote it. The ownership check and the
    /// delete share one transaction.
    pub fn delete_message(&self, user_id: i64, message_id: i64) -> Result<MessageDelete> {
        self.with_conn_mut(|conn| {
            match message_owner(conn, message_id)? {
                None => Ok(MessageDelete::Missing),
                Some(owner_id) if owner_id != user_id => Ok(MessageDelete::NotOwner { owner_id }),
                Some(_) => {
                    conn.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
                    Ok(MessageDelete::Deleted)
                }
            }
        })
    }

    // -- Follows --

    /// `Some(true)` if a new edge was created; following twice is a no-op.
    /// `None` when `followed_id` doesn't exist.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            if !user_exists(conn, followed_id)? {
                return Ok(None);
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (user_being_followed_id, user_following_id) VALUES (?1, ?2)",
                params![followed_id, follower_id],
            )?;
            Ok(Some(inserted == 1))
        })
    }

    /// `Some(true)` if an edge was removed, `None` when `followed_id` doesn't exist.
    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            if !user_exists(conn, followed_id)? {
                return Ok(None);
            }
            let removed = conn.execute(
                "DELETE FROM follows WHERE user_being_followed_id = ?1 AND user_following_id = ?2",
                params![followed_id, follower_id],
            )?;
            Ok(Some(removed == 1))
        })
    }

    /// Does `user_id` follow `other_id`?
    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, user_id, other_id))
    }

    /// Is `user_id` followed by `other_id`?
    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, other_id, user_id))
    }

    /// Users that `user_id` follows.
    pub fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS}
                     FROM follows f
                     JOIN users u ON u.id = f.user_being_followed_id
                     WHERE f.user_following_id = ?1
                     ORDER BY u.username"
                ),
                params![user_id],
            )
        })
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS}
                     FROM follows f
                     JOIN users u ON u.id = f.user_following_id
                     WHERE f.user_being_followed_id = ?1
                     ORDER BY u.username"
                ),
                params![user_id],
            )
        })
    }

    // -- Likes --

    /// Toggle a like: removes it if the pair exists, inserts it if not.
    /// Missing and self-authored messages are reported without writing.
    pub fn toggle_like(&self, user_id: i64, message_id: i64) -> Result<LikeOutcome> {
        self.with_conn_mut(|conn| {
            match message_owner(conn, message_id)? {
                None => return Ok(LikeOutcome::MissingMessage),
                Some(owner_id) if owner_id == user_id => return Ok(LikeOutcome::OwnMessage),
                Some(_) => {}
            }

            let removed = conn.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
                params![user_id, message_id],
            )?;

            if removed > 0 {
                return Ok(LikeOutcome::Unliked);
            }

            conn.execute(
                "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
                params![user_id, message_id],
            )?;
            Ok(LikeOutcome::Liked)
        })
    }

    pub fn liked_message_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT message_id FROM likes WHERE user_id = ?1 ORDER BY message_id")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    /// Messages liked by `user_id`, most recently liked first.
    pub fn liked_messages(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS}
                     FROM likes l
                     JOIN messages m ON m.id = l.message_id
                     JOIN users u ON u.id = m.user_id
                     WHERE l.user_id = ?1
                     ORDER BY l.id DESC"
                ),
                params![user_id],
            )
        })
    }
}

/// Timestamps are stored as fixed-width RFC 3339 strings so that text order
/// matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        image_url: row.get(3)?,
        header_image_url: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        password: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        timestamp: row.get(2)?,
        user_id: row.get(3)?,
        author_username: row.get(4)?,
        author_image_url: row.get(5)?,
    })
}

fn query_user(conn: &Connection, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE {filter}");
    let row = conn.query_row(&sql, args, user_from_row).optional()?;
    Ok(row)
}

fn query_users(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_messages(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn user_exists(conn: &Connection, id: i64) -> Result<bool> {
    let exists = conn.query_row("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", [id], |row| row.get(0))?;
    Ok(exists)
}

fn message_owner(conn: &Connection, message_id: i64) -> Result<Option<i64>> {
    let owner = conn
        .query_row("SELECT user_id FROM messages WHERE id = ?1", [message_id], |row| row.get(0))
        .optional()?;
    Ok(owner)
}

fn follow_exists(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM follows WHERE user_following_id = ?1 AND user_being_followed_id = ?2
         )",
        params![follower_id, followed_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_unique_violation;
    use crate::migrations::DEFAULT_IMAGE_URL;
    use chrono::Duration;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, username: &str) -> i64 {
        let email = format!("{username}@test.com");
        db.create_user(&NewUser {
            username,
            email: &email,
            password_hash: "HASHED_PASSWORD",
            image_url: None,
        })
        .unwrap()
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn new_user_has_defaults_and_no_edges() {
        let db = db();
        let id = add_user(&db, "testuser");

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(user.username, "testuser");
        assert_eq!(user.image_url, DEFAULT_IMAGE_URL);
        assert!(user.bio.is_none());
        assert_eq!(db.user_counts(id).unwrap(), UserCounts::default());
    }

    #[test]
    fn duplicate_username_is_rejected_without_new_row() {
        let db = db();
        add_user(&db, "JohnnyTest");

        let err = db
            .create_user(&NewUser {
                username: "JohnnyTest",
                email: "other@test.com",
                password_hash: "HASHED_PASSWORD",
                image_url: None,
            })
            .unwrap_err();

        assert!(is_unique_violation(&err));
        assert_eq!(count(&db, "users"), 1);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = db();
        add_user(&db, "first");

        let err = db
            .create_user(&NewUser {
                username: "second",
                email: "first@test.com",
                password_hash: "HASHED_PASSWORD",
                image_url: None,
            })
            .unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[test]
    fn list_users_filters_by_substring() {
        let db = db();
        add_user(&db, "testuser");
        add_user(&db, "MrTurtle");
        add_user(&db, "MrsTurtle");

        assert_eq!(db.list_users(None).unwrap().len(), 3);

        let names: Vec<String> = db
            .list_users(Some("MrTurtle"))
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["MrTurtle"]);
    }

    #[test]
    fn follow_predicates() {
        let db = db();
        let a = add_user(&db, "testuser1");
        let b = add_user(&db, "testuser2");

        assert!(!db.is_following(a, b).unwrap());
        assert!(!db.is_followed_by(b, a).unwrap());

        assert_eq!(db.follow(a, b).unwrap(), Some(true));
        assert!(db.is_following(a, b).unwrap());
        assert!(db.is_followed_by(b, a).unwrap());
        assert!(!db.is_following(b, a).unwrap());

        assert_eq!(db.following(a).unwrap()[0].id, b);
        assert_eq!(db.followers(b).unwrap()[0].id, a);
    }

    #[test]
    fn follow_twice_keeps_one_edge() {
        let db = db();
        let a = add_user(&db, "a");
        let b = add_user(&db, "b");

        assert_eq!(db.follow(a, b).unwrap(), Some(true));
        assert_eq!(db.follow(a, b).unwrap(), Some(false));
        assert_eq!(count(&db, "follows"), 1);

        assert_eq!(db.unfollow(a, b).unwrap(), Some(true));
        assert_eq!(db.unfollow(a, b).unwrap(), Some(false));
        assert_eq!(count(&db, "follows"), 0);
    }

    #[test]
    fn follow_of_missing_user_writes_nothing() {
        let db = db();
        let a = add_user(&db, "a");

        assert_eq!(db.follow(a, 999).unwrap(), None);
        assert_eq!(db.unfollow(a, 999).unwrap(), None);
        assert_eq!(count(&db, "follows"), 0);
    }

    #[test]
    fn like_toggles_per_user() {
        let db = db();
        let author = add_user(&db, "author");
        let fan = add_user(&db, "fan");
        let other = add_user(&db, "other");
        let msg = db.insert_message(author, "hello").unwrap();

        assert_eq!(db.toggle_like(fan, msg).unwrap(), LikeOutcome::Liked);
        assert_eq!(db.toggle_like(other, msg).unwrap(), LikeOutcome::Liked);
        assert_eq!(db.liked_message_ids(fan).unwrap(), vec![msg]);

        assert_eq!(db.toggle_like(fan, msg).unwrap(), LikeOutcome::Unliked);
        assert!(db.liked_message_ids(fan).unwrap().is_empty());
        assert_eq!(db.liked_message_ids(other).unwrap(), vec![msg]);
    }

    #[test]
    fn like_of_missing_or_own_message_writes_nothing() {
        let db = db();
        let fan = add_user(&db, "fan");
        let own = db.insert_message(fan, "mine").unwrap();

        assert_eq!(db.toggle_like(fan, 999).unwrap(), LikeOutcome::MissingMessage);
        assert_eq!(db.toggle_like(fan, own).unwrap(), LikeOutcome::OwnMessage);
        assert_eq!(count(&db, "likes"), 0);
    }

    #[test]
    fn only_the_author_deletes_a_message() {
        let db = db();
        let author = add_user(&db, "author");
        let other = add_user(&db, "other");
        let msg = db.insert_message(author, "hello").unwrap();

        assert_eq!(
            db.delete_message(other, msg).unwrap(),
            MessageDelete::NotOwner { owner_id: author }
        );
        assert!(db.get_message(msg).unwrap().is_some());

        assert_eq!(db.delete_message(author, msg).unwrap(), MessageDelete::Deleted);
        assert_eq!(db.delete_message(author, msg).unwrap(), MessageDelete::Missing);
        assert_eq!(count(&db, "messages"), 0);
    }

    #[test]
    fn only_unique_constraints_count_as_unique_violations() {
        let db = db();
        let id = add_user(&db, "author");

        let too_long = db.insert_message(id, &"x".repeat(141)).unwrap_err();
        assert!(!is_unique_violation(&too_long));

        let orphan = db.insert_message(999, "nobody wrote this").unwrap_err();
        assert!(!is_unique_violation(&orphan));
        assert_eq!(count(&db, "messages"), 0);
    }

    #[test]
    fn feed_has_self_and_followed_newest_first() {
        let db = db();
        let me = add_user(&db, "me");
        let friend = add_user(&db, "friend");
        let stranger = add_user(&db, "stranger");
        db.follow(me, friend).unwrap();

        let t0 = Utc::now() - Duration::hours(1);
        let mine = db.insert_message_at(me, "mine", t0).unwrap();
        let theirs = db.insert_message_at(friend, "theirs", t0 + Duration::minutes(1)).unwrap();
        db.insert_message_at(stranger, "nope", t0 + Duration::minutes(2)).unwrap();

        let ids: Vec<i64> = db.feed_for(me, 100).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![theirs, mine]);
    }

    #[test]
    fn feed_is_capped() {
        let db = db();
        let me = add_user(&db, "me");
        let t0 = Utc::now() - Duration::days(1);
        for i in 0..105 {
            db.insert_message_at(me, &format!("msg {i}"), t0 + Duration::seconds(i)).unwrap();
        }

        let feed = db.feed_for(me, 100).unwrap();
        assert_eq!(feed.len(), 100);
        assert_eq!(feed[0].text, "msg 104");
        assert_eq!(feed[99].text, "msg 5");
    }

    #[test]
    fn deleting_user_cascades() {
        let db = db();
        let doomed = add_user(&db, "doomed");
        let other = add_user(&db, "other");

        let own_msg = db.insert_message(doomed, "bye").unwrap();
        let other_msg = db.insert_message(other, "hi").unwrap();
        db.follow(doomed, other).unwrap();
        db.follow(other, doomed).unwrap();
        db.toggle_like(doomed, other_msg).unwrap();
        db.toggle_like(other, own_msg).unwrap();

        assert!(db.delete_user(doomed).unwrap());

        assert!(db.get_user_by_id(doomed).unwrap().is_none());
        assert!(db.get_message(own_msg).unwrap().is_none());
        assert_eq!(count(&db, "messages"), 1);
        assert_eq!(count(&db, "follows"), 0);
        assert_eq!(count(&db, "likes"), 0);
    }

    #[test]
    fn update_profile_keeps_images_when_unset() {
        let db = db();
        let id = add_user(&db, "turtle");

        db.update_profile(
            id,
            &ProfileUpdate {
                username: "MrsTurtle",
                email: "mrs@test.com",
                image_url: None,
                header_image_url: None,
                bio: Some("I am Mrs Turtle"),
                location: Some("Florida"),
            },
        )
        .unwrap();

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(user.username, "MrsTurtle");
        assert_eq!(user.bio.as_deref(), Some("I am Mrs Turtle"));
        assert_eq!(user.image_url, DEFAULT_IMAGE_URL);
    }
}
