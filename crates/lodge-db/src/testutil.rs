//! Shared fixtures for the query tests. Raw inserts take explicit
//! timestamps so ordering assertions stay deterministic.

use rusqlite::params;
use uuid::Uuid;

use lodge_types::models::ContainerKey;

use crate::Database;

pub struct Fixture {
    pub workspace_id: String,
    pub channel_id: String,
    pub user_a: String,
    pub user_b: String,
    pub member_a: String,
    pub member_b: String,
    pub bot_id: String,
}

impl Fixture {
    pub fn channel_key(&self) -> ContainerKey {
        ContainerKey::channel(self.channel_id.parse().unwrap())
    }
}

pub fn fixture() -> (Database, Fixture) {
    let db = Database::open_in_memory().unwrap();

    let user_a = Uuid::new_v4().to_string();
    let user_b = Uuid::new_v4().to_string();
    db.create_user(&user_a, "alice", "$argon2id$stub").unwrap();
    db.create_user(&user_b, "bob", "$argon2id$stub").unwrap();

    let workspace_id = Uuid::new_v4().to_string();
    db.create_workspace(&workspace_id, "acme", &user_a, "q7x2lp")
        .unwrap();

    let member_a = Uuid::new_v4().to_string();
    let member_b = Uuid::new_v4().to_string();
    db.add_member(&member_a, &workspace_id, &user_a, "admin")
        .unwrap();
    db.add_member(&member_b, &workspace_id, &user_b, "member")
        .unwrap();

    let channel_id = Uuid::new_v4().to_string();
    db.create_channel(&channel_id, &workspace_id, "general")
        .unwrap();

    let bot_id = Uuid::new_v4().to_string();
    db.create_bot(&bot_id, &workspace_id, Some("AI"), None)
        .unwrap();

    (
        db,
        Fixture {
            workspace_id,
            channel_id,
            user_a,
            user_b,
            member_a,
            member_b,
            bot_id,
        },
    )
}

pub fn second_workspace(db: &Database, f: &Fixture) -> String {
    let id = Uuid::new_v4().to_string();
    db.create_workspace(&id, "other", &f.user_a, "zz9yw1")
        .unwrap();
    id
}

/// Insert a top-level channel message authored by member_a at a fixed
/// timestamp.
pub fn insert_at(db: &Database, f: &Fixture, id: &str, created_at: i64) {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO messages (id, workspace_id, channel_id, member_id, body, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, f.workspace_id, f.channel_id, f.member_a, "body", created_at],
        )?;
        Ok(())
    })
    .unwrap();
}

/// Insert a thread reply (frozen into the fixture channel) at a fixed
/// timestamp.
pub fn insert_reply_at(db: &Database, f: &Fixture, id: &str, parent: &str, created_at: i64) {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO messages \
             (id, workspace_id, channel_id, parent_message_id, member_id, body, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, f.workspace_id, f.channel_id, parent, f.member_b, "reply", created_at],
        )?;
        Ok(())
    })
    .unwrap();
}

/// Insert a raw reaction fact at a fixed timestamp.
pub fn insert_reaction_at(
    db: &Database,
    id: &str,
    message_id: &str,
    member_id: &str,
    value: &str,
    created_at: i64,
) {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO reactions (id, message_id, member_id, value, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, message_id, member_id, value, created_at],
        )?;
        Ok(())
    })
    .unwrap();
}
