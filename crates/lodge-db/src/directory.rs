use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{
    BotRow, ChannelRow, ConversationRow, MemberProfileRow, MemberRow, UploadRow, UserRow,
    WorkspaceRow,
};
use crate::{Database, DbError, DbResult};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, username, password_hash, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, image, created_at FROM users WHERE username = ?1",
            )?;
            Ok(stmt.query_row([username], map_user_row).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, image, created_at FROM users WHERE id = ?1",
            )?;
            Ok(stmt.query_row([id], map_user_row).optional()?)
        })
    }

    // -- Workspaces --

    pub fn create_workspace(
        &self,
        id: &str,
        name: &str,
        owner_user_id: &str,
        join_code: &str,
    ) -> DbResult<WorkspaceRow> {
        self.with_conn(|conn| {
            let created_at = Utc::now().timestamp_millis();
            conn.execute(
                "INSERT INTO workspaces (id, name, owner_user_id, join_code, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, name, owner_user_id, join_code, created_at],
            )?;
            Ok(WorkspaceRow {
                id: id.to_owned(),
                name: name.to_owned(),
                owner_user_id: owner_user_id.to_owned(),
                join_code: join_code.to_owned(),
                created_at,
            })
        })
    }

    pub fn get_workspace(&self, id: &str) -> DbResult<Option<WorkspaceRow>> {
        self.with_conn(|conn| query_workspace(conn, id))
    }

    /// Workspaces the user belongs to, most recently joined first.
    pub fn workspaces_for_user(&self, user_id: &str) -> DbResult<Vec<WorkspaceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT w.id, w.name, w.owner_user_id, w.join_code, w.created_at \
                 FROM workspaces w \
                 JOIN members m ON m.workspace_id = w.id \
                 WHERE m.user_id = ?1 \
                 ORDER BY m.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_workspace_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_join_code(&self, workspace_id: &str, join_code: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE workspaces SET join_code = ?1 WHERE id = ?2",
                params![join_code, workspace_id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound("workspace"));
            }
            Ok(())
        })
    }

    // -- Members --

    pub fn add_member(
        &self,
        id: &str,
        workspace_id: &str,
        user_id: &str,
        role: &str,
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO members (id, workspace_id, user_id, role, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, workspace_id, user_id, role, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    /// The caller's membership in a workspace, which gates every message
    /// operation.
    pub fn get_member(&self, workspace_id: &str, user_id: &str) -> DbResult<Option<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, workspace_id, user_id, role, created_at FROM members \
                 WHERE workspace_id = ?1 AND user_id = ?2",
            )?;
            Ok(stmt
                .query_row(params![workspace_id, user_id], map_member_row)
                .optional()?)
        })
    }

    pub fn get_member_by_id(&self, id: &str) -> DbResult<Option<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, workspace_id, user_id, role, created_at FROM members WHERE id = ?1",
            )?;
            Ok(stmt.query_row([id], map_member_row).optional()?)
        })
    }

    pub fn members_of_workspace(&self, workspace_id: &str) -> DbResult<Vec<MemberProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.workspace_id, m.user_id, m.role, u.username, u.image \
                 FROM members m \
                 JOIN users u ON u.id = m.user_id \
                 WHERE m.workspace_id = ?1 \
                 ORDER BY m.created_at",
            )?;
            let rows = stmt
                .query_map([workspace_id], map_member_profile_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch member profiles for author resolution on a page.
    pub fn members_by_ids(&self, member_ids: &[String]) -> DbResult<Vec<MemberProfileRow>> {
        if member_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=member_ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT m.id, m.workspace_id, m.user_id, m.role, u.username, u.image \
                 FROM members m \
                 JOIN users u ON u.id = m.user_id \
                 WHERE m.id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> = member_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(bind.as_slice(), map_member_profile_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Channels --

    pub fn create_channel(&self, id: &str, workspace_id: &str, name: &str) -> DbResult<ChannelRow> {
        self.with_conn(|conn| {
            let created_at = Utc::now().timestamp_millis();
            conn.execute(
                "INSERT INTO channels (id, workspace_id, name, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, workspace_id, name, created_at],
            )?;
            Ok(ChannelRow {
                id: id.to_owned(),
                workspace_id: workspace_id.to_owned(),
                name: name.to_owned(),
                created_at,
            })
        })
    }

    pub fn get_channel(&self, id: &str) -> DbResult<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, workspace_id, name, created_at FROM channels WHERE id = ?1",
            )?;
            Ok(stmt.query_row([id], map_channel_row).optional()?)
        })
    }

    pub fn channels_of_workspace(&self, workspace_id: &str) -> DbResult<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, workspace_id, name, created_at FROM channels \
                 WHERE workspace_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([workspace_id], map_channel_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: &str) -> DbResult<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{CONVERSATION_COLS} WHERE id = ?1"))?;
            Ok(stmt.query_row([id], map_conversation_row).optional()?)
        })
    }

    /// A 1:1 human conversation between two members, whichever order they
    /// were stored in.
    pub fn find_conversation_between(
        &self,
        workspace_id: &str,
        member_a: &str,
        member_b: &str,
    ) -> DbResult<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{CONVERSATION_COLS} WHERE workspace_id = ?1 AND \
                 ((member_one_id = ?2 AND member_two_id = ?3) OR \
                  (member_one_id = ?3 AND member_two_id = ?2))"
            ))?;
            Ok(stmt
                .query_row(params![workspace_id, member_a, member_b], map_conversation_row)
                .optional()?)
        })
    }

    pub fn find_bot_conversation(
        &self,
        workspace_id: &str,
        member_id: &str,
        bot_id: &str,
    ) -> DbResult<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{CONVERSATION_COLS} WHERE workspace_id = ?1 \
                 AND member_one_id = ?2 AND bot_id = ?3"
            ))?;
            Ok(stmt
                .query_row(params![workspace_id, member_id, bot_id], map_conversation_row)
                .optional()?)
        })
    }

    pub fn create_conversation(
        &self,
        id: &str,
        workspace_id: &str,
        member_one_id: &str,
        member_two_id: Option<&str>,
        bot_id: Option<&str>,
    ) -> DbResult<ConversationRow> {
        self.with_conn(|conn| {
            let created_at = Utc::now().timestamp_millis();
            conn.execute(
                "INSERT INTO conversations \
                 (id, workspace_id, member_one_id, member_two_id, bot_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, workspace_id, member_one_id, member_two_id, bot_id, created_at],
            )?;
            Ok(ConversationRow {
                id: id.to_owned(),
                workspace_id: workspace_id.to_owned(),
                member_one_id: member_one_id.to_owned(),
                member_two_id: member_two_id.map(str::to_owned),
                bot_id: bot_id.map(str::to_owned),
                created_at,
            })
        })
    }

    // -- Bots --

    pub fn create_bot(
        &self,
        id: &str,
        workspace_id: &str,
        name: Option<&str>,
        image: Option<&str>,
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bots (id, workspace_id, name, image, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, workspace_id, name, image, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    /// The workspace's single automated participant, or None if not
    /// configured.
    pub fn bot_for_workspace(&self, workspace_id: &str) -> DbResult<Option<BotRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, workspace_id, name, image, created_at FROM bots \
                 WHERE workspace_id = ?1 LIMIT 1",
            )?;
            Ok(stmt.query_row([workspace_id], map_bot_row).optional()?)
        })
    }

    pub fn bots_by_ids(&self, bot_ids: &[String]) -> DbResult<Vec<BotRow>> {
        if bot_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=bot_ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT id, workspace_id, name, image, created_at FROM bots WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> = bot_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(bind.as_slice(), map_bot_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Uploads --

    pub fn insert_upload(
        &self,
        id: &str,
        uploader_user_id: &str,
        filename: &str,
        data: &[u8],
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO uploads (id, uploader_user_id, filename, size, data, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    uploader_user_id,
                    filename,
                    data.len() as i64,
                    data,
                    Utc::now().timestamp_millis()
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_upload(&self, id: &str) -> DbResult<Option<(UploadRow, Vec<u8>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uploader_user_id, filename, size, data, created_at \
                 FROM uploads WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id], |row| {
                    Ok((
                        UploadRow {
                            id: row.get(0)?,
                            uploader_user_id: row.get(1)?,
                            filename: row.get(2)?,
                            size: row.get(3)?,
                            created_at: row.get(5)?,
                        },
                        row.get::<_, Vec<u8>>(4)?,
                    ))
                })
                .optional()?;
            Ok(row)
        })
    }

    /// Which of the given upload ids actually exist. Drives the
    /// URL-or-unavailable resolution for message images.
    pub fn uploads_exist(&self, ids: &[String]) -> DbResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT id FROM uploads WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let found = stmt
                .query_map(bind.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<Result<HashSet<_>, _>>()?;
            Ok(found)
        })
    }
}

const CONVERSATION_COLS: &str = "SELECT id, workspace_id, member_one_id, member_two_id, \
     bot_id, created_at FROM conversations";

fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        image: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_workspace_row(row: &rusqlite::Row) -> rusqlite::Result<WorkspaceRow> {
    Ok(WorkspaceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_user_id: row.get(2)?,
        join_code: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_workspace(conn: &Connection, id: &str) -> DbResult<Option<WorkspaceRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, owner_user_id, join_code, created_at FROM workspaces WHERE id = ?1",
    )?;
    Ok(stmt.query_row([id], map_workspace_row).optional()?)
}

fn map_member_row(row: &rusqlite::Row) -> rusqlite::Result<MemberRow> {
    Ok(MemberRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_member_profile_row(row: &rusqlite::Row) -> rusqlite::Result<MemberProfileRow> {
    Ok(MemberProfileRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        username: row.get(4)?,
        image: row.get(5)?,
    })
}

fn map_channel_row(row: &rusqlite::Row) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_conversation_row(row: &rusqlite::Row) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        member_one_id: row.get(2)?,
        member_two_id: row.get(3)?,
        bot_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_bot_row(row: &rusqlite::Row) -> rusqlite::Result<BotRow> {
    Ok(BotRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        image: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::testutil::fixture;

    #[test]
    fn member_is_unique_per_workspace() {
        let (db, f) = fixture();
        let err = db.add_member("dup", &f.workspace_id, &f.user_a, "member");
        assert!(err.is_err());
    }

    #[test]
    fn conversation_lookup_is_order_insensitive() {
        let (db, f) = fixture();
        db.create_conversation("c1", &f.workspace_id, &f.member_a, Some(&f.member_b), None)
            .unwrap();

        let found = db
            .find_conversation_between(&f.workspace_id, &f.member_b, &f.member_a)
            .unwrap();
        assert_eq!(found.map(|c| c.id).as_deref(), Some("c1"));
    }

    #[test]
    fn bot_conversation_is_found_per_member() {
        let (db, f) = fixture();
        db.create_conversation("c1", &f.workspace_id, &f.member_a, None, Some(&f.bot_id))
            .unwrap();

        let found = db
            .find_bot_conversation(&f.workspace_id, &f.member_a, &f.bot_id)
            .unwrap();
        assert!(found.is_some());

        let other = db
            .find_bot_conversation(&f.workspace_id, &f.member_b, &f.bot_id)
            .unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn uploads_exist_reports_only_stored_ids() {
        let (db, f) = fixture();
        db.insert_upload("u1", &f.user_a, "cat.png", b"\x89PNG").unwrap();

        let found = db
            .uploads_exist(&["u1".into(), "missing".into()])
            .unwrap();
        assert!(found.contains("u1"));
        assert!(!found.contains("missing"));
    }
}
