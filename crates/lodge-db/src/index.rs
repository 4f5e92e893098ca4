use std::collections::HashMap;

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use lodge_types::models::ContainerKey;

use crate::cursor::Cursor;
use crate::models::MessageRow;
use crate::{Database, DbError, DbResult};

const MESSAGE_COLS: &str = "SELECT id, workspace_id, channel_id, conversation_id, \
     parent_message_id, member_id, bot_id, body, image, created_at, updated_at \
     FROM messages";

#[derive(Debug, Clone, Copy)]
pub enum NewAuthor<'a> {
    Member(&'a str),
    Bot(&'a str),
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub workspace_id: &'a str,
    pub channel_id: Option<&'a str>,
    pub conversation_id: Option<&'a str>,
    pub parent_message_id: Option<&'a str>,
    pub author: NewAuthor<'a>,
    pub body: &'a str,
    pub image: Option<&'a str>,
}

pub struct MessagePage {
    pub rows: Vec<MessageRow>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl Database {
    /// Append a message. A reply resolves and freezes its channel /
    /// conversation from the parent here, at creation time; the stored
    /// container is never recomputed afterwards.
    pub fn insert_message(&self, new: NewMessage<'_>) -> DbResult<MessageRow> {
        self.with_conn(|conn| {
            let mut channel_id = new.channel_id.map(str::to_owned);
            let mut conversation_id = new.conversation_id.map(str::to_owned);

            if let Some(parent_id) = new.parent_message_id {
                let parent = query_message(conn, parent_id)?
                    .ok_or(DbError::NotFound("parent message"))?;
                if parent.workspace_id != new.workspace_id {
                    return Err(DbError::InvalidReference(
                        "parent message belongs to a different workspace",
                    ));
                }
                channel_id = parent.channel_id;
                conversation_id = parent.conversation_id;
            } else if channel_id.is_none() && conversation_id.is_none() {
                return Err(DbError::InvalidReference(
                    "a message needs a channel, a conversation, or a parent",
                ));
            }

            let (member_id, bot_id) = match new.author {
                NewAuthor::Member(id) => (Some(id.to_owned()), None),
                NewAuthor::Bot(id) => (None, Some(id.to_owned())),
            };

            let created_at = Utc::now().timestamp_millis();

            conn.execute(
                "INSERT INTO messages (id, workspace_id, channel_id, conversation_id, \
                 parent_message_id, member_id, bot_id, body, image, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.id,
                    new.workspace_id,
                    channel_id,
                    conversation_id,
                    new.parent_message_id,
                    member_id,
                    bot_id,
                    new.body,
                    new.image,
                    created_at
                ],
            )?;

            Ok(MessageRow {
                id: new.id.to_owned(),
                workspace_id: new.workspace_id.to_owned(),
                channel_id,
                conversation_id,
                parent_message_id: new.parent_message_id.map(str::to_owned),
                member_id,
                bot_id,
                body: new.body.to_owned(),
                image: new.image.map(str::to_owned),
                created_at,
                updated_at: None,
            })
        })
    }

    /// One page of a container's stream, newest first, ids breaking
    /// `created_at` ties. The cursor predicate seeks on the sort key itself,
    /// so rows inserted after the cursor was issued cannot shift, duplicate,
    /// or hide entries that already existed.
    pub fn page_messages(
        &self,
        key: &ContainerKey,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> DbResult<MessagePage> {
        self.with_conn(|conn| {
            let mut sql = String::from(MESSAGE_COLS);
            let mut values: Vec<Value> = Vec::new();

            if let Some(parent_id) = key.parent_message_id {
                // Thread streams are keyed by the parent id alone.
                sql.push_str(" WHERE parent_message_id = ?");
                values.push(Value::Text(parent_id.to_string()));
            } else {
                sql.push_str(
                    " WHERE channel_id IS ? AND parent_message_id IS NULL \
                     AND conversation_id IS ?",
                );
                values.push(opt_text(key.channel_id.map(|u| u.to_string())));
                values.push(opt_text(key.conversation_id.map(|u| u.to_string())));
            }

            if let Some(c) = cursor {
                sql.push_str(" AND (created_at < ? OR (created_at = ? AND id < ?))");
                values.push(Value::Integer(c.created_at));
                values.push(Value::Integer(c.created_at));
                values.push(Value::Text(c.id.clone()));
            }

            sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
            values.push(Value::Integer(limit as i64 + 1));

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(params_from_iter(values), map_message_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let has_more = rows.len() > limit;
            rows.truncate(limit);
            let next_cursor = rows.last().map(|m| Cursor {
                created_at: m.created_at,
                id: m.id.clone(),
            });

            Ok(MessagePage {
                rows,
                next_cursor,
                has_more,
            })
        })
    }

    pub fn get_message(&self, id: &str) -> DbResult<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Edit a message body. Only the original human author may edit;
    /// bot-authored messages have no `member_id` and are never editable.
    pub fn update_message_body(
        &self,
        id: &str,
        caller_member_id: &str,
        body: &str,
    ) -> DbResult<MessageRow> {
        self.with_conn(|conn| {
            let mut row = query_message(conn, id)?.ok_or(DbError::NotFound("message"))?;
            if row.member_id.as_deref() != Some(caller_member_id) {
                return Err(DbError::Forbidden);
            }

            let updated_at = Utc::now().timestamp_millis();
            conn.execute(
                "UPDATE messages SET body = ?1, updated_at = ?2 WHERE id = ?3",
                params![body, updated_at, id],
            )?;

            row.body = body.to_owned();
            row.updated_at = Some(updated_at);
            Ok(row)
        })
    }

    /// Delete a message. Reaction facts cascade; thread replies do not.
    /// They stay in place with their parent id intact.
    pub fn delete_message(&self, id: &str, caller_member_id: &str) -> DbResult<MessageRow> {
        self.with_conn(|conn| {
            let row = query_message(conn, id)?.ok_or(DbError::NotFound("message"))?;
            if row.member_id.as_deref() != Some(caller_member_id) {
                return Err(DbError::Forbidden);
            }

            conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(row)
        })
    }

    /// Reply count and most recent reply for a thread root. `(0, None)` when
    /// the message has no replies.
    pub fn thread_stats(&self, root_id: &str) -> DbResult<(usize, Option<MessageRow>)> {
        self.with_conn(|conn| query_thread_stats(conn, root_id))
    }

    /// Batch variant for page enrichment: one lock hold, one bounded scan
    /// per row on the page.
    pub fn thread_stats_for_messages(
        &self,
        message_ids: &[String],
    ) -> DbResult<HashMap<String, (usize, Option<MessageRow>)>> {
        self.with_conn(|conn| {
            let mut stats = HashMap::with_capacity(message_ids.len());
            for id in message_ids {
                stats.insert(id.clone(), query_thread_stats(conn, id)?);
            }
            Ok(stats)
        })
    }
}

fn opt_text(v: Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s),
        None => Value::Null,
    }
}

fn query_message(conn: &Connection, id: &str) -> DbResult<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("{MESSAGE_COLS} WHERE id = ?1"))?;
    let row = stmt.query_row([id], map_message_row).optional()?;
    Ok(row)
}

fn query_thread_stats(
    conn: &Connection,
    root_id: &str,
) -> DbResult<(usize, Option<MessageRow>)> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE parent_message_id = ?1",
        [root_id],
        |row| row.get(0),
    )?;

    if count == 0 {
        return Ok((0, None));
    }

    let mut stmt = conn.prepare(&format!(
        "{MESSAGE_COLS} WHERE parent_message_id = ?1 \
         ORDER BY created_at DESC, id DESC LIMIT 1"
    ))?;
    let last = stmt.query_row([root_id], map_message_row).optional()?;

    Ok((count as usize, last))
}

fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        channel_id: row.get(2)?,
        conversation_id: row.get(3)?,
        parent_message_id: row.get(4)?,
        member_id: row.get(5)?,
        bot_id: row.get(6)?,
        body: row.get(7)?,
        image: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Fixture, fixture, insert_at};

    fn walk(db: &Database, key: &ContainerKey, limit: usize) -> Vec<Vec<String>> {
        let mut pages = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let page = db.page_messages(key, cursor.as_ref(), limit).unwrap();
            pages.push(page.rows.iter().map(|m| m.id.clone()).collect());
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
        }
        pages
    }

    #[test]
    fn walk_returns_every_message_exactly_once_newest_first() {
        let (db, f) = fixture();
        for i in 0..25 {
            insert_at(&db, &f, &format!("m{i:02}"), 1_000 + i);
        }

        let pages = walk(&db, &f.channel_key(), 10);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), 10);
        assert_eq!(pages[1].len(), 10);
        assert_eq!(pages[2].len(), 5);

        let seen: Vec<String> = pages.into_iter().flatten().collect();
        let expected: Vec<String> = (0..25).rev().map(|i| format!("m{i:02}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn limit_two_pages_three_messages_newest_first() {
        let (db, f) = fixture();
        insert_at(&db, &f, "m1", 1);
        insert_at(&db, &f, "m2", 2);
        insert_at(&db, &f, "m3", 3);

        let key = f.channel_key();
        let first = db.page_messages(&key, None, 2).unwrap();
        let ids: Vec<_> = first.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m3", "m2"]);
        assert!(first.has_more);

        let second = db
            .page_messages(&key, first.next_cursor.as_ref(), 2)
            .unwrap();
        let ids: Vec<_> = second.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1"]);
        assert!(!second.has_more);
    }

    #[test]
    fn created_at_ties_break_by_id_descending() {
        let (db, f) = fixture();
        insert_at(&db, &f, "a", 500);
        insert_at(&db, &f, "b", 500);
        insert_at(&db, &f, "c", 500);

        let key = f.channel_key();
        let first = db.page_messages(&key, None, 2).unwrap();
        let ids: Vec<_> = first.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["c", "b"]);

        // The cursor must make progress through the tie, not around it.
        let second = db
            .page_messages(&key, first.next_cursor.as_ref(), 2)
            .unwrap();
        let ids: Vec<_> = second.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a"]);
        assert!(!second.has_more);
    }

    #[test]
    fn insert_during_walk_neither_duplicates_nor_skips() {
        let (db, f) = fixture();
        for i in 1..=4 {
            insert_at(&db, &f, &format!("m{i}"), i);
        }

        let key = f.channel_key();
        let first = db.page_messages(&key, None, 2).unwrap();
        let ids: Vec<_> = first.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m4", "m3"]);

        // A concurrent writer appends while our cursor is outstanding.
        insert_at(&db, &f, "m5", 5);

        let second = db
            .page_messages(&key, first.next_cursor.as_ref(), 2)
            .unwrap();
        let ids: Vec<_> = second.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m2", "m1"]);
        assert!(!second.has_more);

        // The new message is visible to a fresh walk.
        let fresh = db.page_messages(&key, None, 5).unwrap();
        let ids: Vec<_> = fresh.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m5", "m4", "m3", "m2", "m1"]);
    }

    #[test]
    fn reply_freezes_container_from_parent() {
        let (db, f) = fixture();
        let root = post_channel(&db, &f, "hello");

        let reply = db
            .insert_message(NewMessage {
                id: "r1",
                workspace_id: &f.workspace_id,
                channel_id: None,
                conversation_id: None,
                parent_message_id: Some(&root.id),
                author: NewAuthor::Member(&f.member_b),
                body: "re: hello",
                image: None,
            })
            .unwrap();

        assert_eq!(reply.channel_id, root.channel_id);
        assert_eq!(reply.conversation_id, None);
        assert_eq!(reply.parent_message_id.as_deref(), Some(root.id.as_str()));

        // The reply lives in the thread stream, not the top-level one.
        let top = db.page_messages(&f.channel_key(), None, 10).unwrap();
        let ids: Vec<_> = top.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, [root.id.as_str()]);

        let thread_key = ContainerKey::thread(root.id.parse().unwrap());
        let thread = db.page_messages(&thread_key, None, 10).unwrap();
        let ids: Vec<_> = thread.rows.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["r1"]);
    }

    #[test]
    fn reply_to_missing_parent_is_not_found() {
        let (db, f) = fixture();
        let err = db
            .insert_message(NewMessage {
                id: "r1",
                workspace_id: &f.workspace_id,
                channel_id: None,
                conversation_id: None,
                parent_message_id: Some("no-such-message"),
                author: NewAuthor::Member(&f.member_a),
                body: "into the void",
                image: None,
            })
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn message_without_any_container_is_rejected() {
        let (db, f) = fixture();
        let err = db
            .insert_message(NewMessage {
                id: "m1",
                workspace_id: &f.workspace_id,
                channel_id: None,
                conversation_id: None,
                parent_message_id: None,
                author: NewAuthor::Member(&f.member_a),
                body: "homeless",
                image: None,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidReference(_)));
    }

    #[test]
    fn reply_across_workspaces_is_rejected() {
        let (db, f) = fixture();
        let root = post_channel(&db, &f, "hello");

        let other = crate::testutil::second_workspace(&db, &f);
        let err = db
            .insert_message(NewMessage {
                id: "r1",
                workspace_id: &other,
                channel_id: None,
                conversation_id: None,
                parent_message_id: Some(&root.id),
                author: NewAuthor::Member(&f.member_a),
                body: "wrong side",
                image: None,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidReference(_)));
    }

    #[test]
    fn update_requires_the_original_author() {
        let (db, f) = fixture();
        let msg = post_channel(&db, &f, "draft");

        let err = db
            .update_message_body(&msg.id, &f.member_b, "hijacked")
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden));

        let updated = db
            .update_message_body(&msg.id, &f.member_a, "final")
            .unwrap();
        assert_eq!(updated.body, "final");
        assert!(updated.updated_at.is_some());

        let stored = db.get_message(&msg.id).unwrap().unwrap();
        assert_eq!(stored.body, "final");
        assert_eq!(stored.updated_at, updated.updated_at);
    }

    #[test]
    fn bot_messages_are_never_editable_or_removable() {
        let (db, f) = fixture();
        let msg = db
            .insert_message(NewMessage {
                id: "b1",
                workspace_id: &f.workspace_id,
                channel_id: Some(&f.channel_id),
                conversation_id: None,
                parent_message_id: None,
                author: NewAuthor::Bot(&f.bot_id),
                body: "beep",
                image: None,
            })
            .unwrap();

        let err = db
            .update_message_body(&msg.id, &f.member_a, "boop")
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden));

        let err = db.delete_message(&msg.id, &f.member_a).unwrap_err();
        assert!(matches!(err, DbError::Forbidden));
    }

    #[test]
    fn delete_leaves_thread_replies_orphaned() {
        let (db, f) = fixture();
        let root = post_channel(&db, &f, "root");
        insert_reply(&db, &f, "r1", &root.id, 10);
        insert_reply(&db, &f, "r2", &root.id, 20);
        db.toggle_reaction("fact-1", &root.id, &f.member_b, "👍")
            .unwrap();

        db.delete_message(&root.id, &f.member_a).unwrap();
        assert!(db.get_message(&root.id).unwrap().is_none());

        // Reaction facts cascade with the message.
        assert!(db.reactions_for_message(&root.id).unwrap().is_empty());

        // Replies stay, parent id intact, and the thread stream still pages.
        let (count, last) = db.thread_stats(&root.id).unwrap();
        assert_eq!(count, 2);
        assert_eq!(last.unwrap().id, "r2");

        let thread_key = ContainerKey::thread(root.id.parse().unwrap());
        let page = db.page_messages(&thread_key, None, 10).unwrap();
        assert_eq!(page.rows.len(), 2);
    }

    #[test]
    fn thread_stats_zero_then_counts_replies() {
        let (db, f) = fixture();
        let root = post_channel(&db, &f, "root");

        assert_eq!(db.thread_stats(&root.id).unwrap().0, 0);

        insert_reply(&db, &f, "r1", &root.id, 10);
        insert_reply(&db, &f, "r2", &root.id, 30);
        insert_reply(&db, &f, "r3", &root.id, 20);

        let (count, last) = db.thread_stats(&root.id).unwrap();
        assert_eq!(count, 3);
        let last = last.unwrap();
        assert_eq!(last.id, "r2");
        assert_eq!(last.created_at, 30);
    }

    fn post_channel(db: &Database, f: &Fixture, body: &str) -> MessageRow {
        db.insert_message(NewMessage {
            id: &uuid::Uuid::new_v4().to_string(),
            workspace_id: &f.workspace_id,
            channel_id: Some(&f.channel_id),
            conversation_id: None,
            parent_message_id: None,
            author: NewAuthor::Member(&f.member_a),
            body,
            image: None,
        })
        .unwrap()
    }

    fn insert_reply(db: &Database, f: &Fixture, id: &str, parent: &str, created_at: i64) {
        crate::testutil::insert_reply_at(db, f, id, parent, created_at);
    }
}
