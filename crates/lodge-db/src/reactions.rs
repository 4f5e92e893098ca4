use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use crate::models::ReactionRow;
use crate::{Database, DbError, DbResult};

impl Database {
    /// Toggle a reaction fact: removes it if the `(message, member, value)`
    /// triple exists, inserts it otherwise. Returns the inserted fact id, or
    /// None on removal. The connection lock serializes concurrent toggles on
    /// the same triple; the UNIQUE constraint is the backstop.
    pub fn toggle_reaction(
        &self,
        id: &str,
        message_id: &str,
        member_id: &str,
        value: &str,
    ) -> DbResult<Option<String>> {
        self.with_conn(|conn| {
            let message: Option<String> = conn
                .query_row("SELECT id FROM messages WHERE id = ?1", [message_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if message.is_none() {
                return Err(DbError::NotFound("message"));
            }

            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM reactions \
                     WHERE message_id = ?1 AND member_id = ?2 AND value = ?3",
                    params![message_id, member_id, value],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM reactions WHERE id = ?1", [&existing_id])?;
                Ok(None)
            } else {
                conn.execute(
                    "INSERT INTO reactions (id, message_id, member_id, value, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, message_id, member_id, value, Utc::now().timestamp_millis()],
                )?;
                Ok(Some(id.to_owned()))
            }
        })
    }

    /// Batch-fetch raw reaction facts for a set of message ids. Ordered by
    /// `(created_at, id)` so grouping by first occurrence is stable.
    pub fn reactions_for_messages(&self, message_ids: &[String]) -> DbResult<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT id, message_id, member_id, value, created_at FROM reactions \
                 WHERE message_id IN ({}) ORDER BY created_at, id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(bind.as_slice(), |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        member_id: row.get(2)?,
                        value: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn reactions_for_message(&self, message_id: &str) -> DbResult<Vec<ReactionRow>> {
        self.reactions_for_messages(&[message_id.to_owned()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, insert_at, insert_reaction_at};

    #[test]
    fn toggle_inserts_then_removes() {
        let (db, f) = fixture();
        insert_at(&db, &f, "m1", 1);

        let inserted = db
            .toggle_reaction("fact-1", "m1", &f.member_a, "👍")
            .unwrap();
        assert_eq!(inserted.as_deref(), Some("fact-1"));

        let facts = db.reactions_for_message("m1").unwrap();
        assert_eq!(facts.len(), 1);

        let removed = db
            .toggle_reaction("fact-2", "m1", &f.member_a, "👍")
            .unwrap();
        assert_eq!(removed, None);
        assert!(db.reactions_for_message("m1").unwrap().is_empty());
    }

    #[test]
    fn toggle_on_missing_message_is_not_found() {
        let (db, f) = fixture();
        let err = db
            .toggle_reaction("fact-1", "no-such-message", &f.member_a, "👍")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn toggle_pair_restores_original_state() {
        let (db, f) = fixture();
        insert_at(&db, &f, "m1", 1);
        insert_reaction_at(&db, "r1", "m1", &f.member_b, "🎉", 100);

        db.toggle_reaction("fact-1", "m1", &f.member_a, "🎉").unwrap();
        db.toggle_reaction("fact-2", "m1", &f.member_a, "🎉").unwrap();

        let facts = db.reactions_for_message("m1").unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].member_id, f.member_b);
    }

    #[test]
    fn distinct_members_and_values_coexist() {
        let (db, f) = fixture();
        insert_at(&db, &f, "m1", 1);

        db.toggle_reaction("fact-1", "m1", &f.member_a, "👍").unwrap();
        db.toggle_reaction("fact-2", "m1", &f.member_b, "👍").unwrap();
        db.toggle_reaction("fact-3", "m1", &f.member_a, "🎉").unwrap();

        assert_eq!(db.reactions_for_message("m1").unwrap().len(), 3);
    }

    #[test]
    fn batch_fetch_is_scoped_and_ordered() {
        let (db, f) = fixture();
        insert_at(&db, &f, "m1", 1);
        insert_at(&db, &f, "m2", 2);
        insert_at(&db, &f, "m3", 3);

        insert_reaction_at(&db, "r-late", "m1", &f.member_a, "👍", 300);
        insert_reaction_at(&db, "r-early", "m2", &f.member_b, "🎉", 100);
        insert_reaction_at(&db, "r-other", "m3", &f.member_a, "👀", 200);

        let facts = db
            .reactions_for_messages(&["m1".into(), "m2".into()])
            .unwrap();
        let ids: Vec<_> = facts.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r-early", "r-late"]);
    }
}
