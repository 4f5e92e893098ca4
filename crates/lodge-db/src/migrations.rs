use rusqlite::Connection;
use tracing::info;

use crate::DbResult;

pub fn run(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            image       TEXT,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workspaces (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            owner_user_id   TEXT NOT NULL REFERENCES users(id),
            join_code       TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS members (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            role            TEXT NOT NULL,
            created_at      INTEGER NOT NULL,
            UNIQUE(workspace_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS channels (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            name            TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channels_workspace
            ON channels(workspace_id);

        CREATE TABLE IF NOT EXISTS bots (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            name            TEXT,
            image           TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_bots_workspace
            ON bots(workspace_id);

        -- A 1:1 stream between two members, or between a member and the
        -- workspace bot. Exactly one of member_two_id / bot_id is set.
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            member_one_id   TEXT NOT NULL REFERENCES members(id),
            member_two_id   TEXT REFERENCES members(id),
            bot_id          TEXT REFERENCES bots(id),
            created_at      INTEGER NOT NULL,
            CHECK ((member_two_id IS NULL) != (bot_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_workspace
            ON conversations(workspace_id);

        -- parent_message_id deliberately carries no foreign key: deleting a
        -- thread root leaves its replies in place, parent id intact.
        -- image is an opaque external-storage reference, also no FK.
        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            workspace_id        TEXT NOT NULL REFERENCES workspaces(id),
            channel_id          TEXT REFERENCES channels(id),
            conversation_id     TEXT REFERENCES conversations(id),
            parent_message_id   TEXT,
            member_id           TEXT REFERENCES members(id),
            bot_id              TEXT REFERENCES bots(id),
            body                TEXT NOT NULL,
            image               TEXT,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER,
            CHECK ((member_id IS NULL) != (bot_id IS NULL))
        );

        -- Composite container index: one seek per page, never an offset.
        CREATE INDEX IF NOT EXISTS idx_messages_container
            ON messages(channel_id, parent_message_id, conversation_id,
                        created_at DESC, id DESC);

        -- Thread streams are keyed by the parent id alone.
        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_message_id, created_at DESC, id DESC);

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            member_id   TEXT NOT NULL REFERENCES members(id),
            value       TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            UNIQUE(message_id, member_id, value)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS uploads (
            id                  TEXT PRIMARY KEY,
            uploader_user_id    TEXT NOT NULL REFERENCES users(id),
            filename            TEXT NOT NULL,
            size                INTEGER NOT NULL,
            data                BLOB NOT NULL,
            created_at          INTEGER NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
