use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use lodge_db::cursor::Cursor;
use lodge_db::index::{NewAuthor, NewMessage};
use lodge_db::models::{BotRow, MemberProfileRow, MessageRow, ReactionRow};
use lodge_db::{Database, DbError, DbResult};
use lodge_types::api::{
    Claims, CreateMessageRequest, IdResponse, MessageItem, MessagePage, ReactionGroup,
    ThreadSummary, UpdateMessageRequest,
};
use lodge_types::events::GatewayEvent;
use lodge_types::models::{AuthorIdentity, AuthorRef, ContainerKey};

use crate::auth::{AppState, AppStateInner};
use crate::{file_url, parse_uuid, require_member, with_db};

const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub channel_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    /// Opaque resume token from the previous page.
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

// -- Writes --

pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.body.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let member = require_member(&state, req.workspace_id, claims.sub).await?;

    let message_id = Uuid::new_v4();
    let workspace_id = req.workspace_id;
    let member_id = member.id.clone();

    let row = with_db(state.clone(), move |db| {
        let mid = message_id.to_string();
        let wid = workspace_id.to_string();
        let channel_id = req.channel_id.map(|u| u.to_string());
        let conversation_id = req.conversation_id.map(|u| u.to_string());
        let parent_message_id = req.parent_message_id.map(|u| u.to_string());
        let image = req.image.map(|u| u.to_string());

        db.insert_message(NewMessage {
            id: &mid,
            workspace_id: &wid,
            channel_id: channel_id.as_deref(),
            conversation_id: conversation_id.as_deref(),
            parent_message_id: parent_message_id.as_deref(),
            author: NewAuthor::Member(&member_id),
            body: &req.body,
            image: image.as_deref(),
        })
    })
    .await?;

    state.dispatcher.broadcast(message_create_event(&row, AuthorRef::Member(parse_uuid(
        "member id",
        &member.id,
    ))));

    Ok((StatusCode::CREATED, Json(IdResponse { id: message_id })))
}

/// The automated-author write path. Gated on the workspace having a bot
/// configured, not on the caller's membership: the completion service posts
/// on behalf of the workspace, not of a member.
pub async fn create_bot_message(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.body.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message_id = Uuid::new_v4();
    let workspace_id = req.workspace_id;

    let (row, bot_id) = with_db(state.clone(), move |db| {
        let wid = workspace_id.to_string();
        let bot = db
            .bot_for_workspace(&wid)?
            .ok_or(DbError::NotFound("bot"))?;

        let mid = message_id.to_string();
        let channel_id = req.channel_id.map(|u| u.to_string());
        let conversation_id = req.conversation_id.map(|u| u.to_string());
        let parent_message_id = req.parent_message_id.map(|u| u.to_string());
        let image = req.image.map(|u| u.to_string());

        let row = db.insert_message(NewMessage {
            id: &mid,
            workspace_id: &wid,
            channel_id: channel_id.as_deref(),
            conversation_id: conversation_id.as_deref(),
            parent_message_id: parent_message_id.as_deref(),
            author: NewAuthor::Bot(&bot.id),
            body: &req.body,
            image: image.as_deref(),
        })?;

        Ok((row, bot.id))
    })
    .await?;

    state
        .dispatcher
        .broadcast(message_create_event(&row, AuthorRef::Bot(parse_uuid("bot id", &bot_id))));

    Ok((StatusCode::CREATED, Json(IdResponse { id: message_id })))
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.body.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mid = message_id.to_string();
    let row = with_db(state.clone(), move |db| db.get_message(&mid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let workspace_id = parse_uuid("workspace_id", &row.workspace_id);
    let member = require_member(&state, workspace_id, claims.sub).await?;

    let mid = message_id.to_string();
    let member_id = member.id;
    let updated = with_db(state.clone(), move |db| {
        db.update_message_body(&mid, &member_id, &req.body)
    })
    .await?;

    state.dispatcher.broadcast(GatewayEvent::MessageUpdate {
        id: message_id,
        channel_id: updated
            .channel_id
            .as_deref()
            .map(|s| parse_uuid("channel_id", s)),
        body: updated.body,
        updated_at: updated.updated_at.unwrap_or(updated.created_at),
    });

    Ok(Json(IdResponse { id: message_id }))
}

/// Deletion is immediate and non-cascading: thread replies stay behind with
/// their parent id intact.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let mid = message_id.to_string();
    let row = with_db(state.clone(), move |db| db.get_message(&mid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let workspace_id = parse_uuid("workspace_id", &row.workspace_id);
    let member = require_member(&state, workspace_id, claims.sub).await?;

    let mid = message_id.to_string();
    let member_id = member.id;
    let removed = with_db(state.clone(), move |db| db.delete_message(&mid, &member_id)).await?;

    state.dispatcher.broadcast(GatewayEvent::MessageDelete {
        id: message_id,
        channel_id: removed
            .channel_id
            .as_deref()
            .map(|s| parse_uuid("channel_id", s)),
    });

    Ok(Json(IdResponse { id: message_id }))
}

// -- Reads --

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessagePage>, StatusCode> {
    let limit = query.limit.clamp(1, MAX_PAGE_LIMIT);
    let cursor = match &query.cursor {
        Some(token) => Some(Cursor::decode(token).ok_or(StatusCode::BAD_REQUEST)?),
        None => None,
    };

    let (workspace_id, key) = resolve_container(&state, &query).await?;
    require_member(&state, workspace_id, claims.sub).await?;

    let data = with_db(state.clone(), move |db| {
        let page = db.page_messages(&key, cursor.as_ref(), limit)?;
        let enrichment = fetch_enrichment(db, &page.rows)?;
        Ok((page.rows, page.next_cursor, page.has_more, enrichment))
    })
    .await?;
    let (rows, next_cursor, has_more, enrichment) = data;

    // Rows whose author no longer resolves are dropped from the page
    // entirely; pagination metadata passes through unchanged.
    let items: Vec<MessageItem> = rows
        .into_iter()
        .filter_map(|row| to_item(&state, row, &enrichment))
        .collect();

    Ok(Json(MessagePage {
        items,
        next_cursor: next_cursor.map(|c| c.encode()),
        has_more,
    }))
}

/// Point lookup. Absence of the message, of the caller's membership, or of
/// the author all read as `null`, never as an error status.
pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Option<MessageItem>>, StatusCode> {
    let mid = message_id.to_string();
    let Some(row) = with_db(state.clone(), move |db| db.get_message(&mid)).await? else {
        return Ok(Json(None));
    };

    let wid = row.workspace_id.clone();
    let uid = claims.sub.to_string();
    if with_db(state.clone(), move |db| db.get_member(&wid, &uid))
        .await?
        .is_none()
    {
        return Ok(Json(None));
    }

    let rows = vec![row.clone()];
    let enrichment = with_db(state.clone(), move |db| fetch_enrichment(db, &rows)).await?;

    Ok(Json(to_item(&state, row, &enrichment)))
}

// -- Container resolution --

/// Resolve a page request to the workspace it is scoped by and the effective
/// stream key. A thread request is keyed by the parent id alone, whatever
/// else was supplied; the parent must still resolve.
async fn resolve_container(
    state: &AppState,
    query: &MessageQuery,
) -> Result<(Uuid, ContainerKey), StatusCode> {
    if let Some(parent_id) = query.parent_message_id {
        let pid = parent_id.to_string();
        let parent = with_db(state.clone(), move |db| db.get_message(&pid))
            .await?
            .ok_or(StatusCode::NOT_FOUND)?;
        let workspace_id = parse_uuid("workspace_id", &parent.workspace_id);
        return Ok((workspace_id, ContainerKey::thread(parent_id)));
    }

    if let Some(channel_id) = query.channel_id {
        let cid = channel_id.to_string();
        let channel = with_db(state.clone(), move |db| db.get_channel(&cid))
            .await?
            .ok_or(StatusCode::NOT_FOUND)?;
        let workspace_id = parse_uuid("workspace_id", &channel.workspace_id);
        return Ok((workspace_id, ContainerKey::channel(channel_id)));
    }

    if let Some(conversation_id) = query.conversation_id {
        let cid = conversation_id.to_string();
        let conversation = with_db(state.clone(), move |db| db.get_conversation(&cid))
            .await?
            .ok_or(StatusCode::NOT_FOUND)?;
        let workspace_id = parse_uuid("workspace_id", &conversation.workspace_id);
        return Ok((workspace_id, ContainerKey::conversation(conversation_id)));
    }

    Err(StatusCode::BAD_REQUEST)
}

// -- Enrichment --

struct Enrichment {
    reactions: HashMap<String, Vec<ReactionRow>>,
    threads: HashMap<String, (usize, Option<MessageRow>)>,
    members: HashMap<String, MemberProfileRow>,
    bots: HashMap<String, BotRow>,
    uploads: HashSet<String>,
}

/// Batch-fetch everything a page needs in one pass: reaction facts, thread
/// stats, author profiles (for the page rows and each thread's latest
/// reply), and attachment existence. One IN-query per concern instead of
/// four lookups per row.
fn fetch_enrichment(db: &Database, rows: &[MessageRow]) -> DbResult<Enrichment> {
    let ids: Vec<String> = rows.iter().map(|m| m.id.clone()).collect();

    let reaction_rows = db.reactions_for_messages(&ids)?;
    let threads = db.thread_stats_for_messages(&ids)?;

    let mut member_ids: HashSet<String> = HashSet::new();
    let mut bot_ids: HashSet<String> = HashSet::new();
    let author_rows = rows
        .iter()
        .chain(threads.values().filter_map(|(_, last)| last.as_ref()));
    for row in author_rows {
        if let Some(id) = &row.member_id {
            member_ids.insert(id.clone());
        }
        if let Some(id) = &row.bot_id {
            bot_ids.insert(id.clone());
        }
    }

    let member_ids: Vec<String> = member_ids.into_iter().collect();
    let bot_ids: Vec<String> = bot_ids.into_iter().collect();
    let members = db
        .members_by_ids(&member_ids)?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
    let bots = db
        .bots_by_ids(&bot_ids)?
        .into_iter()
        .map(|b| (b.id.clone(), b))
        .collect();

    let image_ids: Vec<String> = rows.iter().filter_map(|m| m.image.clone()).collect();
    let uploads = db.uploads_exist(&image_ids)?;

    let mut reactions: HashMap<String, Vec<ReactionRow>> = HashMap::new();
    for fact in reaction_rows {
        reactions.entry(fact.message_id.clone()).or_default().push(fact);
    }

    Ok(Enrichment {
        reactions,
        threads,
        members,
        bots,
        uploads,
    })
}

fn resolve_author(
    state: &AppStateInner,
    row: &MessageRow,
    enrichment: &Enrichment,
) -> Option<AuthorIdentity> {
    if let Some(member_id) = &row.member_id {
        let profile = enrichment.members.get(member_id)?;
        return Some(AuthorIdentity {
            id: parse_uuid("member id", &profile.id),
            name: profile.username.clone(),
            image: profile.image.as_deref().map(|id| file_url(state, id)),
        });
    }

    if let Some(bot_id) = &row.bot_id {
        let bot = enrichment.bots.get(bot_id)?;
        return Some(AuthorIdentity {
            id: parse_uuid("bot id", &bot.id),
            name: bot.name.clone().unwrap_or_else(|| "AI".to_string()),
            image: bot.image.as_deref().map(|id| file_url(state, id)),
        });
    }

    None
}

/// Summarize a message's thread. A dangling last-reply author degrades the
/// summary to its zero value rather than failing the page.
fn thread_summary(state: &AppStateInner, root_id: &str, enrichment: &Enrichment) -> ThreadSummary {
    let Some((count, last)) = enrichment.threads.get(root_id) else {
        return ThreadSummary::default();
    };
    let Some(last) = last else {
        return ThreadSummary::default();
    };

    match resolve_author(state, last, enrichment) {
        Some(author) => ThreadSummary {
            count: *count,
            last_author: Some(author),
            last_timestamp: last.created_at,
        },
        None => ThreadSummary::default(),
    }
}

fn to_item(state: &AppStateInner, row: MessageRow, enrichment: &Enrichment) -> Option<MessageItem> {
    let author = resolve_author(state, &row, enrichment)?;

    let image_url = row
        .image
        .as_deref()
        .filter(|id| enrichment.uploads.contains(*id))
        .map(|id| file_url(state, id));

    let reactions = group_reactions(
        enrichment
            .reactions
            .get(&row.id)
            .map_or(&[][..], |facts| facts.as_slice()),
    );
    let thread = thread_summary(state, &row.id, enrichment);

    Some(MessageItem {
        id: parse_uuid("message id", &row.id),
        workspace_id: parse_uuid("workspace_id", &row.workspace_id),
        channel_id: row
            .channel_id
            .as_deref()
            .map(|s| parse_uuid("channel_id", s)),
        conversation_id: row
            .conversation_id
            .as_deref()
            .map(|s| parse_uuid("conversation_id", s)),
        parent_message_id: row
            .parent_message_id
            .as_deref()
            .map(|s| parse_uuid("parent_message_id", s)),
        author,
        body: row.body,
        image_url,
        created_at: row.created_at,
        updated_at: row.updated_at,
        reactions,
        thread,
    })
}

/// Roll raw reaction facts up into per-value aggregates. Output order is the
/// first occurrence of each value among the facts; member ids are
/// deduplicated in first-seen order, so `count` is always the number of
/// distinct members.
fn group_reactions(facts: &[ReactionRow]) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for fact in facts {
        let member_id = parse_uuid("member_id", &fact.member_id);
        match groups.iter_mut().find(|g| g.value == fact.value) {
            Some(group) => {
                if !group.member_ids.contains(&member_id) {
                    group.member_ids.push(member_id);
                    group.count += 1;
                }
            }
            None => groups.push(ReactionGroup {
                value: fact.value.clone(),
                count: 1,
                member_ids: vec![member_id],
            }),
        }
    }
    groups
}

fn message_create_event(row: &MessageRow, author: AuthorRef) -> GatewayEvent {
    GatewayEvent::MessageCreate {
        id: parse_uuid("message id", &row.id),
        workspace_id: parse_uuid("workspace_id", &row.workspace_id),
        channel_id: row
            .channel_id
            .as_deref()
            .map(|s| parse_uuid("channel_id", s)),
        conversation_id: row
            .conversation_id
            .as_deref()
            .map(|s| parse_uuid("conversation_id", s)),
        parent_message_id: row
            .parent_message_id
            .as_deref()
            .map(|s| parse_uuid("parent_message_id", s)),
        author,
        body: row.body.clone(),
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodge_db::Database;
    use lodge_gateway::dispatcher::Dispatcher;

    fn test_state() -> AppStateInner {
        AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test".into(),
            dispatcher: Dispatcher::new(),
            files_base_url: "http://files.test".into(),
        }
    }

    fn fact(id: &str, message_id: &str, member_id: Uuid, value: &str) -> ReactionRow {
        ReactionRow {
            id: id.into(),
            message_id: message_id.into(),
            member_id: member_id.to_string(),
            value: value.into(),
            created_at: 0,
        }
    }

    fn empty_enrichment() -> Enrichment {
        Enrichment {
            reactions: HashMap::new(),
            threads: HashMap::new(),
            members: HashMap::new(),
            bots: HashMap::new(),
            uploads: HashSet::new(),
        }
    }

    fn message_row(id: &str, member_id: Option<&str>, bot_id: Option<&str>) -> MessageRow {
        MessageRow {
            id: id.into(),
            workspace_id: Uuid::new_v4().to_string(),
            channel_id: None,
            conversation_id: None,
            parent_message_id: None,
            member_id: member_id.map(str::to_owned),
            bot_id: bot_id.map(str::to_owned),
            body: "hi".into(),
            image: None,
            created_at: 1,
            updated_at: None,
        }
    }

    #[test]
    fn rollup_groups_in_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let facts = vec![
            fact("r1", "m1", a, "👍"),
            fact("r2", "m1", b, "🎉"),
            fact("r3", "m1", b, "👍"),
        ];

        let groups = group_reactions(&facts);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].value, "👍");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].member_ids, vec![a, b]);
        assert_eq!(groups[1].value, "🎉");
        assert_eq!(groups[1].count, 1);
        assert_eq!(groups[1].member_ids, vec![b]);
    }

    #[test]
    fn rollup_never_double_counts_a_member() {
        let a = Uuid::new_v4();
        let facts = vec![fact("r1", "m1", a, "👍"), fact("r2", "m1", a, "👍")];

        let groups = group_reactions(&facts);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 1);
        assert_eq!(groups[0].member_ids, vec![a]);
    }

    #[test]
    fn rollup_count_matches_member_ids_len() {
        let facts: Vec<ReactionRow> = (0..5)
            .map(|i| fact(&format!("r{i}"), "m1", Uuid::new_v4(), "👀"))
            .collect();

        for group in group_reactions(&facts) {
            assert_eq!(group.count, group.member_ids.len());
        }
    }

    #[test]
    fn unresolvable_author_drops_the_row() {
        let state = test_state();
        let row = message_row("m1", Some("gone-member"), None);
        assert!(to_item(&state, row, &empty_enrichment()).is_none());
    }

    #[test]
    fn bot_display_name_falls_back_to_ai() {
        let state = test_state();
        let bot_id = Uuid::new_v4().to_string();
        let row = message_row("m1", None, Some(&bot_id));

        let mut enrichment = empty_enrichment();
        enrichment.bots.insert(
            bot_id.clone(),
            BotRow {
                id: bot_id.clone(),
                workspace_id: Uuid::new_v4().to_string(),
                name: None,
                image: None,
                created_at: 0,
            },
        );

        let author = resolve_author(&state, &row, &enrichment).unwrap();
        assert_eq!(author.name, "AI");
    }

    #[test]
    fn dangling_thread_author_degrades_to_zero_summary() {
        let state = test_state();
        let last_reply = message_row("r9", Some("gone-member"), None);

        let mut enrichment = empty_enrichment();
        enrichment
            .threads
            .insert("m1".into(), (3, Some(last_reply)));

        let summary = thread_summary(&state, "m1", &enrichment);
        assert_eq!(summary.count, 0);
        assert!(summary.last_author.is_none());
        assert_eq!(summary.last_timestamp, 0);
    }
}
