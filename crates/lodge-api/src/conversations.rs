use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lodge_db::models::ConversationRow;
use lodge_types::api::{Claims, CreateConversationRequest};
use lodge_types::models::Conversation;

use crate::auth::AppState;
use crate::{parse_uuid, require_member, with_db};

fn to_model(row: ConversationRow) -> Conversation {
    Conversation {
        id: parse_uuid("conversation id", &row.id),
        workspace_id: parse_uuid("workspace_id", &row.workspace_id),
        member_one_id: parse_uuid("member_one_id", &row.member_one_id),
        member_two_id: row.member_two_id.map(|id| parse_uuid("member_two_id", &id)),
        bot_id: row.bot_id.map(|id| parse_uuid("bot_id", &id)),
    }
}

/// Create-or-get the 1:1 conversation between the caller and a peer. With
/// `member_id` the peer is that human member; without it, the workspace bot.
/// Idempotent: the existing conversation is returned whichever member
/// created it first.
pub async fn create_or_get_conversation(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let caller = require_member(&state, workspace_id, claims.sub).await?;
    let wid = workspace_id.to_string();

    let row = match req.member_id {
        Some(peer_id) => {
            let peer = peer_id.to_string();
            let caller_id = caller.id.clone();
            with_db(state, move |db| {
                let other = db
                    .get_member_by_id(&peer)?
                    .filter(|m| m.workspace_id == wid)
                    .ok_or(lodge_db::DbError::NotFound("member"))?;

                if let Some(existing) =
                    db.find_conversation_between(&wid, &caller_id, &other.id)?
                {
                    return Ok(existing);
                }

                db.create_conversation(
                    &Uuid::new_v4().to_string(),
                    &wid,
                    &caller_id,
                    Some(&other.id),
                    None,
                )
            })
            .await?
        }
        None => {
            let caller_id = caller.id.clone();
            with_db(state, move |db| {
                let bot = db
                    .bot_for_workspace(&wid)?
                    .ok_or(lodge_db::DbError::NotFound("bot"))?;

                if let Some(existing) = db.find_bot_conversation(&wid, &caller_id, &bot.id)? {
                    return Ok(existing);
                }

                db.create_conversation(
                    &Uuid::new_v4().to_string(),
                    &wid,
                    &caller_id,
                    None,
                    Some(&bot.id),
                )
            })
            .await?
        }
    };

    Ok(Json(to_model(row)))
}
