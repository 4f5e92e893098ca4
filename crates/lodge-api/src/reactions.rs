use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lodge_types::api::{Claims, ToggleReactionRequest, ToggleReactionResponse};
use lodge_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::{parse_uuid, require_member, with_db};

/// Toggle the caller's `(message, member, value)` reaction fact: inserts it
/// if absent, removes it if present.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.value.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mid = message_id.to_string();
    let row = with_db(state.clone(), move |db| db.get_message(&mid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let workspace_id = parse_uuid("workspace_id", &row.workspace_id);
    let member = require_member(&state, workspace_id, claims.sub).await?;

    let fact_id = Uuid::new_v4();
    let mid = message_id.to_string();
    let member_id = member.id.clone();
    let value = req.value.clone();
    let inserted = with_db(state.clone(), move |db| {
        db.toggle_reaction(&fact_id.to_string(), &mid, &member_id, &value)
    })
    .await?;

    let member_id = parse_uuid("member id", &member.id);
    if inserted.is_some() {
        state.dispatcher.broadcast(GatewayEvent::ReactionAdd {
            message_id,
            member_id,
            value: req.value,
        });
    } else {
        state.dispatcher.broadcast(GatewayEvent::ReactionRemove {
            message_id,
            member_id,
            value: req.value,
        });
    }

    Ok(Json(ToggleReactionResponse {
        reaction_id: inserted.map(|_| fact_id),
    }))
}
