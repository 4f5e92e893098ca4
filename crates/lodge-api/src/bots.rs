use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lodge_types::api::Claims;
use lodge_types::models::Bot;

use crate::auth::AppState;
use crate::{parse_uuid, require_member, with_db};

/// The workspace's automated participant, or null when none is configured.
pub async fn get_bot(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_member(&state, workspace_id, claims.sub).await?;

    let wid = workspace_id.to_string();
    let bot = with_db(state.clone(), move |db| db.bot_for_workspace(&wid)).await?;

    Ok(Json(bot.map(|row| Bot {
        id: parse_uuid("bot id", &row.id),
        workspace_id: parse_uuid("workspace_id", &row.workspace_id),
        name: row.name,
        image: row.image.map(|id| crate::file_url(&state, &id)),
    })))
}
