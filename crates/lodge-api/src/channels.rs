use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lodge_db::models::ChannelRow;
use lodge_types::api::{Claims, CreateChannelRequest};
use lodge_types::models::Channel;

use crate::auth::AppState;
use crate::{parse_uuid, require_member, with_db};

fn to_model(row: ChannelRow) -> Channel {
    Channel {
        id: parse_uuid("channel id", &row.id),
        workspace_id: parse_uuid("workspace_id", &row.workspace_id),
        name: row.name,
        created_at: row.created_at,
    }
}

pub async fn create_channel(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let member = require_member(&state, workspace_id, claims.sub).await?;
    if member.role != "admin" {
        return Err(StatusCode::FORBIDDEN);
    }

    // Channel names are stored the way slugs are displayed: lowercase,
    // spaces collapsed to dashes.
    let name = req.name.trim().to_lowercase().replace(char::is_whitespace, "-");
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let channel_id = Uuid::new_v4();
    let wid = workspace_id.to_string();
    let row = with_db(state, move |db| {
        db.create_channel(&channel_id.to_string(), &wid, &name)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(to_model(row))))
}

pub async fn list_channels(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_member(&state, workspace_id, claims.sub).await?;

    let wid = workspace_id.to_string();
    let rows = with_db(state, move |db| db.channels_of_workspace(&wid)).await?;
    let channels: Vec<Channel> = rows.into_iter().map(to_model).collect();
    Ok(Json(channels))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let cid = channel_id.to_string();
    let row = with_db(state.clone(), move |db| db.get_channel(&cid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let workspace_id = parse_uuid("workspace_id", &row.workspace_id);
    require_member(&state, workspace_id, claims.sub).await?;

    Ok(Json(to_model(row)))
}
