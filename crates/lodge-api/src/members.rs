use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lodge_db::models::MemberProfileRow;
use lodge_types::api::Claims;
use lodge_types::models::{Member, MemberRole};

use crate::auth::{AppState, AppStateInner};
use crate::{parse_uuid, require_member, with_db};

fn to_model(state: &AppStateInner, row: MemberProfileRow) -> Member {
    Member {
        id: parse_uuid("member id", &row.id),
        workspace_id: parse_uuid("workspace_id", &row.workspace_id),
        user_id: parse_uuid("user_id", &row.user_id),
        role: if row.role == "admin" {
            MemberRole::Admin
        } else {
            MemberRole::Member
        },
        username: row.username,
        image: row.image.map(|id| crate::file_url(state, &id)),
    }
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_member(&state, workspace_id, claims.sub).await?;

    let wid = workspace_id.to_string();
    let rows = with_db(state.clone(), move |db| db.members_of_workspace(&wid)).await?;
    let members: Vec<Member> = rows.into_iter().map(|r| to_model(&state, r)).collect();
    Ok(Json(members))
}

/// The caller's own membership in a workspace.
pub async fn current_member(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let member = require_member(&state, workspace_id, claims.sub).await?;

    let mid = member.id.clone();
    let rows = with_db(state.clone(), move |db| db.members_by_ids(&[mid])).await?;
    let row = rows.into_iter().next().ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(to_model(&state, row)))
}
