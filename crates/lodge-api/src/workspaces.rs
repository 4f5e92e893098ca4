use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::Rng;
use uuid::Uuid;

use lodge_db::models::WorkspaceRow;
use lodge_types::api::{Claims, CreateWorkspaceRequest, IdResponse, JoinWorkspaceRequest};
use lodge_types::models::Workspace;

use crate::auth::AppState;
use crate::{parse_uuid, require_member, with_db};

const JOIN_CODE_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const JOIN_CODE_LEN: usize = 6;

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_CHARS[rng.random_range(0..JOIN_CODE_CHARS.len())] as char)
        .collect()
}

fn to_model(row: WorkspaceRow) -> Workspace {
    Workspace {
        id: parse_uuid("workspace id", &row.id),
        name: row.name,
        owner_user_id: parse_uuid("owner_user_id", &row.owner_user_id),
        join_code: row.join_code,
        created_at: row.created_at,
    }
}

/// Creating a workspace also seeds its #general channel, the creator's admin
/// membership, and the workspace bot.
pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let workspace_id = Uuid::new_v4();
    let join_code = generate_join_code();
    let user_id = claims.sub.to_string();
    let name = req.name.trim().to_string();

    let row = with_db(state, move |db| {
        let row = db.create_workspace(&workspace_id.to_string(), &name, &user_id, &join_code)?;
        db.add_member(&Uuid::new_v4().to_string(), &row.id, &user_id, "admin")?;
        db.create_channel(&Uuid::new_v4().to_string(), &row.id, "general")?;
        db.create_bot(&Uuid::new_v4().to_string(), &row.id, Some("AI"), None)?;
        Ok(row)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(to_model(row))))
}

pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub.to_string();
    let rows = with_db(state, move |db| db.workspaces_for_user(&user_id)).await?;
    let workspaces: Vec<Workspace> = rows.into_iter().map(to_model).collect();
    Ok(Json(workspaces))
}

pub async fn get_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_member(&state, workspace_id, claims.sub).await?;

    let wid = workspace_id.to_string();
    let row = with_db(state, move |db| db.get_workspace(&wid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(to_model(row)))
}

pub async fn join_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinWorkspaceRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let wid = workspace_id.to_string();
    let row = with_db(state.clone(), move |db| db.get_workspace(&wid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    if !row.join_code.eq_ignore_ascii_case(req.join_code.trim()) {
        return Err(StatusCode::FORBIDDEN);
    }

    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    if with_db(state.clone(), move |db| db.get_member(&wid, &uid))
        .await?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    let member_id = Uuid::new_v4();
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    with_db(state, move |db| {
        db.add_member(&member_id.to_string(), &wid, &uid, "member")
    })
    .await?;

    Ok((StatusCode::CREATED, Json(IdResponse { id: member_id })))
}

/// Regenerate the invite code so a leaked one stops working. Admin only.
pub async fn reset_join_code(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let member = require_member(&state, workspace_id, claims.sub).await?;
    if member.role != "admin" {
        return Err(StatusCode::FORBIDDEN);
    }

    let join_code = generate_join_code();
    let wid = workspace_id.to_string();
    let code = join_code.clone();
    with_db(state, move |db| db.set_join_code(&wid, &code)).await?;

    Ok(Json(serde_json::json!({ "join_code": join_code })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_codes_are_six_lowercase_alphanumerics() {
        for _ in 0..50 {
            let code = generate_join_code();
            assert_eq!(code.len(), JOIN_CODE_LEN);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            );
        }
    }
}
