use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use lodge_types::api::{Claims, UploadResponse};

use crate::auth::AppState;
use crate::with_db;

/// 10 MB upload limit for message attachments.
const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

/// POST /uploads — accepts raw bytes, stores the blob, returns the id that a
/// message's `image` field can reference.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    if bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if bytes.len() > MAX_UPLOAD_SIZE {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let upload_id = Uuid::new_v4();
    let size = bytes.len() as u64;
    let filename = query.filename.unwrap_or_else(|| "upload".into());
    let uploader = claims.sub.to_string();

    with_db(state, move |db| {
        db.insert_upload(&upload_id.to_string(), &uploader, &filename, &bytes)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(UploadResponse { upload_id, size })))
}

/// GET /files/{id} — serves the stored blob back.
pub async fn download(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let id = upload_id.to_string();
    let (_row, data) = with_db(state, move |db| db.get_upload(&id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
        data,
    ))
}
