pub mod auth;
pub mod bots;
pub mod channels;
pub mod conversations;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod uploads;
pub mod workspaces;

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{error, warn};
use uuid::Uuid;

use lodge_db::models::MemberRow;
use lodge_db::{Database, DbError, DbResult};

use crate::auth::AppStateInner;

pub(crate) fn db_error_status(err: &DbError) -> StatusCode {
    match err {
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        DbError::Forbidden => StatusCode::FORBIDDEN,
        DbError::InvalidReference(_) | DbError::InvalidCursor => StatusCode::BAD_REQUEST,
        DbError::LockPoisoned | DbError::Sqlite(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run a blocking DB closure off the async runtime and map the outcome onto
/// an HTTP status. Factored out of the handlers to avoid repeating the
/// spawn_blocking plumbing in every one.
pub(crate) async fn with_db<T, F>(state: Arc<AppStateInner>, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    result.map_err(|e| {
        let status = db_error_status(&e);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("database error: {}", e);
        }
        status
    })
}

/// Resolve the caller's membership in a workspace. Every message, reaction
/// and directory operation is gated on this.
pub(crate) async fn require_member(
    state: &Arc<AppStateInner>,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<MemberRow, StatusCode> {
    let wid = workspace_id.to_string();
    let uid = user_id.to_string();
    with_db(state.clone(), move |db| db.get_member(&wid, &uid))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)
}

/// Resolve a stored upload id to a fetchable URL.
pub(crate) fn file_url(state: &AppStateInner, upload_id: &str) -> String {
    format!("{}/{}", state.files_base_url.trim_end_matches('/'), upload_id)
}

/// Parse a stored UUID string, falling back to the nil UUID on corruption so
/// one bad row cannot fail a whole response.
pub(crate) fn parse_uuid(field: &'static str, raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, raw, e);
        Uuid::default()
    })
}
