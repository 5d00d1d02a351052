//! HTTP surface: shared state, router, and request plumbing.

pub mod auth_handlers;
pub mod file_handlers;
pub mod folder_handlers;
pub mod share_handlers;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    routing::{delete, get, patch, post},
    Json, Router,
};

use crate::config::Config;
use crate::error::ServerError;
use crate::storage::ObjectStore;
use crate::store::{BlockStore, FileStore, FolderStore, ShareStore, UserStore};

/// Application state shared across handlers.
pub struct AppState {
    pub config: Config,
    pub users: UserStore,
    pub files: FileStore,
    pub folders: FolderStore,
    pub blocks: BlockStore,
    pub shares: ShareStore,
    pub store: Arc<dyn ObjectStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: sea_orm::DatabaseConnection,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            files: FileStore::new(db.clone()),
            folders: FolderStore::new(db.clone()),
            blocks: BlockStore::new(db.clone()),
            shares: ShareStore::new(db),
            store,
            config,
        }
    }
}

/// Build the full route table. `GET /share/{token}` is public; everything
/// else under `/api/v1` requires a bearer token via the `AuthUser`
/// extractor on each handler.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Auth
        .route("/api/v1/auth/register", post(auth_handlers::register))
        .route("/api/v1/auth/login", post(auth_handlers::login))
        .route("/api/v1/auth/me", get(auth_handlers::me))
        // Files
        .route(
            "/api/v1/files",
            post(file_handlers::upload).get(file_handlers::list_files),
        )
        .route(
            "/api/v1/files/:id",
            get(file_handlers::download).delete(file_handlers::delete_file),
        )
        .route("/api/v1/files/:id/info", get(file_handlers::file_info))
        .route("/api/v1/files/:id/rename", patch(file_handlers::rename_file))
        .route("/api/v1/files/:id/move", patch(file_handlers::move_file))
        // Share links
        .route(
            "/api/v1/files/:id/share",
            post(share_handlers::create_share_link).get(share_handlers::list_share_links),
        )
        .route(
            "/api/v1/share/:token",
            get(share_handlers::download_shared).delete(share_handlers::delete_share_link),
        )
        // Folders
        .route("/api/v1/folders", post(folder_handlers::create_folder))
        .route("/api/v1/folders/contents", get(folder_handlers::list_contents))
        .route("/api/v1/folders/:id", delete(folder_handlers::delete_folder))
        .route(
            "/api/v1/folders/:id/rename",
            patch(folder_handlers::rename_folder),
        )
        .route(
            "/api/v1/folders/:id/breadcrumbs",
            get(folder_handlers::breadcrumbs),
        )
        // Health check
        .route("/health", get(health))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// JSON body extractor whose rejection uses the standard error envelope.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|_| ServerError::BadRequest("invalid JSON body".to_string()))?;
        Ok(AppJson(value))
    }
}

/// Path parameters are parsed by hand so a junk id yields the `bad_request`
/// envelope instead of the framework's default rejection.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<i64, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid {what} id")))
}

/// Storage timestamps are epoch seconds; responses use RFC 3339.
pub(crate) fn ts_rfc3339(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42", "file").unwrap(), 42);
        assert!(parse_id("abc", "file").is_err());
        assert!(parse_id("", "file").is_err());
    }

    #[test]
    fn test_ts_rfc3339() {
        assert_eq!(ts_rfc3339(0), "1970-01-01T00:00:00+00:00");
    }
}
