//! Folder endpoints: create, contents, rename, delete, breadcrumbs.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::file_handlers::{FileResponse, FolderContentsResponse};
use super::{parse_id, ts_rfc3339, AppJson, AppState};
use crate::auth::AuthUser;
use crate::db::entities::folder;
use crate::error::{Result, ServerError};
use crate::reclaim::reclaim_blocks;

#[derive(Serialize)]
pub struct FolderResponse {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<folder::Model> for FolderResponse {
    fn from(f: folder::Model) -> Self {
        Self {
            id: f.id,
            parent_id: f.parent_id,
            name: f.name,
            created_at: ts_rfc3339(f.created_at),
            updated_at: ts_rfc3339(f.updated_at),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub name: String,
    pub parent_id: Option<i64>,
}

pub async fn create_folder(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateFolderRequest>,
) -> Result<impl IntoResponse> {
    if req.name.is_empty() {
        return Err(ServerError::BadRequest("name is required".to_string()));
    }

    if let Some(parent_id) = req.parent_id {
        if state
            .folders
            .owned_by(parent_id, auth_user.user_id)
            .await?
            .is_none()
        {
            return Err(ServerError::NotFound("parent folder not found".to_string()));
        }
    }

    let folder = state
        .folders
        .create(auth_user.user_id, req.parent_id, &req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(FolderResponse::from(folder))))
}

#[derive(Deserialize)]
pub struct ContentsQuery {
    pub folder_id: Option<String>,
}

pub async fn list_contents(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContentsQuery>,
) -> Result<Json<FolderContentsResponse>> {
    let folder_id = match query.folder_id.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => {
            let id = parse_id(raw, "folder")?;
            if state.folders.owned_by(id, auth_user.user_id).await?.is_none() {
                return Err(ServerError::NotFound("folder not found".to_string()));
            }
            Some(id)
        }
        None => None,
    };

    let folders = state
        .folders
        .list_by_parent(auth_user.user_id, folder_id)
        .await?;
    let files = state.files.list_by_folder(auth_user.user_id, folder_id).await?;

    Ok(Json(FolderContentsResponse {
        folders: folders.into_iter().map(FolderResponse::from).collect(),
        files: files.into_iter().map(FileResponse::from).collect(),
    }))
}

#[derive(Deserialize)]
pub struct RenameFolderRequest {
    #[serde(default)]
    pub name: String,
}

pub async fn rename_folder(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<RenameFolderRequest>,
) -> Result<Json<FolderResponse>> {
    let folder_id = parse_id(&id, "folder")?;
    if req.name.is_empty() {
        return Err(ServerError::BadRequest("name is required".to_string()));
    }

    let folder = state
        .folders
        .rename(folder_id, auth_user.user_id, &req.name)
        .await?
        .ok_or_else(|| ServerError::NotFound("folder not found".to_string()))?;
    Ok(Json(folder.into()))
}

/// Deleting a folder removes everything under it. Contained files' block
/// references are snapshotted and settled the same way a direct file delete
/// would, so shared blocks keep accurate counts.
pub async fn delete_folder(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let folder_id = parse_id(&id, "folder")?;

    if state
        .folders
        .owned_by(folder_id, auth_user.user_id)
        .await?
        .is_none()
    {
        return Err(ServerError::NotFound(
            "folder not found or unauthorized".to_string(),
        ));
    }

    let subtree = state.folders.subtree_ids(folder_id, auth_user.user_id).await?;
    let file_ids = state
        .files
        .ids_in_folders(auth_user.user_id, &subtree)
        .await?;

    let mut snapshot = Vec::new();
    for file_id in &file_ids {
        snapshot.extend(state.files.block_ids(*file_id).await?);
    }

    if !state.folders.delete(folder_id, auth_user.user_id).await? {
        return Err(ServerError::NotFound(
            "folder not found or unauthorized".to_string(),
        ));
    }

    let removed = reclaim_blocks(&state.blocks, state.store.as_ref(), &snapshot).await;
    tracing::info!(
        user_id = auth_user.user_id,
        folder_id,
        folders_removed = subtree.len(),
        files_removed = file_ids.len(),
        blocks_removed = removed,
        "folder deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

pub async fn breadcrumbs(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FolderResponse>>> {
    let folder_id = parse_id(&id, "folder")?;

    let crumbs = state
        .folders
        .breadcrumbs(folder_id, auth_user.user_id)
        .await?;
    if crumbs.is_empty() {
        return Err(ServerError::NotFound("folder not found".to_string()));
    }

    Ok(Json(crumbs.into_iter().map(FolderResponse::from).collect()))
}
