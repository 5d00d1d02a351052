//! File endpoints: upload, listing, metadata, download, rename, move,
//! delete.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;

use super::{parse_id, ts_rfc3339, AppJson, AppState};
use crate::assemble;
use crate::auth::AuthUser;
use crate::db::entities::file;
use crate::error::{Result, ServerError};
use crate::pipeline::{BlockPipeline, PipelineOutput, DEFAULT_WORKERS};
use crate::reclaim::reclaim_blocks;

/// Per-upload deadline, sized for multi-gigabyte files. Independent of any
/// client-side timeout.
const UPLOAD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10 * 60);

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_id: i64,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub blocks_count: usize,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct FileResponse {
    pub id: i64,
    pub folder_id: Option<i64>,
    pub name: String,
    pub mime_type: String,
    pub total_size: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<file::Model> for FileResponse {
    fn from(f: file::Model) -> Self {
        Self {
            id: f.id,
            folder_id: f.folder_id,
            name: f.name,
            mime_type: f.mime_type,
            total_size: f.total_size,
            created_at: ts_rfc3339(f.created_at),
            updated_at: ts_rfc3339(f.updated_at),
        }
    }
}

pub async fn upload(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut folder_id: Option<i64> = None;
    let mut uploaded: Option<(String, PipelineOutput)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ServerError::BadRequest(format!("failed to parse multipart form: {e}"))
    })? {
        match field.name() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                tracing::info!(
                    user_id = auth_user.user_id,
                    file_name = %name,
                    "file upload started"
                );

                let pipeline = BlockPipeline::new(
                    state.blocks.clone(),
                    state.store.clone(),
                    state.config.block_size_bytes(),
                    DEFAULT_WORKERS,
                );
                let reader = StreamReader::new(
                    field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
                );
                let output = tokio::time::timeout(UPLOAD_TIMEOUT, pipeline.process(reader))
                    .await
                    .map_err(|_| {
                        ServerError::UploadFailed("upload deadline exceeded".to_string())
                    })?
                    .map_err(|e| match e {
                        ServerError::UploadFailed(_) => e,
                        other => ServerError::UploadFailed(other.to_string()),
                    })?;

                uploaded = Some((name, output));
            }
            Some("folder_id") => {
                let text = field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("failed to read folder_id: {e}"))
                })?;
                if !text.is_empty() {
                    folder_id = Some(
                        text.parse()
                            .map_err(|_| ServerError::BadRequest("invalid folder_id".to_string()))?,
                    );
                }
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let (name, output) =
        uploaded.ok_or_else(|| ServerError::BadRequest("field 'file' is required".to_string()))?;

    let mime_type = mime_guess::from_path(&name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let created = state
        .files
        .create(
            auth_user.user_id,
            &name,
            &mime_type,
            output.total_bytes as i64,
            folder_id,
        )
        .await?;
    state.files.link_blocks(created.id, &output.block_ids).await?;

    tracing::info!(
        user_id = auth_user.user_id,
        file_id = created.id,
        file_name = %created.name,
        total_size = output.total_bytes,
        blocks_count = output.block_ids.len(),
        "file uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_id: created.id,
            name: created.name,
            mime_type: created.mime_type,
            size: created.total_size,
            blocks_count: output.block_ids.len(),
            created_at: ts_rfc3339(created.created_at),
        }),
    ))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub folder_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct FolderContentsResponse {
    pub folders: Vec<super::folder_handlers::FolderResponse>,
    pub files: Vec<FileResponse>,
}

pub async fn list_files(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    // Search mode
    if let Some(term) = query.search.as_deref().filter(|s| !s.is_empty()) {
        tracing::info!(user_id = auth_user.user_id, search_query = term, "file search");
        let files = state.files.search(auth_user.user_id, term).await?;
        return Ok(Json(FolderContentsResponse {
            folders: Vec::new(),
            files: files.into_iter().map(FileResponse::from).collect(),
        })
        .into_response());
    }

    // Folder listing mode
    let folder_id = match query.folder_id.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_id(raw, "folder")?),
        None => None,
    };

    let files = state.files.list_by_folder(auth_user.user_id, folder_id).await?;
    let files: Vec<FileResponse> = files.into_iter().map(FileResponse::from).collect();
    Ok(Json(files).into_response())
}

pub async fn file_info(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>> {
    let file_id = parse_id(&id, "file")?;
    let file = state
        .files
        .owned_by(file_id, auth_user.user_id)
        .await?
        .ok_or(ServerError::Forbidden)?;
    Ok(Json(file.into()))
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub preview: Option<String>,
}

pub async fn download(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let file_id = parse_id(&id, "file")?;

    let file = state
        .files
        .owned_by(file_id, auth_user.user_id)
        .await?
        .ok_or(ServerError::Forbidden)?;

    let block_ids = state.files.block_ids(file.id).await?;
    let blocks = state.blocks.by_ids(&block_ids).await?;
    if blocks.len() != block_ids.len() {
        return Err(ServerError::Internal(format!(
            "file {} references missing blocks",
            file.id
        )));
    }

    tracing::info!(
        user_id = auth_user.user_id,
        file_id = file.id,
        file_name = %file.name,
        total_size = file.total_size,
        blocks = blocks.len(),
        "file download"
    );

    let preview = query.preview.as_deref() == Some("true");
    assemble::file_response(&file, preview, state.store.clone(), blocks)
}

#[derive(Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub name: String,
}

pub async fn rename_file(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<RenameRequest>,
) -> Result<Json<FileResponse>> {
    let file_id = parse_id(&id, "file")?;
    if req.name.is_empty() {
        return Err(ServerError::BadRequest("name is required".to_string()));
    }

    let file = state
        .files
        .rename(file_id, auth_user.user_id, &req.name)
        .await?
        .ok_or_else(|| ServerError::NotFound("file not found".to_string()))?;
    Ok(Json(file.into()))
}

#[derive(Deserialize)]
pub struct MoveRequest {
    /// Null moves the file to the root.
    pub folder_id: Option<i64>,
}

pub async fn move_file(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<MoveRequest>,
) -> Result<Json<FileResponse>> {
    let file_id = parse_id(&id, "file")?;

    let file = state
        .files
        .move_to(file_id, auth_user.user_id, req.folder_id)
        .await?
        .ok_or_else(|| ServerError::NotFound("file not found".to_string()))?;
    Ok(Json(file.into()))
}

pub async fn delete_file(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let file_id = parse_id(&id, "file")?;

    // Snapshot block ids before the delete cascades the file_blocks rows.
    let block_ids = state.files.block_ids(file_id).await?;

    if !state.files.delete(file_id, auth_user.user_id).await? {
        return Err(ServerError::Forbidden);
    }

    let removed = reclaim_blocks(&state.blocks, state.store.as_ref(), &block_ids).await;
    tracing::info!(
        user_id = auth_user.user_id,
        file_id,
        blocks_processed = block_ids.len(),
        blocks_removed = removed,
        "file deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}
