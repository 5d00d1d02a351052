//! Public share links: create, list, delete, and the public download path.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rand::RngCore;
use serde::Serialize;

use super::file_handlers::DownloadQuery;
use super::{parse_id, ts_rfc3339, AppState};
use crate::assemble;
use crate::auth::AuthUser;
use crate::db::entities::share_link;
use crate::db::now_ts;
use crate::error::{Result, ServerError};

/// Default share-link lifetime.
const SHARE_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Serialize)]
pub struct ShareLinkResponse {
    pub id: i64,
    pub file_id: i64,
    pub token: String,
    pub url: String,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl From<share_link::Model> for ShareLinkResponse {
    fn from(link: share_link::Model) -> Self {
        Self {
            id: link.id,
            file_id: link.file_id,
            url: format!("/api/v1/share/{}", link.token),
            token: link.token,
            expires_at: link.expires_at.map(ts_rfc3339),
            created_at: ts_rfc3339(link.created_at),
        }
    }
}

pub async fn create_share_link(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let file_id = parse_id(&id, "file")?;

    // Only the owner can publish a file.
    state
        .files
        .owned_by(file_id, auth_user.user_id)
        .await?
        .ok_or(ServerError::Forbidden)?;

    let token = generate_token();
    let expires_at = now_ts() + SHARE_EXPIRY_SECS;

    let link = state
        .shares
        .create(file_id, auth_user.user_id, &token, Some(expires_at))
        .await?;

    tracing::info!(
        user_id = auth_user.user_id,
        file_id,
        link_id = link.id,
        "share link created"
    );

    Ok((StatusCode::CREATED, Json(ShareLinkResponse::from(link))))
}

pub async fn list_share_links(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ShareLinkResponse>>> {
    let file_id = parse_id(&id, "file")?;

    let links = state
        .shares
        .list_by_file(file_id, auth_user.user_id)
        .await?;
    Ok(Json(links.into_iter().map(ShareLinkResponse::from).collect()))
}

pub async fn delete_share_link(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let link_id = parse_id(&id, "link")?;

    if !state.shares.delete(link_id, auth_user.user_id).await? {
        return Err(ServerError::NotFound("share link not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Public download: no bearer token, access is the share token itself.
pub async fn download_shared(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let link = state
        .shares
        .by_token(&token)
        .await?
        .ok_or_else(|| ServerError::NotFound("share link not found".to_string()))?;

    if let Some(expires_at) = link.expires_at {
        if now_ts() > expires_at {
            tracing::warn!(link_id = link.id, "expired share link accessed");
            return Err(ServerError::ShareExpired);
        }
    }

    let file = state
        .files
        .by_id(link.file_id)
        .await?
        .ok_or_else(|| ServerError::NotFound("file not found".to_string()))?;

    let block_ids = state.files.block_ids(file.id).await?;
    let blocks = state.blocks.by_ids(&block_ids).await?;
    if blocks.len() != block_ids.len() {
        return Err(ServerError::Internal(format!(
            "file {} references missing blocks",
            file.id
        )));
    }

    tracing::info!(
        link_id = link.id,
        file_id = file.id,
        file_name = %file.name,
        "shared file download"
    );

    let preview = query.preview.as_deref() == Some("true");
    assemble::file_response(&file, preview, state.store.clone(), blocks)
}

/// 48 hex chars from 24 random bytes.
fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
