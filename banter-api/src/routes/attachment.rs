//! Attachment Endpoints
//!
//! Upload, list, download, and delete uploaded files. Metadata lives in the
//! chat store, bytes in the blob store; the two are stitched together here.
//! Captioning and ingestion after a successful upload are best-effort: the
//! upload already succeeded, so their failures are logged, not surfaced.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use banter_core::{new_entity_id, Attachment, AttachmentScope};
use banter_llm::IngestMetadata;
use banter_storage::files::sanitize_filename;

use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::IdentityExtractor;
use crate::pipeline::{authorize_attachment_delete, authorize_attachment_read, best_effort};
use crate::state::AppState;

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// Pagination for GET /attachments. `limit` is clamped to [1, 200].
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct ListAttachmentsQuery {
    #[serde(default = "default_attachment_limit")]
    pub limit: i64,
}

fn default_attachment_limit() -> i64 {
    50
}

// ============================================================================
// UPLOAD
// ============================================================================

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// POST /attachments - Upload a file
///
/// Multipart fields: `file` (required), `scope` (`user` default, `system`
/// admin-only), `caption` (optional; images without one get a vision
/// description after the upload).
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/attachments",
    tag = "Attachments",
    responses(
        (status = 200, description = "Stored attachment metadata", body = Attachment),
        (status = 400, description = "Missing file field or malformed body"),
        (status = 403, description = "System scope requires admin"),
        (status = 413, description = "File exceeds the upload cap"),
    ),
))]
pub async fn upload_attachment(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    mut multipart: Multipart,
) -> ApiResult<Json<Attachment>> {
    let mut file: Option<UploadedFile> = None;
    let mut scope = AttachmentScope::User;
    let mut caption: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = sanitize_filename(field.file_name().unwrap_or("file"));
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "scope" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                scope = AttachmentScope::from_db_str(raw.trim())
                    .map_err(|e| ApiError::invalid_input(e.to_string()))?;
            }
            "caption" => {
                let text = field.text().await.map_err(bad_multipart)?;
                if !text.trim().is_empty() {
                    caption = Some(text);
                }
            }
            _ => {}
        }
    }

    if scope == AttachmentScope::System {
        require_admin(&identity, state.admin_group())?;
    }
    let file = file.ok_or_else(|| ApiError::missing_field("file"))?;
    if file.bytes.len() > state.files_config.max_upload_bytes() {
        return Err(ApiError::payload_too_large(state.files_config.max_upload_mb));
    }

    let owner = match scope {
        AttachmentScope::User => Some(identity.user_id.clone()),
        AttachmentScope::System => None,
    };
    let stored = state
        .files
        .store(owner.as_deref(), &file.filename, &file.bytes)
        .await?;
    let mut attachment = Attachment::new(
        new_entity_id(),
        scope,
        owner,
        stored.uri,
        stored.storage_path,
        file.filename,
        file.content_type,
        stored.size_bytes,
        caption,
        Utc::now(),
    )?;
    state.store.record_attachment(&attachment).await?;

    // Images without a caller-supplied caption get a vision description so
    // they carry searchable text into retrieval.
    if attachment.caption.is_none() && is_image(&attachment) {
        match state
            .vision
            .describe_image(&file.bytes, Some(&attachment.filename))
            .await
        {
            Ok(description) => {
                best_effort(
                    "attachment_caption_store",
                    state
                        .store
                        .set_attachment_caption(&attachment.id, &description)
                        .await,
                );
                attachment.caption = Some(description);
            }
            Err(e) => {
                tracing::warn!(attachment_id = %attachment.id, error = %e, "vision captioning failed");
            }
        }
    }

    let metadata = IngestMetadata {
        uri: attachment.uri.clone(),
        filename: attachment.filename.clone(),
        content_type: attachment.content_type.clone(),
        scope: attachment.scope.as_db_str().to_string(),
        owner_user_id: attachment.owner_user_id.clone(),
    };
    best_effort(
        "attachment_ingest",
        state.ingestor.ingest(&attachment.storage_path, &metadata).await,
    );

    Ok(Json(attachment))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::invalid_input(format!("malformed multipart body: {}", e))
}

/// Image detection for captioning: declared content type first, filename
/// extension as a fallback for clients that send `application/octet-stream`.
fn is_image(attachment: &Attachment) -> bool {
    if let Some(content_type) = attachment.content_type.as_deref() {
        if content_type.starts_with("image/") {
            return true;
        }
    }
    attachment
        .filename
        .rsplit('.')
        .next()
        .map(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp"
            )
        })
        .unwrap_or(false)
}

// ============================================================================
// LIST / DOWNLOAD / DELETE
// ============================================================================

/// GET /attachments - Attachments visible to the caller, newest first
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/attachments",
    tag = "Attachments",
    params(ListAttachmentsQuery),
    responses(
        (status = 200, description = "System attachments plus the caller's own", body = [Attachment]),
    ),
))]
pub async fn list_attachments(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    Query(query): Query<ListAttachmentsQuery>,
) -> ApiResult<Json<Vec<Attachment>>> {
    let limit = query.limit.clamp(1, 200);
    let attachments = state
        .store
        .list_attachments_for_user(&identity.user_id, limit)
        .await?;
    Ok(Json(attachments))
}

/// GET /attachments/{id}/raw - Download the original bytes
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/attachments/{id}/raw",
    tag = "Attachments",
    params(("id" = String, Path, description = "Attachment id")),
    responses(
        (status = 200, description = "The stored file"),
        (status = 403, description = "Not allowed to access this attachment"),
        (status = 404, description = "Unknown attachment or missing blob"),
    ),
))]
pub async fn download_attachment(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let attachment = state
        .store
        .get_attachment(&id)
        .await?
        .ok_or_else(|| ApiError::attachment_not_found(&id))?;
    authorize_attachment_read(&identity, &attachment, state.admin_group())?;

    // Metadata without a blob is treated as not found; the row may outlive
    // the file when a delete was interrupted.
    let reader = state
        .files
        .open_stream(&attachment.storage_path)
        .await
        .map_err(|e| {
            tracing::warn!(attachment_id = %id, error = %e, "attachment blob unreadable");
            ApiError::attachment_not_found(&id)
        })?;

    let content_type = attachment
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream")
        .to_string();
    let disposition = format!("attachment; filename=\"{}\"", attachment.filename);
    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(reader))).into_response())
}

/// DELETE /attachments/{id} - Remove an attachment and its blob
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/attachments/{id}",
    tag = "Attachments",
    params(("id" = String, Path, description = "Attachment id")),
    responses(
        (status = 200, description = "Deleted attachment metadata", body = Attachment),
        (status = 403, description = "Not allowed to delete this attachment"),
        (status = 404, description = "Unknown attachment"),
    ),
))]
pub async fn delete_attachment(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    Path(id): Path<String>,
) -> ApiResult<Json<Attachment>> {
    let attachment = state
        .store
        .get_attachment(&id)
        .await?
        .ok_or_else(|| ApiError::attachment_not_found(&id))?;
    authorize_attachment_delete(&identity, &attachment, state.admin_group())?;

    let deleted = state
        .store
        .delete_attachment(&id)
        .await?
        .ok_or_else(|| ApiError::attachment_not_found(&id))?;
    // The row is gone; an orphaned blob only wastes disk.
    best_effort(
        "attachment_blob_delete",
        state.files.delete(&deleted.storage_path).await,
    );
    Ok(Json(deleted))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create attachment router (requires auth middleware)
pub fn create_router(state: AppState) -> Router {
    // Let the full upload through the framework limit; the cap itself is
    // enforced in the handler so oversized files get the protocol 413.
    let body_limit = DefaultBodyLimit::max(state.files_config.max_upload_bytes() + 64 * 1024);
    Router::new()
        .route("/", post(upload_attachment).get(list_attachments))
        .route("/:id", delete(delete_attachment))
        .route("/:id/raw", get(download_attachment))
        .layer(body_limit)
        .with_state(state)
}
