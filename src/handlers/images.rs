//! Image handlers: list, upload, retitle and delete.
//!
//! Upload runs as a pipeline: the multipart body is streamed into the
//! staging directory (type and size checked as bytes arrive), the staged
//! file is published to the media host, the staged copy is removed, and
//! only then is the record inserted.

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use garde::Validate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::errors::GalleryError;
use crate::metadata::store::{title_or_default, ImageRecord};
use crate::metrics::{IMAGES_DELETED_TOTAL, IMAGES_UPLOADED_TOTAL};
use crate::upload::{StagedFile, UploadRejection, UploadStaging};
use crate::AppState;

/// Multipart form accepted by the upload endpoint.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// The image file (jpeg, jpg, png or gif).
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    /// Optional title. Defaults to "Untitled".
    title: Option<String>,
}

/// Body of `PUT /api/images/{id}`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateImageRequest {
    #[serde(default)]
    #[garde(custom(not_blank))]
    pub title: String,
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("Title is required"));
    }
    Ok(())
}

/// Plain confirmation body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn multipart_error(err: MultipartError, limit: u64) -> GalleryError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadRejection::TooLarge { limit }.into()
    } else {
        GalleryError::validation(err.body_text())
    }
}

/// `GET /api/images` -- every image, newest first.
#[utoipa::path(
    get,
    path = "/api/images",
    tag = "Images",
    operation_id = "ListImages",
    responses(
        (status = 200, description = "All images, newest first", body = Vec<ImageRecord>),
        (status = 500, description = "Internal error")
    )
)]
pub async fn list_images(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImageRecord>>, GalleryError> {
    let images = state.metadata.list_images().await?;
    Ok(Json(images))
}

/// Fields collected from the upload form.
struct UploadFields {
    staged: Option<StagedFile>,
    title: Option<String>,
}

/// Drain the multipart body, streaming the `file` field into staging.
///
/// On any error the partially or fully staged file is removed.
async fn read_upload_form(
    staging: &UploadStaging,
    multipart: &mut Multipart,
) -> Result<UploadFields, GalleryError> {
    let mut fields = UploadFields {
        staged: None,
        title: None,
    };
    let result = collect_fields(staging, multipart, &mut fields).await;
    if result.is_err() {
        if let Some(staged) = fields.staged.take() {
            if let Err(e) = staged.remove().await {
                warn!("Failed to remove staged file {:?}: {e}", staged.path);
            }
        }
    }
    result.map(|()| fields)
}

async fn collect_fields(
    staging: &UploadStaging,
    multipart: &mut Multipart,
    fields: &mut UploadFields,
) -> Result<(), GalleryError> {
    let limit = staging.max_file_size();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") if fields.staged.is_none() => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let mut writer = staging.begin(&file_name, &content_type).await?;
                loop {
                    match field.chunk().await {
                        Ok(Some(chunk)) => {
                            if let Err(e) = writer.write_chunk(&chunk).await {
                                writer.discard().await;
                                return Err(e.into());
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            writer.discard().await;
                            return Err(multipart_error(e, limit));
                        }
                    }
                }
                fields.staged = Some(writer.finish().await?);
            }
            Some("title") => {
                fields.title = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }
    Ok(())
}

/// `POST /api/images/upload` -- publish an image and record it. Admin only.
#[utoipa::path(
    post,
    path = "/api/images/upload",
    tag = "Images",
    operation_id = "UploadImage",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Image uploaded", body = ImageRecord),
        (status = 400, description = "Missing file, wrong type or too large"),
        (status = 401, description = "No token"),
        (status = 403, description = "Invalid token or not an admin"),
        (status = 500, description = "Media host or storage failure")
    )
)]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageRecord>, GalleryError> {
    let mut multipart = multipart.map_err(|e| GalleryError::validation(e.body_text()))?;
    let fields = read_upload_form(&state.staging, &mut multipart).await?;
    let staged = fields.staged.ok_or(UploadRejection::MissingFile)?;

    let remote = match state
        .media
        .upload(&staged.path, &staged.original_name, &staged.content_type)
        .await
    {
        Ok(remote) => remote,
        Err(e) => {
            // The staged copy stays behind; nothing sweeps it.
            warn!(
                "Media upload failed, staged file left at {:?}: {e:#}",
                staged.path
            );
            return Err(e.into());
        }
    };

    if let Err(e) = staged.remove().await {
        warn!("Failed to remove staged file {:?}: {e}", staged.path);
    }

    let title = title_or_default(fields.title.as_deref());
    let record = state
        .metadata
        .insert_image(&title, &remote.url, &remote.public_id)
        .await
        .map_err(|e| {
            error!(
                "Image record insert failed; remote object {} is orphaned",
                remote.public_id
            );
            e
        })?;

    counter!(IMAGES_UPLOADED_TOTAL).increment(1);
    info!(
        id = %record.id,
        size = staged.size,
        uploaded_by = %identity.email,
        "Image uploaded"
    );
    Ok(Json(record))
}

/// `PUT /api/images/{id}` -- change an image's title. Admin only.
#[utoipa::path(
    put,
    path = "/api/images/{id}",
    tag = "Images",
    operation_id = "UpdateImage",
    params(("id" = String, Path, description = "Image id")),
    request_body = UpdateImageRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated image", body = ImageRecord),
        (status = 400, description = "Missing or blank title"),
        (status = 401, description = "No token"),
        (status = 403, description = "Invalid token or not an admin"),
        (status = 404, description = "No such image")
    )
)]
pub async fn update_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateImageRequest>, JsonRejection>,
) -> Result<Json<ImageRecord>, GalleryError> {
    let Json(req) = payload.map_err(|e| GalleryError::validation(e.body_text()))?;
    req.validate()
        .map_err(|report| GalleryError::validation(report.to_string()))?;

    let record = state
        .metadata
        .update_image_title(&id, req.title.trim())
        .await?
        .ok_or(GalleryError::NotFound { resource: "Image" })?;
    Ok(Json(record))
}

/// `DELETE /api/images/{id}` -- remove the hosted object, then the record.
/// Admin only.
#[utoipa::path(
    delete,
    path = "/api/images/{id}",
    tag = "Images",
    operation_id = "DeleteImage",
    params(("id" = String, Path, description = "Image id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Image deleted", body = MessageResponse),
        (status = 401, description = "No token"),
        (status = 403, description = "Invalid token or not an admin"),
        (status = 404, description = "No such image"),
        (status = 500, description = "Media host or storage failure")
    )
)]
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, GalleryError> {
    let image = state
        .metadata
        .find_image(&id)
        .await?
        .ok_or(GalleryError::NotFound { resource: "Image" })?;

    // A failed remote delete keeps the record so the delete can be retried.
    if !image.remote_object_id.is_empty() {
        state.media.delete(&image.remote_object_id).await?;
    }

    state
        .metadata
        .delete_image(&id)
        .await?
        .ok_or(GalleryError::NotFound { resource: "Image" })?;

    counter!(IMAGES_DELETED_TOTAL).increment(1);
    info!(id = %id, "Image deleted");
    Ok(Json(MessageResponse {
        message: "Image deleted successfully".to_string(),
    }))
}
