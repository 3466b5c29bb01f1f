use crate::AppState;
use crate::api::error::AppError;
use crate::entities::uploads;
use crate::services::upload_service::{DEFAULT_PAGE_SIZE, UploadImageInput};
use axum::{
    Json,
    extract::{
        Multipart,
        Path,
        Query,
        State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::io::StreamReader;
use utoipa::{IntoParams, ToSchema};

/// Multipart field carrying the file
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
    pub remote_key: String,
    pub remote_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<uploads::Model> for UploadResponse {
    fn from(model: uploads::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            remote_key: model.remote_key,
            remote_url: model.remote_url,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUploadsQuery {
    /// Page number, starting at 1
    pub page: Option<u64>,
    /// Items per page (1-100, default 20)
    pub per_page: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/uploads",
    request_body(content = Multipart, description = "Multipart form with a single `file` part"),
    responses(
        (status = 201, description = "File uploaded successfully", body = UploadResponse),
        (status = 400, description = "Invalid file name, content type or multipart body"),
        (status = 409, description = "Remote key already in use"),
        (status = 413, description = "File too large")
    ),
    tag = "uploads"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut multipart = multipart?;
    // Set when the body limit cuts the file stream, which the service only sees as an io error
    let body_limit_hit = AtomicBool::new(false);

    let result: Result<uploads::Model, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some(FILE_FIELD) {
                continue;
            }

            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref())
                .to_string();

            let reader = StreamReader::new(field.map_err(|e| {
                if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    body_limit_hit.store(true, Ordering::Relaxed);
                }
                std::io::Error::other(e)
            }));

            let upload = state
                .upload_service
                .upload_image(UploadImageInput {
                    file_name,
                    content_type,
                    content_stream: Box::pin(reader),
                })
                .await
                .map_err(|e| {
                    if body_limit_hit.load(Ordering::Relaxed) {
                        payload_too_large()
                    } else {
                        AppError::from(e)
                    }
                })?;

            return Ok(upload);
        }

        Err(AppError::BadRequest("No file provided".to_string()))
    }
    .await;

    match result {
        Ok(upload) => Ok((StatusCode::CREATED, Json(upload.into()))),
        Err(e) => {
            // Drain what is left so the client sees our response instead of a reset
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/uploads",
    params(ListUploadsQuery),
    responses(
        (status = 200, description = "Uploads, newest first", body = Vec<UploadResponse>)
    ),
    tag = "uploads"
)]
pub async fn list_uploads(
    State(state): State<AppState>,
    query: Result<Query<ListUploadsQuery>, QueryRejection>,
) -> Result<Json<Vec<UploadResponse>>, AppError> {
    let Query(query) = query?;
    let uploads = state
        .upload_service
        .list_uploads(
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(uploads.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/uploads/{id}",
    params(
        ("id" = String, Path, description = "Upload ID")
    ),
    responses(
        (status = 200, description = "Upload record", body = UploadResponse),
        (status = 404, description = "Upload not found")
    ),
    tag = "uploads"
)]
pub async fn get_upload(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Path(id) = id?;
    let upload = state.upload_service.get_upload(&id).await?;
    Ok(Json(upload.into()))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large()
    } else {
        AppError::BadRequest(e.body_text())
    }
}

fn payload_too_large() -> AppError {
    AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
}
