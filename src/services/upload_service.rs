use crate::config::AppConfig;
use crate::entities::{prelude::*, uploads};
use crate::services::storage::{ContentStream, ObjectStorage};
use crate::utils::keys;
use crate::utils::validation::{UploadMetadata, ValidationError};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryOrder, Set,
    SqlErr,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("File exceeds the maximum allowed size of {max} bytes")]
    PayloadTooLarge { max: u64 },

    #[error("Remote key already exists: {0}")]
    Conflict(String),

    #[error("Upload not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Input of [`UploadService::upload_image`]
pub struct UploadImageInput<'a> {
    pub file_name: String,
    pub content_type: String,
    pub content_stream: ContentStream<'a>,
}

pub struct UploadService {
    db: DatabaseConnection,
    storage: Arc<dyn ObjectStorage>,
    config: AppConfig,
}

impl UploadService {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn ObjectStorage>, config: AppConfig) -> Self {
        Self {
            db,
            storage,
            config,
        }
    }

    /// Streams the content to the object store, then records the upload.
    ///
    /// Metadata is validated before the stream is touched. The row is only
    /// inserted once the object write succeeded; if the insert fails the
    /// object is deleted again.
    pub async fn upload_image(
        &self,
        input: UploadImageInput<'_>,
    ) -> Result<uploads::Model, UploadError> {
        let UploadImageInput {
            file_name,
            content_type,
            content_stream,
        } = input;

        let metadata = UploadMetadata::new(&file_name, &content_type)
            .check(&self.config.allowed_content_types)?;

        let id = Uuid::new_v4().to_string();
        let key = keys::remote_key(&id, &metadata.file_name);

        // One byte past the limit is enough to tell an oversize stream apart
        let max = self.config.max_file_size;
        let limited = content_stream.take(max.saturating_add(1));

        let stored = self
            .storage
            .put_stream(&key, metadata.content_type.essence_str(), Box::pin(limited))
            .await
            .map_err(UploadError::Storage)?;

        if stored.size > max {
            warn!("Upload {} rejected: stream exceeds {} bytes", key, max);
            self.discard_object(&stored.key).await;
            return Err(UploadError::PayloadTooLarge { max });
        }

        let record = uploads::ActiveModel {
            id: Set(id),
            name: Set(metadata.file_name),
            remote_key: Set(stored.key.clone()),
            remote_url: Set(stored.url.clone()),
            ..Default::default()
        };

        match record.insert(&self.db).await {
            Ok(upload) => {
                info!(
                    "📦 Stored upload {} ({} bytes) at {}",
                    upload.id, stored.size, upload.remote_key
                );
                Ok(upload)
            }
            Err(e) => {
                self.discard_object(&stored.key).await;
                match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        Err(UploadError::Conflict(stored.key))
                    }
                    _ => Err(UploadError::Database(e)),
                }
            }
        }
    }

    pub async fn get_upload(&self, id: &str) -> Result<uploads::Model, UploadError> {
        Uploads::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| UploadError::NotFound(id.to_string()))
    }

    /// Newest first. `page` starts at 1; `per_page` is clamped to 1..=100.
    pub async fn list_uploads(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Vec<uploads::Model>, UploadError> {
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);

        let uploads = Uploads::find()
            .order_by_desc(uploads::Column::CreatedAt)
            .order_by_desc(uploads::Column::Id)
            .paginate(&self.db, per_page)
            .fetch_page(page.saturating_sub(1))
            .await?;

        Ok(uploads)
    }

    async fn discard_object(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            warn!("Failed to delete orphaned object {}: {:#}", key, e);
        }
    }
}
