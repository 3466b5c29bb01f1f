use crate::config::{AppConfig, StorageBackend};
use crate::services::storage::{MemoryObjectStorage, ObjectStorage, S3ObjectStorage};
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    match config.storage_backend {
        StorageBackend::Memory => {
            warn!("🧪 In-memory storage selected: uploaded objects are lost on restart");
            Ok(Arc::new(MemoryObjectStorage::new(
                config.public_base_url.clone(),
            )))
        }
        StorageBackend::S3 => Ok(Arc::new(setup_s3(config).await?)),
    }
}

async fn setup_s3(config: &AppConfig) -> anyhow::Result<S3ObjectStorage> {
    let bucket = config.s3_bucket.clone();

    info!(
        "☁️  S3 Storage: {} (Bucket: {})",
        config.s3_endpoint.as_deref().unwrap_or("aws"),
        bucket
    );

    let mut loader = aws_config::from_env().region(Region::new(config.s3_region.clone()));
    if let Some(endpoint_url) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint_url);
    }
    if let (Some(access_key), Some(secret_key)) = (&config.s3_access_key, &config.s3_secret_key) {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }
    let aws_config = loader.load().await;

    // Path-style addressing is what MinIO and most self-hosted stores expect
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.s3_endpoint.is_some())
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            s3_client
                .create_bucket()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create bucket '{}': {}", bucket, e))?;
            info!("✅ Bucket '{}' created successfully", bucket);
        }
    }

    Ok(S3ObjectStorage::new(
        s3_client,
        bucket,
        config.public_base_url.clone(),
    ))
}
