mod common;

use async_trait::async_trait;
use common::{UploadOverrides, make_upload, setup_test_db};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use upload_server::config::AppConfig;
use upload_server::entities::prelude::*;
use upload_server::services::storage::{
    ContentStream, MemoryObjectStorage, ObjectStorage, StoredObject,
};
use upload_server::services::upload_service::{UploadError, UploadImageInput, UploadService};

const PUBLIC_BASE_URL: &str = "https://cdn.example.com/bucket";

fn test_config() -> AppConfig {
    AppConfig {
        public_base_url: PUBLIC_BASE_URL.to_string(),
        ..AppConfig::development()
    }
}

async fn setup_service(
    config: AppConfig,
) -> (UploadService, Arc<MemoryObjectStorage>, DatabaseConnection) {
    let db = setup_test_db().await;
    let storage = Arc::new(MemoryObjectStorage::new(PUBLIC_BASE_URL));
    let service = UploadService::new(db.clone(), storage.clone(), config);
    (service, storage, db)
}

fn input(file_name: &str, content_type: &str, data: &'static [u8]) -> UploadImageInput<'static> {
    UploadImageInput {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        content_stream: Box::pin(data),
    }
}

/// Reader that records whether anyone tried to read from it
struct TrackingReader {
    touched: Arc<AtomicBool>,
}

impl AsyncRead for TrackingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.touched.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Storage whose writes always fail
struct FailingStorage;

#[async_trait]
impl ObjectStorage for FailingStorage {
    async fn put_stream<'a>(
        &self,
        _key: &str,
        _content_type: &str,
        _reader: ContentStream<'a>,
    ) -> anyhow::Result<StoredObject> {
        Err(anyhow::anyhow!("bucket unavailable"))
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", PUBLIC_BASE_URL, key)
    }
}

/// Storage that ignores the requested key and always reports the same one
struct FixedKeyStorage {
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStorage for FixedKeyStorage {
    async fn put_stream<'a>(
        &self,
        _key: &str,
        _content_type: &str,
        mut reader: ContentStream<'a>,
    ) -> anyhow::Result<StoredObject> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(StoredObject {
            key: "images/fixed.png".to_string(),
            url: self.public_url("images/fixed.png"),
            size: data.len() as u64,
        })
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", PUBLIC_BASE_URL, key)
    }
}

#[tokio::test]
async fn test_upload_image_stores_object_and_row() {
    let (service, storage, db) = setup_service(test_config()).await;

    let upload = service
        .upload_image(input("cat.png", "image/png", b"\x89PNG fake pixels"))
        .await
        .unwrap();

    assert_eq!(upload.name, "cat.png");
    assert_eq!(upload.remote_key, format!("images/{}-cat.png", upload.id));
    assert_eq!(
        upload.remote_url,
        format!("{}/images/{}-cat.png", PUBLIC_BASE_URL, upload.id)
    );

    let object = storage.get(&upload.remote_key).unwrap();
    assert_eq!(&object.data[..], b"\x89PNG fake pixels");
    assert_eq!(object.content_type, "image/png");
    assert_eq!(storage.len(), 1);

    let stored = Uploads::find_by_id(upload.id.clone())
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, upload);
}

#[tokio::test]
async fn test_same_name_uploads_get_distinct_keys() {
    let (service, storage, _db) = setup_service(test_config()).await;

    let first = service
        .upload_image(input("same.png", "image/png", b"one"))
        .await
        .unwrap();
    let second = service
        .upload_image(input("same.png", "image/png", b"two"))
        .await
        .unwrap();

    assert_ne!(first.remote_key, second.remote_key);
    assert_eq!(storage.len(), 2);
}

#[tokio::test]
async fn test_invalid_metadata_is_rejected_before_reading_stream() {
    // 255 characters, far more than 255 bytes
    let multibyte_name = format!("{}.png", "😀".repeat(251));
    let cases = [
        ("", "image/png"),
        ("../../etc/passwd", "image/png"),
        (multibyte_name.as_str(), "image/png"),
        ("cat.png", "not a content type"),
        ("report.pdf", "application/pdf"),
    ];

    for (file_name, content_type) in cases {
        let (service, storage, db) = setup_service(test_config()).await;
        let touched = Arc::new(AtomicBool::new(false));

        let result = service
            .upload_image(UploadImageInput {
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
                content_stream: Box::pin(TrackingReader {
                    touched: touched.clone(),
                }),
            })
            .await;

        assert!(
            matches!(result, Err(UploadError::Validation(_))),
            "expected validation error for ({:?}, {:?})",
            file_name,
            content_type
        );
        assert!(!touched.load(Ordering::SeqCst));
        assert!(storage.is_empty());
        assert_eq!(Uploads::find().count(&db).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_storage_failure_leaves_no_row() {
    let db = setup_test_db().await;
    let service = UploadService::new(db.clone(), Arc::new(FailingStorage), test_config());

    let result = service
        .upload_image(input("cat.png", "image/png", b"pixels"))
        .await;

    assert!(matches!(result, Err(UploadError::Storage(_))));
    assert_eq!(Uploads::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversize_stream_leaves_no_row_and_no_object() {
    let config = AppConfig {
        max_file_size: 4,
        ..test_config()
    };
    let (service, storage, db) = setup_service(config).await;

    let result = service
        .upload_image(input("big.png", "image/png", b"0123456789"))
        .await;

    assert!(matches!(
        result,
        Err(UploadError::PayloadTooLarge { max: 4 })
    ));
    assert!(storage.is_empty());
    assert_eq!(Uploads::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stream_at_size_limit_is_accepted() {
    let config = AppConfig {
        max_file_size: 4,
        ..test_config()
    };
    let (service, storage, _db) = setup_service(config).await;

    let upload = service
        .upload_image(input("tiny.png", "image/png", b"0123"))
        .await
        .unwrap();

    assert_eq!(&storage.get(&upload.remote_key).unwrap().data[..], b"0123");
}

#[tokio::test]
async fn test_key_conflict_removes_the_stored_object() {
    let db = setup_test_db().await;
    let storage = Arc::new(FixedKeyStorage {
        deleted: Mutex::new(Vec::new()),
    });
    let service = UploadService::new(db.clone(), storage.clone(), test_config());

    service
        .upload_image(input("a.png", "image/png", b"a"))
        .await
        .unwrap();
    let result = service
        .upload_image(input("b.png", "image/png", b"b"))
        .await;

    match result {
        Err(UploadError::Conflict(key)) => assert_eq!(key, "images/fixed.png"),
        other => panic!("expected conflict, got {:?}", other.map(|u| u.id)),
    }
    assert_eq!(
        *storage.deleted.lock().unwrap(),
        vec!["images/fixed.png".to_string()]
    );
    assert_eq!(Uploads::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_get_upload() {
    let (service, _storage, db) = setup_service(test_config()).await;
    let created = make_upload(&db, UploadOverrides::default()).await.unwrap();

    let found = service.get_upload(&created.id).await.unwrap();
    assert_eq!(found, created);

    let missing = service.get_upload("does-not-exist").await;
    assert!(matches!(missing, Err(UploadError::NotFound(id)) if id == "does-not-exist"));
}

#[tokio::test]
async fn test_list_uploads_newest_first_and_paginated() {
    let (service, _storage, db) = setup_service(test_config()).await;
    let now = chrono::Utc::now();

    for days_ago in [3, 1, 2] {
        make_upload(
            &db,
            UploadOverrides {
                name: Some(format!("{}-days.png", days_ago)),
                created_at: Some(now - chrono::Duration::days(days_ago)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    let names: Vec<String> = service
        .list_uploads(1, 20)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.name)
        .collect();
    assert_eq!(names, vec!["1-days.png", "2-days.png", "3-days.png"]);

    let page_two = service.list_uploads(2, 2).await.unwrap();
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0].name, "3-days.png");

    // per_page of zero is clamped to one
    assert_eq!(service.list_uploads(1, 0).await.unwrap().len(), 1);
}
