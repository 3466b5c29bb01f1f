use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use dashmap::DashMap;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::utils::keys;

/// Size of each multipart chunk sent to S3. Above the 5 MiB minimum part size.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Byte stream handed to a storage backend. Consumed until EOF.
pub type ContentStream<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

/// Where an object ended up after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
}

/// Object store capability used by the upload path.
///
/// `put_stream` is the only write; `delete` exists so that a failed database
/// insert can take back an object that was already written.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_stream<'a>(
        &self,
        key: &str,
        content_type: &str,
        reader: ContentStream<'a>,
    ) -> Result<StoredObject>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Public URL for `key`. Does not check that the object exists.
    fn public_url(&self, key: &str) -> String;
}

pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStorage {
    pub fn new(client: Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    async fn upload_parts<R>(
        &self,
        key: &str,
        upload_id: &str,
        reader: &mut R,
        mut buffer: Vec<u8>,
        mut filled: usize,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut part_number = 1;
        let mut completed_parts = Vec::new();
        let mut total_size: u64 = 0;

        while filled > 0 {
            total_size += filled as u64;
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer[..filled].to_vec()))
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            part_number += 1;
            filled = fill_buffer(reader, &mut buffer).await?;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(total_size)
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn put_stream<'a>(
        &self,
        key: &str,
        content_type: &str,
        mut reader: ContentStream<'a>,
    ) -> Result<StoredObject> {
        let mut buffer = vec![0u8; PART_SIZE];
        let filled = fill_buffer(&mut reader, &mut buffer).await?;

        // Small objects (including empty ones) fit in a single request
        if filled < PART_SIZE {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(buffer[..filled].to_vec()))
                .send()
                .await?;

            return Ok(StoredObject {
                key: key.to_string(),
                url: self.public_url(key),
                size: filled as u64,
            });
        }

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?
            .to_string();

        match self
            .upload_parts(key, &upload_id, &mut reader, buffer, filled)
            .await
        {
            Ok(size) => Ok(StoredObject {
                key: key.to_string(),
                url: self.public_url(key),
                size,
            }),
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "Failed to abort multipart upload {} for {}: {}",
                        upload_id,
                        key,
                        abort_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        keys::remote_url(&self.public_base_url, key)
    }
}

/// An object held by [`MemoryObjectStorage`]
#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub content_type: String,
    pub data: Bytes,
}

/// Process-local object store. Backs the `memory` storage backend and tests.
pub struct MemoryObjectStorage {
    objects: DashMap<String, MemoryObject>,
    public_base_url: String,
}

impl MemoryObjectStorage {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn get(&self, key: &str) -> Option<MemoryObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put_stream<'a>(
        &self,
        key: &str,
        content_type: &str,
        mut reader: ContentStream<'a>,
    ) -> Result<StoredObject> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let size = data.len() as u64;

        self.objects.insert(
            key.to_string(),
            MemoryObject {
                content_type: content_type.to_string(),
                data: Bytes::from(data),
            },
        );

        Ok(StoredObject {
            key: key.to_string(),
            url: self.public_url(key),
            size,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        keys::remote_url(&self.public_base_url, key)
    }
}

/// Reads until `buffer` is full or the reader hits EOF. Returns the bytes read.
async fn fill_buffer<R>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
