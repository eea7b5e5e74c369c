//! In-process `Drive` backend.
//!
//! Nothing survives a restart. Used for throwaway demo deployments
//! (`--in-memory`) and by the router tests.

use crate::{
    models::file::StoredObject,
    services::drive::{ByteStream, Drive, DriveError, DriveFile, DriveResult, ensure_key_safe},
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::TryStreamExt;
use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct PendingUpload {
    key: String,
    content_type: Option<String>,
    parts: BTreeMap<u32, Bytes>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, (StoredObject, Bytes)>,
    uploads: HashMap<String, PendingUpload>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryDrive {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn open_uploads(&self) -> usize {
        self.inner.read().await.uploads.len()
    }

    async fn store(&self, key: &str, content_type: Option<String>, data: Bytes) -> StoredObject {
        let mut inner = self.inner.write().await;
        let id = inner
            .objects
            .get(key)
            .map(|(existing, _)| existing.id)
            .unwrap_or_else(Uuid::new_v4);
        let object = StoredObject {
            id,
            key: key.to_string(),
            content_type,
            size_bytes: data.len() as i64,
            etag: Some(format!("{:x}", md5::compute(&data))),
            last_modified: Utc::now(),
        };
        inner
            .objects
            .insert(key.to_string(), (object.clone(), data));
        debug!("stored {} ({} bytes) in memory", key, object.size_bytes);
        object
    }
}

#[async_trait]
impl Drive for MemoryDrive {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> DriveResult<()> {
        Ok(())
    }

    async fn put<'a>(
        &self,
        key: &str,
        content_type: Option<String>,
        body: ByteStream<'a>,
    ) -> DriveResult<StoredObject> {
        ensure_key_safe(key)?;
        let data = body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(self.store(key, content_type, data.freeze()).await)
    }

    async fn get(&self, key: &str) -> DriveResult<Option<DriveFile>> {
        ensure_key_safe(key)?;
        let inner = self.inner.read().await;
        Ok(inner.objects.get(key).map(|(object, data)| DriveFile {
            object: object.clone(),
            reader: Box::pin(Cursor::new(data.clone())),
        }))
    }

    async fn list(&self) -> DriveResult<Vec<String>> {
        Ok(self.inner.read().await.objects.keys().cloned().collect())
    }

    async fn delete(&self, key: &str) -> DriveResult<()> {
        ensure_key_safe(key)?;
        self.inner.write().await.objects.remove(key);
        Ok(())
    }

    async fn start_upload(&self, key: &str, content_type: Option<String>) -> DriveResult<String> {
        ensure_key_safe(key)?;
        let upload_id = Uuid::new_v4().simple().to_string();
        self.inner.write().await.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type,
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> DriveResult<()> {
        let mut inner = self.inner.write().await;
        match inner.uploads.get_mut(upload_id) {
            Some(upload) if upload.key == key => {
                upload.parts.insert(part_number, data);
                Ok(())
            }
            _ => Err(DriveError::UploadNotFound {
                key: key.to_string(),
                upload_id: upload_id.to_string(),
            }),
        }
    }

    async fn finish_upload(&self, key: &str, upload_id: &str) -> DriveResult<StoredObject> {
        let upload = {
            let mut inner = self.inner.write().await;
            match inner.uploads.remove(upload_id) {
                Some(upload) if upload.key == key => upload,
                Some(other) => {
                    inner.uploads.insert(upload_id.to_string(), other);
                    return Err(DriveError::UploadNotFound {
                        key: key.to_string(),
                        upload_id: upload_id.to_string(),
                    });
                }
                None => {
                    return Err(DriveError::UploadNotFound {
                        key: key.to_string(),
                        upload_id: upload_id.to_string(),
                    });
                }
            }
        };

        let mut data = BytesMut::new();
        for part in upload.parts.values() {
            data.extend_from_slice(part);
        }
        Ok(self.store(key, upload.content_type, data.freeze()).await)
    }

    async fn abort_upload(&self, key: &str, upload_id: &str) -> DriveResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .uploads
            .get(upload_id)
            .is_some_and(|upload| upload.key == key)
        {
            inner.uploads.remove(upload_id);
            debug!("aborted upload {} for {}", upload_id, key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn chunked_upload_orders_parts_and_closes_session() {
        let drive = MemoryDrive::new();
        let id = drive.start_upload("private/x", None).await.unwrap();
        drive
            .upload_part("private/x", &id, 2, Bytes::from_static(b"b"))
            .await
            .unwrap();
        drive
            .upload_part("private/x", &id, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();
        let object = drive.finish_upload("private/x", &id).await.unwrap();
        assert_eq!(object.size_bytes, 2);

        let mut file = drive.get("private/x").await.unwrap().unwrap();
        let mut out = Vec::new();
        file.reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ab");
        assert!(drive.finish_upload("private/x", &id).await.is_err());
    }

    #[tokio::test]
    async fn abort_discards_only_a_matching_session() {
        let drive = MemoryDrive::new();
        let id = drive.start_upload("public/a", None).await.unwrap();
        drive
            .upload_part("public/a", &id, 1, Bytes::from_static(b"x"))
            .await
            .unwrap();

        drive.abort_upload("public/b", &id).await.unwrap();
        assert_eq!(drive.open_uploads().await, 1);

        drive.abort_upload("public/a", &id).await.unwrap();
        assert_eq!(drive.open_uploads().await, 0);
        assert!(drive.finish_upload("public/a", &id).await.is_err());
        drive.abort_upload("public/a", &id).await.unwrap();
    }

    #[tokio::test]
    async fn put_collects_every_chunk() {
        let drive = MemoryDrive::new();
        let body: ByteStream<'static> = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"foo")),
            Ok(Bytes::from_static(b"bar")),
        ]));
        let object = drive.put("public/f", None, body).await.unwrap();
        assert_eq!(object.size_bytes, 6);
        assert_eq!(drive.list().await.unwrap(), vec!["public/f"]);
    }
}
