//! Maps logical file names onto drive keys.
//!
//! Every file lives under `public/{name}` or `private/{name}`. This service is
//! the only place that builds those keys; handlers speak in visibility + name.

use crate::{
    auth::AdminUser,
    errors::AppError,
    models::file::{FileListing, StoredObject, Visibility},
    services::drive::{ByteStream, Drive, DriveFile},
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Downloads are emitted in chunks of this many bytes.
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024;

/// Upper bound on the bytes read from a single chunk-upload request.
pub const MAX_PART_SIZE: usize = 10 * 1024 * 1024;

/// One request of the chunked upload protocol.
#[derive(Debug, Clone)]
pub struct PartUpload {
    pub visibility: Visibility,
    pub name: String,
    pub part_number: u32,
    pub total_part_number: u32,
    /// Session ID from a previous response. Ignored on part 1.
    pub upload_id: Option<String>,
    pub content_type: Option<String>,
    pub chunk: Bytes,
}

#[derive(Clone)]
pub struct FileService {
    drive: Arc<dyn Drive>,
}

impl FileService {
    pub fn new(drive: Arc<dyn Drive>) -> Self {
        Self { drive }
    }

    pub fn drive(&self) -> &Arc<dyn Drive> {
        &self.drive
    }

    /// Store `body` as `name` in `visibility`, replacing any file of that name there.
    pub async fn upload(
        &self,
        user: &AdminUser,
        visibility: Visibility,
        name: &str,
        content_type: Option<String>,
        body: ByteStream<'_>,
    ) -> Result<StoredObject, AppError> {
        user.ensure_can_mutate()?;
        ensure_name_valid(name)?;
        let object = self
            .drive
            .put(&visibility.key(name), content_type, body)
            .await?;
        info!("uploaded {} ({} bytes)", object.key, object.size_bytes);
        Ok(object)
    }

    /// Every key in the drive, in the drive's order.
    pub async fn list_keys(&self) -> Result<Vec<String>, AppError> {
        Ok(self.drive.list().await?)
    }

    /// Keys split into the public and private namespaces.
    pub async fn listing(&self) -> Result<FileListing, AppError> {
        Ok(FileListing::from_keys(self.list_keys().await?))
    }

    /// Open `name` in `visibility` for streaming.
    pub async fn open(&self, visibility: Visibility, name: &str) -> Result<DriveFile, AppError> {
        ensure_name_valid(name)?;
        self.drive
            .get(&visibility.key(name))
            .await?
            .ok_or_else(|| AppError::not_found("File Not Found!"))
    }

    /// Remove `name` from `visibility`. Removing an absent file succeeds.
    pub async fn delete(
        &self,
        user: &AdminUser,
        visibility: Visibility,
        name: &str,
    ) -> Result<(), AppError> {
        user.ensure_can_mutate()?;
        ensure_name_valid(name)?;
        self.drive.delete(&visibility.key(name)).await?;
        info!("deleted {}", visibility.key(name));
        Ok(())
    }

    /// Forward one part of a chunked upload and return the session ID the
    /// caller must echo on the next part.
    ///
    /// Part 1 always opens a new session; the part equal to
    /// `total_part_number` closes it. The demo identity gets its session ID
    /// back without anything being stored.
    pub async fn upload_part(&self, user: &AdminUser, part: PartUpload) -> Result<String, AppError> {
        if user.is_demo() {
            debug!("ignoring part {} from demo identity", part.part_number);
            return Ok(part.upload_id.unwrap_or_default());
        }

        ensure_name_valid(&part.name)?;
        if part.part_number == 0 || part.part_number > part.total_part_number {
            return Err(AppError::bad_request(format!(
                "part_number {} is outside 1..={}",
                part.part_number, part.total_part_number
            )));
        }

        let key = part.visibility.key(&part.name);
        let upload_id = if part.part_number == 1 {
            self.drive.start_upload(&key, part.content_type).await?
        } else {
            part.upload_id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| AppError::bad_request("upload_id is required after part 1"))?
        };

        let size = part.chunk.len();
        let staged = self
            .drive
            .upload_part(&key, &upload_id, part.part_number, part.chunk)
            .await;
        if let Err(err) = staged {
            // Nobody holds the ID of a session whose first part failed.
            if part.part_number == 1 {
                if let Err(abort_err) = self.drive.abort_upload(&key, &upload_id).await {
                    warn!("failed to discard upload {}: {}", upload_id, abort_err);
                }
            }
            return Err(err.into());
        }
        debug!(
            "forwarded part {}/{} of {} ({} bytes)",
            part.part_number, part.total_part_number, key, size
        );

        if part.part_number == part.total_part_number {
            let object = self.drive.finish_upload(&key, &upload_id).await?;
            info!("completed chunked upload of {} ({} bytes)", key, object.size_bytes);
        }

        Ok(upload_id)
    }
}

/// File names are single path segments.
fn ensure_name_valid(name: &str) -> Result<(), AppError> {
    if name.is_empty() || name.contains('/') {
        return Err(AppError::bad_request(format!("invalid file name `{}`", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        drive::{DriveError, DriveResult},
        memory_drive::MemoryDrive,
    };
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    fn admin() -> AdminUser {
        AdminUser {
            username: "alice".into(),
        }
    }

    fn demo() -> AdminUser {
        AdminUser {
            username: "demo".into(),
        }
    }

    fn body(bytes: Vec<u8>) -> ByteStream<'static> {
        Box::pin(stream::iter(vec![Ok(Bytes::from(bytes))]))
    }

    async fn read(service: &FileService, visibility: Visibility, name: &str) -> Vec<u8> {
        let mut file = service.open(visibility, name).await.unwrap();
        let mut out = Vec::new();
        file.reader.read_to_end(&mut out).await.unwrap();
        out
    }

    /// Delegates to a [`MemoryDrive`] but refuses to stage any part.
    struct RejectingParts(MemoryDrive);

    #[async_trait]
    impl Drive for RejectingParts {
        fn backend(&self) -> &'static str {
            "rejecting"
        }

        async fn health_check(&self) -> DriveResult<()> {
            self.0.health_check().await
        }

        async fn put<'a>(
            &self,
            key: &str,
            content_type: Option<String>,
            body: ByteStream<'a>,
        ) -> DriveResult<StoredObject> {
            self.0.put(key, content_type, body).await
        }

        async fn get(&self, key: &str) -> DriveResult<Option<DriveFile>> {
            self.0.get(key).await
        }

        async fn list(&self) -> DriveResult<Vec<String>> {
            self.0.list().await
        }

        async fn delete(&self, key: &str) -> DriveResult<()> {
            self.0.delete(key).await
        }

        async fn start_upload(&self, key: &str, content_type: Option<String>) -> DriveResult<String> {
            self.0.start_upload(key, content_type).await
        }

        async fn upload_part(&self, _: &str, _: &str, _: u32, _: Bytes) -> DriveResult<()> {
            Err(DriveError::Io(std::io::Error::other("disk full")))
        }

        async fn finish_upload(&self, key: &str, upload_id: &str) -> DriveResult<StoredObject> {
            self.0.finish_upload(key, upload_id).await
        }

        async fn abort_upload(&self, key: &str, upload_id: &str) -> DriveResult<()> {
            self.0.abort_upload(key, upload_id).await
        }
    }

    fn part(n: u32, total: u32, upload_id: Option<String>, chunk: &'static [u8]) -> PartUpload {
        PartUpload {
            visibility: Visibility::Public,
            name: "video.mp4".into(),
            part_number: n,
            total_part_number: total,
            upload_id,
            content_type: Some("video/mp4".into()),
            chunk: Bytes::from_static(chunk),
        }
    }

    #[tokio::test]
    async fn private_report_lifecycle() {
        let service = FileService::new(Arc::new(MemoryDrive::new()));
        let content: Vec<u8> = (0..50u8).collect();

        service
            .upload(&admin(), Visibility::Private, "report.pdf", None, body(content.clone()))
            .await
            .unwrap();
        assert_eq!(read(&service, Visibility::Private, "report.pdf").await, content);

        let listing = service.listing().await.unwrap();
        assert_eq!(listing.private, vec!["private/report.pdf"]);
        assert!(listing.public.is_empty());

        service
            .delete(&admin(), Visibility::Private, "report.pdf")
            .await
            .unwrap();
        let err = service
            .open(Visibility::Private, "report.pdf")
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let service = FileService::new(Arc::new(MemoryDrive::new()));
        service
            .upload(&admin(), Visibility::Public, "a", None, body(b"pub".to_vec()))
            .await
            .unwrap();
        service
            .upload(&admin(), Visibility::Private, "a", None, body(b"priv".to_vec()))
            .await
            .unwrap();

        assert_eq!(read(&service, Visibility::Public, "a").await, b"pub");
        assert_eq!(read(&service, Visibility::Private, "a").await, b"priv");
    }

    #[tokio::test]
    async fn demo_identity_cannot_upload_or_delete() {
        let drive = Arc::new(MemoryDrive::new());
        let service = FileService::new(drive.clone());
        service
            .upload(&admin(), Visibility::Public, "keep", None, body(b"x".to_vec()))
            .await
            .unwrap();

        let err = service
            .upload(&demo(), Visibility::Public, "new", None, body(b"y".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_ACCEPTABLE);
        let err = service
            .delete(&demo(), Visibility::Public, "keep")
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_ACCEPTABLE);

        assert_eq!(drive.list().await.unwrap(), vec!["public/keep"]);
    }

    #[tokio::test]
    async fn chunked_upload_assembles_parts() {
        let service = FileService::new(Arc::new(MemoryDrive::new()));
        let id = service
            .upload_part(&admin(), part(1, 3, Some("ignored".into()), b"aa"))
            .await
            .unwrap();
        assert_ne!(id, "ignored");

        let same = service
            .upload_part(&admin(), part(2, 3, Some(id.clone()), b"bb"))
            .await
            .unwrap();
        assert_eq!(same, id);
        service
            .upload_part(&admin(), part(3, 3, Some(id.clone()), b"cc"))
            .await
            .unwrap();

        assert_eq!(read(&service, Visibility::Public, "video.mp4").await, b"aabbcc");
        let file = service.open(Visibility::Public, "video.mp4").await.unwrap();
        assert_eq!(file.object.content_type.as_deref(), Some("video/mp4"));
    }

    #[tokio::test]
    async fn single_part_upload_opens_and_closes_session() {
        let service = FileService::new(Arc::new(MemoryDrive::new()));
        service
            .upload_part(&admin(), part(1, 1, None, b"whole"))
            .await
            .unwrap();
        assert_eq!(read(&service, Visibility::Public, "video.mp4").await, b"whole");
    }

    #[tokio::test]
    async fn demo_chunk_upload_is_silent_no_op() {
        let drive = Arc::new(MemoryDrive::new());
        let service = FileService::new(drive.clone());
        let id = service
            .upload_part(&demo(), part(2, 2, Some("abc".into()), b"zz"))
            .await
            .unwrap();
        assert_eq!(id, "abc");
        assert!(drive.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_part_requires_upload_id() {
        let service = FileService::new(Arc::new(MemoryDrive::new()));
        let err = service
            .upload_part(&admin(), part(2, 2, None, b"zz"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = service
            .upload_part(&admin(), part(3, 2, Some("x".into()), b"zz"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_first_part_discards_its_session() {
        let memory = MemoryDrive::new();
        let service = FileService::new(Arc::new(RejectingParts(memory.clone())));

        let err = service
            .upload_part(&admin(), part(1, 3, None, b"aa"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(memory.open_uploads().await, 0);
    }

    #[tokio::test]
    async fn names_with_slashes_are_rejected() {
        let service = FileService::new(Arc::new(MemoryDrive::new()));
        let err = service
            .upload(&admin(), Visibility::Public, "a/b", None, body(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
