//! src/services/disk_drive.rs
//!
//! DiskDrive — the durable `Drive` backend. Object metadata and chunked upload
//! sessions live in SQLite; payloads live on local disk, sharded beneath
//! `base_path/{shard}/{shard}/{key}`. Staged upload parts live beneath
//! `base_path/.uploads/{upload_id}/`.

use crate::{
    models::{
        file::StoredObject,
        multipart::{MultipartPart, MultipartUpload},
    },
    services::drive::{ByteStream, Drive, DriveError, DriveFile, DriveResult, ensure_key_safe},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");
const STAGING_DIR: &str = ".uploads";

/// DiskDrive provides the drive operations on top of SQLite and the local filesystem:
/// - Put (streams bytes to disk and upserts metadata)
/// - Get (reads metadata from SQLite and opens the payload)
/// - List / Delete
/// - Chunked uploads (parts staged on disk, concatenated on finish)
#[derive(Clone)]
pub struct DiskDrive {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
}

impl DiskDrive {
    /// Create a new DiskDrive backed by the provided SQLite pool and
    /// using `base_path` as the root directory for payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> DriveResult<()> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Generate two-level shard identifiers for a key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct the payload path for a key. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(STAGING_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: i64) -> PathBuf {
        self.staging_dir(upload_id).join(format!("{:05}", part_number))
    }

    async fn fetch_object(&self, key: &str) -> DriveResult<Option<StoredObject>> {
        let object = sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, content_type, size_bytes, etag, last_modified
             FROM files WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(object)
    }

    /// Fetch an open upload session, checking it was opened for `key`.
    async fn fetch_upload(&self, key: &str, upload_id: &str) -> DriveResult<MultipartUpload> {
        let upload = sqlx::query_as::<_, MultipartUpload>(
            "SELECT upload_id, key, content_type, initiated_at
             FROM multipart_uploads WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&*self.db)
        .await?;

        match upload {
            Some(upload) if upload.key == key => Ok(upload),
            _ => Err(DriveError::UploadNotFound {
                key: key.to_string(),
                upload_id: upload_id.to_string(),
            }),
        }
    }

    /// Stream a payload to disk and upsert its metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Renames into the final location once fsynced.
    /// - Commits the metadata row only after the rename.
    ///
    /// Cleans up temp files on errors.
    async fn write_payload<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> DriveResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            DriveError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let (size_bytes, etag) = match write_stream_to(&tmp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(DriveError::Io(err));
            }
        };

        // The row is committed only once the payload is in place, so a failed
        // overwrite keeps both the previous row and the previous payload.
        let mut tx = match self.db.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(DriveError::Sqlx(err));
            }
        };
        let object = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO files (id, key, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await;
        let object = match object {
            Ok(obj) => obj,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(DriveError::Sqlx(err));
            }
        };

        if let Err(err) = replace_file(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(DriveError::Io(err));
        }
        tx.commit().await?;

        debug!("stored {} ({} bytes)", key, object.size_bytes);
        Ok(object)
    }

    /// Drop a session's rows and staged part files.
    async fn discard_session(&self, upload_id: &str) -> DriveResult<()> {
        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        sqlx::query("DELETE FROM multipart_uploads WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        if let Err(err) = fs::remove_dir_all(self.staging_dir(upload_id)).await {
            debug!("failed to remove staging for {}: {}", upload_id, err);
        }
        Ok(())
    }

    /// Recursively remove empty directories up to `stop`.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached `stop`
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Drive for DiskDrive {
    fn backend(&self) -> &'static str {
        "disk"
    }

    /// Runs `SELECT 1` against SQLite and a write/read/delete round trip
    /// on a temp file under `base_path`.
    async fn health_check(&self) -> DriveResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;

        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(DriveError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "file content mismatch",
            )));
        }
        Ok(())
    }

    async fn put<'a>(
        &self,
        key: &str,
        content_type: Option<String>,
        body: ByteStream<'a>,
    ) -> DriveResult<StoredObject> {
        ensure_key_safe(key)?;
        self.write_payload(key, content_type, body).await
    }

    async fn get(&self, key: &str) -> DriveResult<Option<DriveFile>> {
        ensure_key_safe(key)?;
        let Some(object) = self.fetch_object(key).await? else {
            return Ok(None);
        };

        match File::open(self.object_path(key)).await {
            Ok(file) => Ok(Some(DriveFile {
                object,
                reader: Box::pin(file),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("metadata for {} has no payload on disk", key);
                Ok(None)
            }
            Err(err) => Err(DriveError::Io(err)),
        }
    }

    async fn list(&self) -> DriveResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>("SELECT key FROM files ORDER BY key ASC")
            .fetch_all(&*self.db)
            .await?;
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> DriveResult<()> {
        ensure_key_safe(key)?;
        let result = sqlx::query("DELETE FROM files WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            debug!("delete of absent key {}", key);
            return Ok(());
        }

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(DriveError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    async fn start_upload(&self, key: &str, content_type: Option<String>) -> DriveResult<String> {
        ensure_key_safe(key)?;
        let upload = MultipartUpload {
            upload_id: Uuid::new_v4().simple().to_string(),
            key: key.to_string(),
            content_type,
            initiated_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO multipart_uploads (upload_id, key, content_type, initiated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&upload.upload_id)
        .bind(&upload.key)
        .bind(&upload.content_type)
        .bind(upload.initiated_at)
        .execute(&*self.db)
        .await?;

        fs::create_dir_all(self.staging_dir(&upload.upload_id)).await?;
        debug!("opened upload {} for {}", upload.upload_id, key);
        Ok(upload.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> DriveResult<()> {
        ensure_key_safe(key)?;
        let upload = self.fetch_upload(key, upload_id).await?;

        let part = MultipartPart {
            upload_id: upload.upload_id,
            part_number: i64::from(part_number),
            size_bytes: data.len() as i64,
            uploaded_at: Utc::now(),
        };

        let staging = self.staging_dir(&part.upload_id);
        fs::create_dir_all(&staging).await?;
        let tmp_path = staging.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = fs::write(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(DriveError::Io(err));
        }
        fs::rename(&tmp_path, self.part_path(&part.upload_id, part.part_number)).await?;

        sqlx::query(
            "INSERT INTO multipart_parts (upload_id, part_number, size_bytes, uploaded_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(upload_id, part_number) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                uploaded_at = excluded.uploaded_at",
        )
        .bind(&part.upload_id)
        .bind(part.part_number)
        .bind(part.size_bytes)
        .bind(part.uploaded_at)
        .execute(&*self.db)
        .await?;

        debug!(
            "staged part {} of upload {} ({} bytes)",
            part.part_number, part.upload_id, part.size_bytes
        );
        Ok(())
    }

    async fn finish_upload(&self, key: &str, upload_id: &str) -> DriveResult<StoredObject> {
        ensure_key_safe(key)?;
        let upload = self.fetch_upload(key, upload_id).await?;
        let parts = sqlx::query_as::<_, MultipartPart>(
            "SELECT upload_id, part_number, size_bytes, uploaded_at
             FROM multipart_parts WHERE upload_id = ? ORDER BY part_number ASC",
        )
        .bind(&upload.upload_id)
        .fetch_all(&*self.db)
        .await?;

        let mut readers = Vec::with_capacity(parts.len());
        for part in &parts {
            let file = File::open(self.part_path(&upload.upload_id, part.part_number)).await?;
            readers.push(ReaderStream::new(file));
        }
        let body = stream::iter(readers).flatten();

        let object = self
            .write_payload(key, upload.content_type.clone(), body)
            .await?;

        self.discard_session(&upload.upload_id).await?;

        debug!(
            "finished upload {} into {} from {} parts",
            upload.upload_id,
            key,
            parts.len()
        );
        Ok(object)
    }

    async fn abort_upload(&self, key: &str, upload_id: &str) -> DriveResult<()> {
        ensure_key_safe(key)?;
        match self.fetch_upload(key, upload_id).await {
            Ok(upload) => {
                self.discard_session(&upload.upload_id).await?;
                debug!("aborted upload {} for {}", upload.upload_id, key);
                Ok(())
            }
            Err(DriveError::UploadNotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Move `from` over `to`, replacing any existing file.
async fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(to).await?;
            fs::rename(from, to).await
        }
        result => result,
    }
}

/// Write `stream` into a new file at `path`, fsync it, and return (size, md5).
async fn write_stream_to<S>(path: &Path, stream: S) -> io::Result<(i64, String)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((size_bytes, format!("{:x}", digest.compute())))
}
