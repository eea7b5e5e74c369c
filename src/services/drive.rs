//! The storage backend seam.
//!
//! A `Drive` is a single flat collection of keyed objects with a three-call
//! chunked upload protocol (start, part, finish, plus abort). Everything the service knows
//! about public and private files is encoded in the keys it passes in.

use crate::models::file::StoredObject;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::{io, pin::Pin};
use thiserror::Error;
use tokio::io::AsyncRead;

/// Name of the single collection every deployment stores its files in.
pub const DRIVE_NAME: &str = "drive";

const MAX_KEY_LEN: usize = 1024;

/// Byte stream accepted by [`Drive::put`].
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'a>>;

/// An object opened for reading.
pub struct DriveFile {
    pub object: StoredObject,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("upload `{upload_id}` not found for `{key}`")]
    UploadNotFound { key: String, upload_id: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DriveResult<T> = Result<T, DriveError>;

#[async_trait]
pub trait Drive: Send + Sync + 'static {
    /// Short backend identifier used in logs and readiness output.
    fn backend(&self) -> &'static str;

    /// Verify the backend can currently serve reads and writes.
    async fn health_check(&self) -> DriveResult<()>;

    /// Store `body` under `key`, replacing any existing object.
    async fn put<'a>(
        &self,
        key: &str,
        content_type: Option<String>,
        body: ByteStream<'a>,
    ) -> DriveResult<StoredObject>;

    /// Open `key` for reading; `None` when no such object exists.
    async fn get(&self, key: &str) -> DriveResult<Option<DriveFile>>;

    /// All keys in ascending order.
    async fn list(&self) -> DriveResult<Vec<String>>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> DriveResult<()>;

    /// Open a chunked upload session for `key` and return its upload ID.
    async fn start_upload(&self, key: &str, content_type: Option<String>) -> DriveResult<String>;

    /// Stage one part of a session. Re-sending a part number replaces it.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> DriveResult<()>;

    /// Concatenate the staged parts in part-number order into `key` and close the session.
    async fn finish_upload(&self, key: &str, upload_id: &str) -> DriveResult<StoredObject>;

    /// Discard a session and its staged parts. Discarding an unknown session succeeds.
    async fn abort_upload(&self, key: &str, upload_id: &str) -> DriveResult<()>;
}

/// Basic key validation to keep keys usable as relative file paths.
///
/// Rejects empty and oversized keys, absolute keys, `..` segments, backslashes
/// and control characters.
pub fn ensure_key_safe(key: &str) -> DriveResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == ".." || segment == ".")
        || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
    if invalid {
        return Err(DriveError::InvalidKey(key.to_string()));
    }
    Ok(())
}
