//! Represents chunked upload sessions and their parts as the disk drive stores them.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A chunked upload session, opened by the first part of an upload.
#[derive(Clone, FromRow, Debug)]
pub struct MultipartUpload {
    /// Opaque upload ID handed back to the client.
    pub upload_id: String,

    /// Storage key the finished object is written to.
    pub key: String,

    /// Content type the finished object is stored with.
    pub content_type: Option<String>,

    /// Timestamp when the session was opened.
    pub initiated_at: DateTime<Utc>,
}

/// A single staged part of a chunked upload session.
#[derive(Clone, FromRow, Debug)]
pub struct MultipartPart {
    /// Parent session.
    pub upload_id: String,

    /// Part number (1-based).
    pub part_number: i64,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Timestamp when this part was staged.
    pub uploaded_at: DateTime<Utc>,
}
