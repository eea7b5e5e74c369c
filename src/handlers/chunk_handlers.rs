//! HTTP handlers for the chunked upload protocol.
//!
//! Each request is a multipart form carrying `part_number`,
//! `total_part_number`, an optional `upload_id` and `content_type`, and the
//! chunk itself in `file`. The response is the upload ID to send with the
//! next part.

use crate::{
    auth::AdminUser,
    errors::AppError,
    handlers::file_handlers::multipart_error,
    models::file::Visibility,
    services::file_service::{FileService, MAX_PART_SIZE, PartUpload},
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
};
use bytes::{Bytes, BytesMut};

/// `POST /upload-public-file-part`
pub async fn upload_public_file_part(
    State(files): State<FileService>,
    user: AdminUser,
    multipart: Multipart,
) -> Result<Json<String>, AppError> {
    let part = read_part_form(multipart, Visibility::Public).await?;
    Ok(Json(files.upload_part(&user, part).await?))
}

/// `POST /upload-private-file-part`
pub async fn upload_private_file_part(
    State(files): State<FileService>,
    user: AdminUser,
    multipart: Multipart,
) -> Result<Json<String>, AppError> {
    let part = read_part_form(multipart, Visibility::Private).await?;
    Ok(Json(files.upload_part(&user, part).await?))
}

async fn read_part_form(
    mut multipart: Multipart,
    visibility: Visibility,
) -> Result<PartUpload, AppError> {
    let mut part_number = None;
    let mut total_part_number = None;
    let mut upload_id = None;
    let mut content_type = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "part_number" => part_number = Some(parse_number(field, "part_number").await?),
            "total_part_number" => {
                total_part_number = Some(parse_number(field, "total_part_number").await?)
            }
            "upload_id" => upload_id = non_empty(field.text().await.map_err(multipart_error)?),
            "content_type" => {
                content_type = non_empty(field.text().await.map_err(multipart_error)?)
            }
            "file" => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::bad_request("file field has no filename"))?;
                let declared = field.content_type().map(str::to_string);
                file = Some((name, declared, read_chunk(field).await?));
            }
            _ => {}
        }
    }

    let (name, declared_type, chunk) =
        file.ok_or_else(|| AppError::bad_request("missing `file` field"))?;
    Ok(PartUpload {
        visibility,
        name,
        part_number: part_number.ok_or_else(|| AppError::bad_request("missing `part_number`"))?,
        total_part_number: total_part_number
            .ok_or_else(|| AppError::bad_request("missing `total_part_number`"))?,
        upload_id,
        content_type: content_type.or(declared_type),
        chunk,
    })
}

/// Read at most [`MAX_PART_SIZE`] bytes of the chunk; anything past that is dropped.
async fn read_chunk(mut field: Field<'_>) -> Result<Bytes, AppError> {
    let mut buf = BytesMut::new();
    while let Some(bytes) = field.chunk().await.map_err(multipart_error)? {
        let room = MAX_PART_SIZE - buf.len();
        buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
        if buf.len() == MAX_PART_SIZE {
            break;
        }
    }
    Ok(buf.freeze())
}

async fn parse_number(field: Field<'_>, name: &str) -> Result<u32, AppError> {
    let text = field.text().await.map_err(multipart_error)?;
    text.trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("`{}` must be a positive integer", name)))
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
