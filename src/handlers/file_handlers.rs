//! HTTP handlers for whole-file uploads, downloads, deletes and listings.
//! Upload bodies and download payloads are streamed, never buffered whole.

use crate::{
    auth::AdminUser,
    errors::AppError,
    models::file::Visibility,
    services::{
        drive::DriveFile,
        file_service::{DOWNLOAD_CHUNK_SIZE, FileService},
    },
    views,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::{Html, Response},
};
use futures::TryStreamExt;
use serde::Serialize;
use std::io;
use tokio_util::io::ReaderStream;

/// Body of `POST /get-files`.
#[derive(Debug, Serialize)]
pub struct FileNames {
    pub names: Vec<String>,
}

/// `POST /public-file`
pub async fn upload_public_file(
    State(files): State<FileService>,
    user: AdminUser,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<String>, AppError> {
    upload_file(files, user, headers, multipart, Visibility::Public).await
}

/// `POST /private-file`
pub async fn upload_private_file(
    State(files): State<FileService>,
    user: AdminUser,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<String>, AppError> {
    upload_file(files, user, headers, multipart, Visibility::Private).await
}

/// Stream the `file` field of the form into the drive and answer with the
/// file's external URL. The URL never contains the namespace.
async fn upload_file(
    files: FileService,
    user: AdminUser,
    headers: HeaderMap,
    mut multipart: Multipart,
    visibility: Visibility,
) -> Result<Json<String>, AppError> {
    user.ensure_can_mutate()?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("file field has no filename"))?;
        let content_type = field.content_type().map(str::to_string);
        let body = Box::pin(field.map_err(io::Error::other));

        files
            .upload(&user, visibility, &name, content_type, body)
            .await?;
        return Ok(Json(format!("https://{}/{}", host(&headers), name)));
    }

    Err(AppError::bad_request("missing `file` field"))
}

/// `GET /public-file/{name}` — no authentication.
pub async fn download_public_file(
    State(files): State<FileService>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    Ok(stream_file(files.open(Visibility::Public, &name).await?))
}

/// `GET /private-file/{name}`
pub async fn download_private_file(
    State(files): State<FileService>,
    _user: AdminUser,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    Ok(stream_file(files.open(Visibility::Private, &name).await?))
}

/// `POST /delete-public-file/{name}`
pub async fn delete_public_file(
    State(files): State<FileService>,
    user: AdminUser,
    Path(name): Path<String>,
) -> Result<Json<&'static str>, AppError> {
    files.delete(&user, Visibility::Public, &name).await?;
    Ok(Json("success"))
}

/// `POST /delete-private-file/{name}`
pub async fn delete_private_file(
    State(files): State<FileService>,
    user: AdminUser,
    Path(name): Path<String>,
) -> Result<Json<&'static str>, AppError> {
    files.delete(&user, Visibility::Private, &name).await?;
    Ok(Json("success"))
}

/// `GET /get-files` — HTML listing split by namespace.
pub async fn list_files_html(
    State(files): State<FileService>,
    _user: AdminUser,
) -> Result<Html<String>, AppError> {
    let listing = files.listing().await?;
    Ok(Html(views::render_file_listing(&listing)))
}

/// `POST /get-files` — every key, unpartitioned.
pub async fn list_files_json(
    State(files): State<FileService>,
    _user: AdminUser,
) -> Result<Json<FileNames>, AppError> {
    Ok(Json(FileNames {
        names: files.list_keys().await?,
    }))
}

/// Emit the payload in fixed-size chunks without a content type.
fn stream_file(file: DriveFile) -> Response {
    let stream = ReaderStream::with_capacity(file.reader, DOWNLOAD_CHUNK_SIZE);
    let mut response = Response::new(Body::from_stream(stream));
    if let Ok(length) = HeaderValue::from_str(&file.object.size_bytes.max(0).to_string()) {
        response.headers_mut().insert(header::CONTENT_LENGTH, length);
    }
    response
}

fn host(headers: &HeaderMap) -> &str {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
}

pub(crate) fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
