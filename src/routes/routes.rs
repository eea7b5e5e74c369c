//! Defines every route of the personal drive.
//!
//! ## Structure
//! - **Pages**
//!   - `GET  /` — redirect to `/docs`
//!   - `GET  /docs`, `GET /file-upload-with-chunks`, `GET /favicon.ico`
//!
//! - **Files** (`{vis}` is `public` or `private`)
//!   - `POST /{vis}-file` — upload or replace a file
//!   - `GET  /{vis}-file/{name}` — download (public needs no credentials)
//!   - `POST /delete-{vis}-file/{name}` — delete
//!   - `GET|POST /get-files` — HTML / JSON listing
//!   - `POST /upload-{vis}-file-part` — one part of a chunked upload
//!
//! Upload routes have no body size limit: whole files are streamed into the
//! drive and chunk parts are truncated while reading.

use crate::{
    handlers::{
        chunk_handlers::{upload_private_file_part, upload_public_file_part},
        file_handlers::{
            delete_private_file, delete_public_file, download_private_file,
            download_public_file, list_files_html, list_files_json, upload_private_file,
            upload_public_file,
        },
        health_handlers::{healthz, readyz},
        page_handlers::{chunk_upload_page, docs, favicon, root},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // pages
        .route("/", get(root))
        .route("/docs", get(docs))
        .route("/favicon.ico", get(favicon))
        .route("/file-upload-with-chunks", get(chunk_upload_page))
        // whole-file uploads
        .route(
            "/public-file",
            post(upload_public_file).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/private-file",
            post(upload_private_file).layer(DefaultBodyLimit::disable()),
        )
        // listings
        .route("/get-files", get(list_files_html).post(list_files_json))
        // downloads
        .route("/public-file/{name}", get(download_public_file))
        .route("/private-file/{name}", get(download_private_file))
        // deletes
        .route("/delete-public-file/{name}", post(delete_public_file))
        .route("/delete-private-file/{name}", post(delete_private_file))
        // chunked uploads
        .route(
            "/upload-public-file-part",
            post(upload_public_file_part).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/upload-private-file-part",
            post(upload_private_file_part).layer(DefaultBodyLimit::disable()),
        )
}
