//! Static and server-rendered pages.

use crate::{auth::AdminUser, state::AppState, views};
use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse, Redirect},
};

const FAVICON: &[u8] = include_bytes!("../../static/favicon.ico");

/// `GET /` — the docs page is the landing page.
pub async fn root() -> Redirect {
    Redirect::temporary("/docs")
}

/// `GET /docs`
pub async fn docs(State(state): State<AppState>) -> Html<String> {
    Html(views::render_docs(state.admin.is_demo()))
}

/// `GET /file-upload-with-chunks`
pub async fn chunk_upload_page(_user: AdminUser) -> Html<&'static str> {
    Html(views::CHUNK_UPLOAD_PAGE)
}

/// `GET /favicon.ico`
pub async fn favicon() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/x-icon")], FAVICON)
}
