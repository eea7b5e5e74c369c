//! Shared state handed to every handler.

use crate::{auth::AdminCredentials, services::file_service::FileService};
use axum::extract::FromRef;
use std::sync::Arc;

/// Everything a request may need, built once at startup and read-only after.
#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    pub admin: Arc<AdminCredentials>,
}

impl AppState {
    pub fn new(files: FileService, admin: AdminCredentials) -> Self {
        Self {
            files,
            admin: Arc::new(admin),
        }
    }
}

impl FromRef<AppState> for Arc<AdminCredentials> {
    fn from_ref(state: &AppState) -> Self {
        state.admin.clone()
    }
}

impl FromRef<AppState> for FileService {
    fn from_ref(state: &AppState) -> Self {
        state.files.clone()
    }
}
