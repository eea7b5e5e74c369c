//! HTTP Basic access gate.
//!
//! Every route except public downloads and the static pages takes an
//! [`AdminUser`], which only extracts when the request's Basic credentials
//! equal the configured admin pair. Both fields are always compared, in time
//! independent of where they first differ.

use crate::errors::AppError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose};
use std::{fmt, sync::Arc};

/// Username that turns a deployment into a read-only demo.
pub const DEMO_USERNAME: &str = "demo";

/// The single admin identity a deployment is configured with.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.username == DEMO_USERNAME
    }

    /// Check a supplied pair against this identity.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let password_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        username_ok & password_ok
    }
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated caller.
///
/// Carries the configured username rather than the typed one, so demo checks
/// compare against the canonical identity.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub username: String,
}

impl AdminUser {
    pub fn is_demo(&self) -> bool {
        self.username == DEMO_USERNAME
    }

    /// Fail with 406 when the caller is the read-only demo identity.
    pub fn ensure_can_mutate(&self) -> Result<(), AppError> {
        if self.is_demo() {
            tracing::warn!("blocked mutation attempted by demo identity");
            return Err(AppError::demo_restricted());
        }
        Ok(())
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AdminCredentials>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let admin = Arc::<AdminCredentials>::from_ref(state);

        let (username, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_basic)
            .ok_or_else(AppError::unauthorized)?;

        if !admin.verify(&username, &password) {
            tracing::warn!("rejected credentials for user `{}`", username);
            return Err(AppError::unauthorized());
        }

        Ok(AdminUser {
            username: admin.username.clone(),
        })
    }
}

/// Decode an `Authorization: Basic <base64(user:pass)>` header value.
fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Byte equality whose running time depends only on the input lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = (a.len() ^ b.len()) as u64;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= u64::from(x ^ y);
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    fn basic(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{user}:{pass}"))
        )
    }

    async fn extract(header: Option<String>) -> Result<AdminUser, AppError> {
        let state = Arc::new(AdminCredentials::new("alice", "s3cret"));
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AdminUser::from_request_parts(&mut parts, &state).await
    }

    #[test]
    fn verify_accepts_only_the_exact_pair() {
        let admin = AdminCredentials::new("alice", "s3cret");
        assert!(admin.verify("alice", "s3cret"));
        assert!(!admin.verify("alice", "s3creT"));
        assert!(!admin.verify("alicE", "s3cret"));
        assert!(!admin.verify("alice", "s3cre"));
        assert!(!admin.verify("alice", "s3cretx"));
        assert!(!admin.verify("", ""));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abc\0", b"abc"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn parse_basic_splits_on_first_colon() {
        let header = basic("bob", "pa:ss");
        assert_eq!(
            parse_basic(&header),
            Some(("bob".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic not-base64!"), None);
    }

    #[tokio::test]
    async fn extractor_returns_configured_identity() {
        let user = extract(Some(basic("alice", "s3cret"))).await.unwrap();
        assert_eq!(user.username, "alice");
        assert!(!user.is_demo());
    }

    #[tokio::test]
    async fn extractor_rejects_missing_and_wrong_credentials() {
        let missing = extract(None).await.unwrap_err();
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

        let wrong = extract(Some(basic("alice", "wrong!"))).await.unwrap_err();
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn demo_identity_cannot_mutate() {
        let demo = AdminUser {
            username: DEMO_USERNAME.into(),
        };
        let err = demo.ensure_can_mutate().unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_ACCEPTABLE);

        let admin = AdminUser {
            username: "alice".into(),
        };
        assert!(admin.ensure_can_mutate().is_ok());
    }
}
