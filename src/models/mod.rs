//! Core data models for the personal drive.
//!
//! `file` holds the namespace types shared by every layer; `multipart` holds
//! the rows the disk drive persists for chunked uploads.

pub mod file;
pub mod multipart;
