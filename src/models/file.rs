//! Represents a stored file and the public/private namespace it lives in.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Which namespace a file belongs to.
///
/// Public files can be downloaded by anyone, private files only by the admin.
/// Both namespaces may hold a file with the same name at the same time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// Key prefix used in the drive, including the trailing slash.
    pub fn prefix(self) -> &'static str {
        match self {
            Visibility::Public => "public/",
            Visibility::Private => "private/",
        }
    }

    /// Storage key for `name` inside this namespace.
    pub fn key(self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }

    /// Inverse of [`Visibility::key`]: split a storage key into namespace and name.
    pub fn split_key(key: &str) -> Option<(Visibility, &str)> {
        [Visibility::Public, Visibility::Private]
            .into_iter()
            .find_map(|v| key.strip_prefix(v.prefix()).map(|name| (v, name)))
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

/// Metadata of a single object held by a drive.
///
/// The payload bytes are not part of this struct; drives hand them out as a
/// reader next to it.
#[derive(Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Full storage key, e.g. `private/report.pdf`.
    pub key: String,

    /// Content type declared by the uploader, if any.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload.
    pub etag: Option<String>,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}

/// All stored keys partitioned by namespace.
///
/// Keys keep the order the drive returned them in. Keys outside both
/// namespaces are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileListing {
    pub public: Vec<String>,
    pub private: Vec<String>,
}

impl FileListing {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut listing = Self::default();
        for key in keys {
            let key = key.as_ref();
            match Visibility::split_key(key) {
                Some((Visibility::Public, _)) => listing.public.push(key.to_string()),
                Some((Visibility::Private, _)) => listing.private.push(key.to_string()),
                None => {}
            }
        }
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefixes_name_with_namespace() {
        assert_eq!(Visibility::Public.key("a.txt"), "public/a.txt");
        assert_eq!(Visibility::Private.key("report.pdf"), "private/report.pdf");
    }

    #[test]
    fn split_key_recovers_namespace_and_name() {
        assert_eq!(
            Visibility::split_key("private/report.pdf"),
            Some((Visibility::Private, "report.pdf"))
        );
        assert_eq!(
            Visibility::split_key("public/a"),
            Some((Visibility::Public, "a"))
        );
        assert_eq!(Visibility::split_key("other/a"), None);
        assert_eq!(Visibility::split_key("publicity.txt"), None);
    }

    #[test]
    fn listing_partitions_keys_and_keeps_order() {
        let listing = FileListing::from_keys([
            "public/b",
            "private/b",
            "public/a",
            "stray",
            "private/c",
        ]);
        assert_eq!(listing.public, vec!["public/b", "public/a"]);
        assert_eq!(listing.private, vec!["private/b", "private/c"]);
    }
}
