use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identity of an article: lowercase hex SHA-256 of
/// `feed_url + title + link` (plain concatenation, no separator).
///
/// The same triple always yields the same fingerprint, across runs and
/// processes. This is the only dedup key the store uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(feed_url: &str, title: &str, link: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(feed_url.as_bytes());
        hasher.update(title.as_bytes());
        hasher.update(link.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
