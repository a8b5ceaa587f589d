//! Remote store target parsing.
//!
//! A remote target looks like `user@host:/path`; everything else is a
//! local path.

use std::fmt;
use std::sync::LazyLock;

/// Static regex for validating remote specs (compiled once on first use)
#[expect(
    clippy::expect_used,
    reason = "Regex literal is compile-time constant and cannot fail"
)]
static REMOTE_SPEC_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(?P<user>[A-Za-z0-9._-]+)@(?P<host>[A-Za-z0-9._-]+):(?P<path>.+)$")
        .expect("REMOTE_SPEC_REGEX is a valid regex literal")
});

/// A remote store location of the form `user@host:/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    /// Login user on the remote host.
    pub user: String,
    /// Remote hostname, also the key for the local ledger cache.
    pub host: String,
    /// Directory path on the remote host.
    pub path: String,
}

impl RemoteSpec {
    /// Parse `user@host:/path`. Returns `None` for anything else, which
    /// callers treat as a local path.
    #[must_use]
    pub fn parse(raw: &str) -> Option<RemoteSpec> {
        let caps = REMOTE_SPEC_REGEX.captures(raw.trim())?;
        Some(RemoteSpec {
            user: caps["user"].to_string(),
            host: caps["host"].to_string(),
            path: caps["path"].to_string(),
        })
    }

    /// The ssh login target, `user@host`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Path of one file inside the remote directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> String {
        format!("{}/{name}", self.path.trim_end_matches('/'))
    }
}

impl fmt::Display for RemoteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.path)
    }
}
