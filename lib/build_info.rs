/// Build identity reported by `--version`, the logging bootstrap event and the
/// `newsdesk_build_info` metric.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT_HASH: &str = env!("NEWSDESK_GIT_COMMIT_HASH");
pub const VERSION_WITH_COMMIT: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+",
    env!("NEWSDESK_GIT_COMMIT_HASH")
);

/// Returns the first 12 characters of the commit hash, or `"unknown"`.
pub fn short_commit_hash() -> &'static str {
    GIT_COMMIT_HASH
        .get(..12)
        .filter(|_| GIT_COMMIT_HASH != "unknown")
        .unwrap_or(GIT_COMMIT_HASH)
}

#[cfg(test)]
mod tests {
    use super::{short_commit_hash, GIT_COMMIT_HASH, VERSION, VERSION_WITH_COMMIT};

    #[test]
    fn version_with_commit_is_semver_plus_hash() {
        assert!(VERSION_WITH_COMMIT.starts_with(VERSION));
        assert!(VERSION_WITH_COMMIT.ends_with(GIT_COMMIT_HASH));
        assert!(VERSION_WITH_COMMIT.contains('+'));
    }

    #[test]
    fn short_hash_never_exceeds_twelve_chars() {
        assert!(!short_commit_hash().is_empty());
        assert!(short_commit_hash().len() <= 12);
    }
}
