//! Well-known names recognised by the request processor.

/// Reserved bookkeeping collection that standalone secrets hang off.
///
/// The row exists only to satisfy foreign-key constraints and must never be
/// visible through collection-level operations.
pub const STANDALONE_COLLECTION_NAME: &str = "standalone";

/// Authentication plugin substituted whenever no plugin is named.
pub const DEFAULT_AUTHENTICATION_PLUGIN_NAME: &str = "secretkit.authentication.default";

/// Suffix appended to the default authentication plugin name in autotest
/// mode.
pub const AUTOTEST_PLUGIN_SUFFIX: &str = ".test";

/// Returns `true` when `name` is the reserved standalone collection name,
/// compared case-insensitively.
#[must_use]
pub fn is_reserved_collection_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(STANDALONE_COLLECTION_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_name_is_case_insensitive() {
        assert!(is_reserved_collection_name("standalone"));
        assert!(is_reserved_collection_name("Standalone"));
        assert!(is_reserved_collection_name("STANDALONE"));
        assert!(!is_reserved_collection_name("standalone2"));
        assert!(!is_reserved_collection_name(""));
    }
}
