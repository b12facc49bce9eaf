use uuid::Uuid;

/// Deterministic UUIDv5 from an arbitrary string id.
pub fn stable_uuid(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes())
}

/// Point id for one chunk of an indexed file.
///
/// Re-indexing the same `(repo_id, path, ordinal)` yields the same id, so
/// upserts overwrite instead of duplicating.
pub fn chunk_point_id(repo_id: &str, path: &str, ordinal: u32) -> Uuid {
    stable_uuid(&format!("{repo_id}:{path}:{ordinal}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_id() {
        assert_eq!(
            chunk_point_id("octo/repo", "src/lib.rs", 0),
            chunk_point_id("octo/repo", "src/lib.rs", 0)
        );
        assert_ne!(
            chunk_point_id("octo/repo", "src/lib.rs", 0),
            chunk_point_id("octo/other", "src/lib.rs", 0)
        );
    }
}
