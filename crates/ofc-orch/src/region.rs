//! Region naming and detach outcomes.

/// Derives the controller region name for a network: the id with hyphens
/// removed.
///
/// ```
/// use dodai_ofc_orch::region_name;
///
/// assert_eq!(
///     region_name("3f2a9c0e-1b4d-4e6f-8a7b-0c1d2e3f4a5b"),
///     "3f2a9c0e1b4d4e6f8a7b0c1d2e3f4a5b"
/// );
/// ```
pub fn region_name(network_id: &str) -> String {
    network_id.replace('-', "")
}

/// What happened to the region after a server port was detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Another server port still references the region; it stays.
    RegionInUse,
    /// No server port referenced the region; it was torn down.
    RegionRemoved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_name_strips_hyphens() {
        assert_eq!(
            region_name("a0b1c2d3-e4f5-4a6b-8c7d-9e0f1a2b3c4d"),
            "a0b1c2d3e4f54a6b8c7d9e0f1a2b3c4d"
        );
    }

    #[test]
    fn test_region_name_is_idempotent() {
        let once = region_name("a0b1c2d3-e4f5-4a6b-8c7d-9e0f1a2b3c4d");
        assert_eq!(region_name(&once), once);
    }

    #[test]
    fn test_region_name_distinct_ids() {
        let a = region_name("3f2a9c0e-1b4d-4e6f-8a7b-0c1d2e3f4a5b");
        let b = region_name("3f2a9c0e-1b4d-4e6f-8a7b-0c1d2e3f4a5c");
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}
