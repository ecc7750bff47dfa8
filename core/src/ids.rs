//! Opaque unique identifier allocation (spec §4.2).

use ulid::Ulid;

/// Known id prefixes. New callers should reuse one of these rather than
/// inventing a fresh namespace.
pub mod prefix {
    pub const DEVICE: &str = "dev";
    pub const ARTIFACT: &str = "art";
    pub const HIT: &str = "hit";
    pub const JOB: &str = "job";
    pub const REPORT: &str = "rep";
    pub const EVENT: &str = "evt";
    pub const CHECK: &str = "chk";
    pub const BUNDLE: &str = "bundle";
    pub const CASE: &str = "case";
}

/// Returns `"<prefix>_<unique>"`. The unique portion is a ULID, which
/// carries enough entropy to never collide within a workstation's
/// lifetime; ordering is not relied on anywhere in the engine.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_carries_the_requested_prefix() {
        let id = new_id(prefix::ARTIFACT);
        assert!(id.starts_with("art_"));
    }

    #[test]
    fn new_id_does_not_collide_across_many_calls() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(new_id(prefix::HIT)));
        }
    }
}
