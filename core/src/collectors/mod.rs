//! Per-platform evidence collectors (spec §4.5). Each collector is
//! polymorphic over {detect, enumerate, snapshot} for one host OS or
//! mobile platform; all share the contract that every emitted `Artifact`
//! is backed by an immutable on-disk snapshot hashing to `sha256`.

pub mod epoch;
pub mod extensions;
pub mod history;
pub mod ios_backup;
pub mod macos;
pub mod mobile;
pub mod windows;

use crate::model::Artifact;

/// Outcome of one collector invocation: the artifacts it managed to
/// produce plus any non-fatal warnings (spec §4.7's "collect" step —
/// partial failure is non-fatal as long as something was produced).
#[derive(Debug, Default)]
pub struct CollectorOutcome {
    pub artifacts: Vec<Artifact>,
    pub warnings: Vec<String>,
}

impl CollectorOutcome {
    pub fn merge(&mut self, mut other: CollectorOutcome) {
        self.artifacts.append(&mut other.artifacts);
        self.warnings.append(&mut other.warnings);
    }

    pub fn from_result(result: crate::error::CoreResult<Vec<Artifact>>, context: &str) -> Self {
        match result {
            Ok(artifacts) => CollectorOutcome { artifacts, warnings: Vec::new() },
            Err(e) => {
                tracing::warn!(context, error = %e, "collector step failed");
                CollectorOutcome { artifacts: Vec::new(), warnings: vec![format!("{}: {}", context, e)] }
            }
        }
    }
}
