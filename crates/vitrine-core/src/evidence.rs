use serde::{Deserialize, Serialize};

/// What kind of page state a capture preserves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Rendered image of the current viewport.
    Snapshot,
    /// Serialized document markup.
    Document,
}

impl EvidenceKind {
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Snapshot => "png",
            Self::Document => "html",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Snapshot => "page snapshot",
            Self::Document => "serialized document",
        }
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snapshot => write!(f, "snapshot"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// One manifest entry. Immutable once appended; `sha256` is computed over
/// the exact bytes persisted to `file_name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub file_name: String,
    pub description: String,
    pub captured_at: String,
    pub sha256: String,
    pub bytes: u64,
}
