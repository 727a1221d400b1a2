use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;

/// Audit category of a journal entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalCategory {
    Connection,
    Navigation,
    Input,
    EvidenceCaptured,
    Error,
    Disconnect,
}

impl std::fmt::Display for JournalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Navigation => write!(f, "navigation"),
            Self::Input => write!(f, "input"),
            Self::EvidenceCaptured => write!(f, "evidence_captured"),
            Self::Error => write!(f, "error"),
            Self::Disconnect => write!(f, "disconnect"),
        }
    }
}

impl std::str::FromStr for JournalCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection" => Ok(Self::Connection),
            "navigation" => Ok(Self::Navigation),
            "input" => Ok(Self::Input),
            "evidence_captured" => Ok(Self::EvidenceCaptured),
            "error" => Ok(Self::Error),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!("unknown journal category: {other}")),
        }
    }
}

/// One hash-chained audit entry.
///
/// `hash` covers the entry body plus the previous entry's hash, so any
/// rewrite of an earlier line breaks every hash after it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub ts: String,
    pub category: JournalCategory,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    pub hash: String,
}

impl JournalEntry {
    /// Build the next entry in a chain, stamped with the current time.
    pub fn next(
        seq: u64,
        category: JournalCategory,
        payload: serde_json::Value,
        prev_hash: Option<&str>,
    ) -> Self {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let hash = chain_hash(seq, &ts, category, &payload, prev_hash);
        Self {
            seq,
            ts,
            category,
            payload,
            prev_hash: prev_hash.map(str::to_owned),
            hash,
        }
    }

    /// Recompute this entry's hash from its fields.
    pub fn expected_hash(&self) -> String {
        chain_hash(
            self.seq,
            &self.ts,
            self.category,
            &self.payload,
            self.prev_hash.as_deref(),
        )
    }

    /// Whether the stored hash matches the entry body and chain position.
    pub fn verifies_against(&self, prev_hash: Option<&str>) -> bool {
        self.prev_hash.as_deref() == prev_hash && self.hash == self.expected_hash()
    }
}

/// Chain hash: SHA-256 over the canonical JSON of the entry body with the
/// previous hash folded in. serde_json orders object keys, so the byte
/// form is stable across serialize/deserialize.
fn chain_hash(
    seq: u64,
    ts: &str,
    category: JournalCategory,
    payload: &serde_json::Value,
    prev_hash: Option<&str>,
) -> String {
    let body = serde_json::json!({
        "seq": seq,
        "ts": ts,
        "category": category,
        "payload": payload,
        "prev": prev_hash,
    });
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    sha256_hex(&bytes)
}
