//! Incremental-processing state, one record per lead
//!
//! Change detection works like a checksum cache:
//! 1. Hash the canonicalized input attributes of a lead
//! 2. Compare against the hash stored after the last processing run
//! 3. Reprocess when the hash differs or the last run produced no usable outputs
//!
//! The table is loaded wholesale at run start and rewritten atomically
//! (temp file + rename) after every processed lead, so a crash never loses
//! fingerprints committed earlier in the run.

use crate::errors::AppError;
use crate::models::Lead;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub lead_id: String,
    /// SHA-256 of the canonical input attributes (hex encoded)
    pub content_hash: String,
    /// False when the last run failed to produce a complete output bundle
    pub has_core_outputs: bool,
    pub last_run_timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    leads: BTreeMap<String, FingerprintRecord>,
}

/// Computes the content hash of a lead's input attributes.
///
/// The canonical form is a JSON object with sorted keys where absent values
/// are `null` and strings are trimmed, so attribute order and blank-vs-missing
/// differences never change the hash.
pub fn content_hash(lead: &Lead) -> String {
    let canonical: BTreeMap<&str, Value> = BTreeMap::from([
        ("company", text(Some(lead.company.as_str()))),
        ("website", text(lead.website.as_deref())),
        ("notes", text(lead.notes.as_deref())),
        (
            "last_contacted",
            lead.last_contacted
                .map(|d| json!(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
        ),
        ("status", text(lead.status.as_deref())),
    ]);

    // BTreeMap keys serialize in sorted order
    let serialized = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

fn text(value: Option<&str>) -> Value {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => json!(v),
        _ => Value::Null,
    }
}

/// Sole incremental-skip gate. Evaluated before any network call for the lead.
pub fn should_process(
    content_hash: &str,
    record: Option<&FingerprintRecord>,
    full_refresh: bool,
) -> bool {
    if full_refresh {
        return true;
    }
    match record {
        None => true,
        Some(record) => record.content_hash != content_hash || !record.has_core_outputs,
    }
}

/// Flat keyed table of fingerprints backed by a single JSON file.
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    records: BTreeMap<String, FingerprintRecord>,
}

impl FingerprintStore {
    /// Loads the state file; a missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        let records = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let state: StateFile = serde_json::from_str(&content).map_err(|e| {
                    AppError::State(format!(
                        "Failed to parse fingerprint file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                if state.version != STATE_VERSION {
                    return Err(AppError::State(format!(
                        "Unsupported fingerprint file version {} in {}",
                        state.version,
                        path.display()
                    )));
                }
                state.leads
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No fingerprint file at {}, starting with empty state",
                    path.display()
                );
                BTreeMap::new()
            }
            Err(e) => {
                return Err(AppError::State(format!(
                    "Failed to read fingerprint file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!("Loaded {} fingerprint(s) from {}", records.len(), path.display());
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, lead_id: &str) -> Option<&FingerprintRecord> {
        self.records.get(lead_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn should_process(&self, lead_id: &str, content_hash: &str, full_refresh: bool) -> bool {
        should_process(content_hash, self.get(lead_id), full_refresh)
    }

    /// Records the outcome of processing a lead, stamped with the current time.
    pub fn update(&mut self, lead_id: &str, content_hash: &str, has_core_outputs: bool) {
        self.update_at(lead_id, content_hash, has_core_outputs, Utc::now());
    }

    pub fn update_at(
        &mut self,
        lead_id: &str,
        content_hash: &str,
        has_core_outputs: bool,
        timestamp: DateTime<Utc>,
    ) {
        self.records.insert(
            lead_id.to_string(),
            FingerprintRecord {
                lead_id: lead_id.to_string(),
                content_hash: content_hash.to_string(),
                has_core_outputs,
                last_run_timestamp: timestamp,
            },
        );
    }

    /// Rewrites the whole state file atomically.
    pub fn save(&self) -> Result<(), AppError> {
        let state = StateFile {
            version: STATE_VERSION,
            leads: self.records.clone(),
        };
        let serialized = serde_json::to_string_pretty(&state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serialized.as_bytes())?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::State(format!(
                "Failed to replace fingerprint file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn lead() -> Lead {
        Lead::new("page-1", "ExampleCo")
            .with_website("example.com")
            .with_notes("B2B SaaS selling to hospitals")
            .with_status("Qualified")
            .with_last_contacted(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
    }

    #[test]
    fn test_hash_consistency() {
        assert_eq!(content_hash(&lead()), content_hash(&lead()));
        assert_eq!(content_hash(&lead()).len(), 64);
    }

    #[test]
    fn test_every_attribute_invalidates_hash() {
        let base = content_hash(&lead());
        let date = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();

        let variants = vec![
            Lead { company: "OtherCo".into(), ..lead() },
            Lead { website: None, ..lead() },
            Lead { notes: Some("Different notes".into()), ..lead() },
            Lead { last_contacted: Some(date), ..lead() },
            Lead { status: None, ..lead() },
        ];
        for variant in variants {
            assert_ne!(content_hash(&variant), base, "{:?}", variant);
        }
    }

    #[test]
    fn test_blank_and_missing_hash_the_same() {
        let missing = Lead::new("a", "Acme");
        let blank = Lead {
            website: Some("   ".into()),
            notes: Some(String::new()),
            ..Lead::new("a", "Acme")
        };
        assert_eq!(content_hash(&missing), content_hash(&blank));
    }

    #[test]
    fn test_lead_id_does_not_affect_hash() {
        let other = Lead { id: "page-2".into(), ..lead() };
        assert_eq!(content_hash(&other), content_hash(&lead()));
    }

    #[test]
    fn test_should_process_gate() {
        let record = FingerprintRecord {
            lead_id: "page-1".into(),
            content_hash: "abc".into(),
            has_core_outputs: true,
            last_run_timestamp: Utc::now(),
        };
        assert!(should_process("abc", None, false));
        assert!(!should_process("abc", Some(&record), false));
        assert!(should_process("abc", Some(&record), true));
        assert!(should_process("def", Some(&record), false));

        let failed = FingerprintRecord { has_core_outputs: false, ..record };
        assert!(should_process("abc", Some(&failed), false));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::load(dir.path().join("state.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = FingerprintStore::load(&path).unwrap();
        store.update("page-1", "hash-1", true);
        store.update("page-2", "hash-2", false);
        store.save().unwrap();

        let reloaded = FingerprintStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("page-1"), store.get("page-1"));
        assert_eq!(reloaded.get("page-2"), store.get("page-2"));
        assert!(!reloaded.get("page-2").unwrap().has_core_outputs);
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FingerprintStore::load(&path).unwrap_err();
        assert!(matches!(err, AppError::State(_)));
    }
}
