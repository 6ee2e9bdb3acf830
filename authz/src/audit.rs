//! Audit sinks for authorization decisions.
//!
//! Every `require_*` call emits exactly one [`AuditRecord`], for grants as
//! well as denials. The record is handed to the context's [`Auditor`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::error::{AuthzError, Result};

/// Hash preceding the first entry of an audit trail.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One authorization decision as seen by an audit sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Audit tag of the guarded target, if any
    pub target: Option<String>,
    /// Name of the principal the decision was made for
    pub principal: String,
    /// Name of the required permission, if any
    pub permission: Option<String>,
    /// Name of the required privilege, if any
    pub privilege: Option<String>,
    /// Whether access was granted
    pub success: bool,
    /// Empty on grant, the denial reason on denial
    pub message: String,
}

/// Receives audit records. Implementations should not fail in normal
/// operation; a failure never changes the authorization outcome.
pub trait Auditor: Send + Sync {
    fn audit(&self, record: &AuditRecord) -> Result<()>;
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditor;

impl Auditor for NoopAuditor {
    fn audit(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event on the `authz::audit`
/// target. Grants log at info, denials at warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditor;

impl Auditor for TracingAuditor {
    fn audit(&self, record: &AuditRecord) -> Result<()> {
        let target = record.target.as_deref().unwrap_or("-");
        let permission = record.permission.as_deref().unwrap_or("-");
        let privilege = record.privilege.as_deref().unwrap_or("-");
        if record.success {
            info!(
                target: "authz::audit",
                principal = %record.principal,
                resource = target,
                permission,
                privilege,
                "access granted"
            );
        } else {
            warn!(
                target: "authz::audit",
                principal = %record.principal,
                resource = target,
                permission,
                privilege,
                reason = %record.message,
                "access denied"
            );
        }
        Ok(())
    }
}

/// An entry of an [`AuditTrail`], chained to its predecessor by hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique ID for this entry
    pub id: String,
    /// When the decision was recorded
    pub timestamp: DateTime<Utc>,
    /// The recorded decision
    pub record: AuditRecord,
    /// Hash of the previous entry for chain verification
    pub previous_hash: String,
    /// Hash of this entry
    pub entry_hash: String,
}

impl AuditEntry {
    fn new(record: AuditRecord, previous_hash: String) -> Self {
        let mut entry = Self {
            id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now(),
            record,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.calculate_hash();
        entry
    }

    fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        if let Some(ref target) = self.record.target {
            hasher.update(target.as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(self.record.principal.as_bytes());
        hasher.update([0u8]);
        if let Some(ref permission) = self.record.permission {
            hasher.update(permission.as_bytes());
        }
        hasher.update([0u8]);
        if let Some(ref privilege) = self.record.privilege {
            hasher.update(privilege.as_bytes());
        }
        hasher.update([0u8]);
        hasher.update([self.record.success as u8]);
        hasher.update(self.record.message.as_bytes());
        hasher.update(self.previous_hash.as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Verify the hash of this entry.
    pub fn verify_hash(&self) -> bool {
        self.entry_hash == self.calculate_hash()
    }
}

/// In-memory, append-only audit sink with a SHA-256 hash chain so that any
/// later modification of a recorded decision is detectable.
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of all entries in recording order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Snapshot of the recorded decisions without chain metadata.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.entries.lock().iter().map(|e| e.record.clone()).collect()
    }

    /// Verify the integrity of the whole chain.
    pub fn verify_chain(&self) -> bool {
        Self::verify_entries(&self.entries.lock())
    }

    /// Verify a chain of entries, e.g. one exported and re-imported.
    pub fn verify_entries(entries: &[AuditEntry]) -> bool {
        let mut expected_previous = GENESIS_HASH;
        for (index, entry) in entries.iter().enumerate() {
            if !entry.verify_hash() {
                error!("Audit hash verification failed at entry {}: id={}", index, entry.id);
                return false;
            }
            if entry.previous_hash != expected_previous {
                error!(
                    "Audit chain broken at entry {}: expected_previous={}, got={}",
                    index, expected_previous, entry.previous_hash
                );
                return false;
            }
            expected_previous = &entry.entry_hash;
        }
        true
    }

    /// Export the chain as newline-delimited JSON.
    pub fn to_json_lines(&self) -> Result<String> {
        let entries = self.entries.lock();
        let mut out = String::new();
        for entry in entries.iter() {
            let line = serde_json::to_string(entry)
                .map_err(|e| AuthzError::Audit(format!("Failed to serialize entry: {}", e)))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Auditor for AuditTrail {
    fn audit(&self, record: &AuditRecord) -> Result<()> {
        let mut entries = self.entries.lock();
        let previous_hash = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        entries.push(AuditEntry::new(record.clone(), previous_hash));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(principal: &str, success: bool) -> AuditRecord {
        AuditRecord {
            target: Some("Order".to_string()),
            principal: principal.to_string(),
            permission: Some("edit-order".to_string()),
            privilege: None,
            success,
            message: if success { String::new() } else { "denied".to_string() },
        }
    }

    #[test]
    fn test_noop_and_tracing_auditors_accept_records() {
        assert!(NoopAuditor.audit(&record("alice", true)).is_ok());
        assert!(TracingAuditor.audit(&record("alice", true)).is_ok());
        assert!(TracingAuditor.audit(&record("bob", false)).is_ok());
    }

    #[test]
    fn test_trail_chains_entries() {
        let trail = AuditTrail::new();
        assert!(trail.is_empty());
        assert!(trail.verify_chain());

        for i in 0..5 {
            trail.audit(&record(&format!("user{}", i), i % 2 == 0)).unwrap();
        }

        let entries = trail.entries();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        for pair in entries.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].entry_hash);
        }
        assert!(trail.verify_chain());
        assert_eq!(trail.records()[1].principal, "user1");
    }

    #[test]
    fn test_tampered_entry_breaks_chain() {
        let trail = AuditTrail::new();
        trail.audit(&record("alice", false)).unwrap();
        trail.audit(&record("bob", true)).unwrap();

        let mut entries = trail.entries();
        assert!(AuditTrail::verify_entries(&entries));

        entries[0].record.success = true;
        assert!(!AuditTrail::verify_entries(&entries));
    }

    #[test]
    fn test_reordered_entries_break_chain() {
        let trail = AuditTrail::new();
        trail.audit(&record("alice", true)).unwrap();
        trail.audit(&record("bob", true)).unwrap();

        let mut entries = trail.entries();
        entries.swap(0, 1);
        assert!(!AuditTrail::verify_entries(&entries));
    }

    #[test]
    fn test_json_lines_export_round_trips() {
        let trail = AuditTrail::new();
        trail.audit(&record("alice", true)).unwrap();
        trail.audit(&record("bob", false)).unwrap();

        let exported = trail.to_json_lines().unwrap();
        let parsed: Vec<AuditEntry> = exported
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert!(AuditTrail::verify_entries(&parsed));
    }
}
