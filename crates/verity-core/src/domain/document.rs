//! Per-document verification state.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use super::DocumentUri;

/// State the scheduler keeps for one open document.
///
/// Lifecycle:
/// - created when the document is reported open
/// - `verifying` set when its `Verify` task is dispatched
/// - `verified` set only on a successful terminal result
/// - `(changed, verified)` reset to `(true, false)` on a meaningful save
/// - `open` cleared when the document is reported closed; dropped once
///   no verification is running for it
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub uri: DocumentUri,
    pub verified: bool,
    pub verifying: bool,
    pub changed: bool,
    pub open: bool,

    /// Whitespace-insensitive fingerprint of the last saved text.
    pub fingerprint: Option<u64>,

    pub last_verified_at: Option<DateTime<Utc>>,
}

impl DocumentState {
    pub fn opened(uri: DocumentUri) -> Self {
        Self {
            uri,
            verified: false,
            verifying: false,
            changed: true,
            open: true,
            fingerprint: None,
            last_verified_at: None,
        }
    }

    /// Record a save. Returns `false` when the save was cosmetic
    /// (the fingerprint did not move).
    pub fn record_save(&mut self, fingerprint: Option<u64>) -> bool {
        let meaningful = match (fingerprint, self.fingerprint) {
            (Some(new), Some(old)) => new != old,
            _ => true,
        };
        if fingerprint.is_some() {
            self.fingerprint = fingerprint;
        }
        if meaningful {
            self.changed = true;
            self.verified = false;
        }
        meaningful
    }

    pub fn mark_verifying(&mut self) {
        self.verifying = true;
    }

    /// Apply a terminal result.
    pub fn finish(&mut self, success: bool, at: DateTime<Utc>) {
        self.verifying = false;
        if success {
            self.verified = true;
            self.changed = false;
            self.last_verified_at = Some(at);
        }
    }

    /// The verification was cancelled or abandoned.
    pub fn abandon(&mut self) {
        self.verifying = false;
    }
}

/// Fingerprint of a document's text that ignores whitespace, so that
/// re-indentation or trailing blank lines do not count as a change.
pub fn fingerprint(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        c.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_whitespace() {
        assert_eq!(
            fingerprint("method m() {\n  assert true\n}"),
            fingerprint("method m() { assert true }\n\n")
        );
        assert_ne!(fingerprint("assert true"), fingerprint("assert false"));
    }

    #[test]
    fn cosmetic_save_keeps_verified() {
        let mut doc = DocumentState::opened(DocumentUri::new("file:///a.vpr"));
        assert!(doc.record_save(Some(fingerprint("a b"))));
        doc.finish(true, Utc::now());
        assert!(doc.verified);

        assert!(!doc.record_save(Some(fingerprint("a  b"))));
        assert!(doc.verified);
        assert!(!doc.changed);
    }

    #[test]
    fn save_without_text_is_always_meaningful() {
        let mut doc = DocumentState::opened(DocumentUri::new("file:///a.vpr"));
        doc.finish(true, Utc::now());
        assert!(doc.record_save(None));
        assert!(doc.changed);
        assert!(!doc.verified);
    }

    #[test]
    fn failed_result_does_not_verify() {
        let mut doc = DocumentState::opened(DocumentUri::new("file:///a.vpr"));
        doc.mark_verifying();
        doc.finish(false, Utc::now());
        assert!(!doc.verifying);
        assert!(!doc.verified);
        assert!(doc.last_verified_at.is_none());
    }
}
