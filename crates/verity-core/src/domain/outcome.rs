//! Outcome model: what the backend reports when a verification ends.
//!
//! The core does not interpret verification results beyond "did it succeed",
//! but it carries the backend's classification along so status notifications
//! can explain what happened.

use serde::{Deserialize, Serialize};

/// Backend classification of a finished verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Success {
    Success,
    ParsingFailed,
    TypecheckingFailed,
    VerificationFailed,
    Aborted,
    Error,
}

impl Success {
    /// Only a clean run counts as verified.
    pub fn is_success(self) -> bool {
        matches!(self, Success::Success)
    }
}

/// Terminal result of one verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub success: Success,

    /// Wall-clock seconds the backend spent on the run.
    #[serde(default)]
    pub time_secs: f64,

    #[serde(default)]
    pub error_count: u32,
}

impl VerificationOutcome {
    pub fn new(success: Success, time_secs: f64) -> Self {
        Self {
            success,
            time_secs,
            error_count: 0,
        }
    }

    /// Outcome recorded for a `verificationFailed` event (no detail available).
    pub fn failed() -> Self {
        Self::new(Success::Error, 0.0)
    }

    pub fn with_errors(mut self, error_count: u32) -> Self {
        self.error_count = error_count;
        self
    }

    /// Human readable summary, used for status notifications and hints.
    pub fn describe(&self, filename: &str) -> String {
        let plural = if self.error_count == 1 { "" } else { "s" };
        match self.success {
            Success::Success => format!(
                "Successfully verified {filename} in {:.1} seconds",
                self.time_secs
            ),
            Success::ParsingFailed => format!(
                "Parsing {filename} failed after {:.1} seconds",
                self.time_secs
            ),
            Success::TypecheckingFailed => format!(
                "Type checking {filename} failed after {:.1} seconds with {} error{plural}",
                self.time_secs, self.error_count
            ),
            Success::VerificationFailed => format!(
                "Verifying {filename} failed after {:.1} seconds with {} error{plural}",
                self.time_secs, self.error_count
            ),
            Success::Aborted => format!("Verifying {filename} was aborted"),
            Success::Error => format!("Verifying {filename} failed due to an internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_counts_as_verified() {
        assert!(Success::Success.is_success());
        assert!(!Success::VerificationFailed.is_success());
        assert!(!Success::Aborted.is_success());
        assert!(!Success::Error.is_success());
    }

    #[test]
    fn success_serializes_camel_case() {
        let s = serde_json::to_string(&Success::TypecheckingFailed).unwrap();
        assert_eq!(s, "\"typecheckingFailed\"");
    }

    #[test]
    fn describe_pluralizes_errors() {
        let one = VerificationOutcome::new(Success::VerificationFailed, 2.0).with_errors(1);
        let two = VerificationOutcome::new(Success::VerificationFailed, 2.0).with_errors(2);
        assert_eq!(
            one.describe("a.vpr"),
            "Verifying a.vpr failed after 2.0 seconds with 1 error"
        );
        assert!(two.describe("a.vpr").ends_with("2 errors"));
    }

    #[test]
    fn missing_timing_defaults_to_zero() {
        let o: VerificationOutcome = serde_json::from_str(r#"{"success":"success"}"#).unwrap();
        assert_eq!(o.time_secs, 0.0);
        assert_eq!(o.error_count, 0);
    }
}
