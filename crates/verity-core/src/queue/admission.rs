//! Admission policy: may the `Verify` at the head be dispatched now?

use std::fmt;

use crate::domain::{DocumentState, DocumentUri};

/// Reason a `Verify` stays queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Denial {
    BackendNotReady,
    UnknownDocument,
    DocumentClosed,
    AutoVerifyDisabled,
    AlreadyVerifying,
    AlreadyVerified,
    NotActive,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Denial::BackendNotReady => "the verification backend is not ready yet",
            Denial::UnknownDocument => "the document is not known",
            Denial::DocumentClosed => "the document is not open",
            Denial::AutoVerifyDisabled => "auto verification is disabled",
            Denial::AlreadyVerifying => "the document is already being verified",
            Denial::AlreadyVerified => "the document is already verified",
            Denial::NotActive => "the document is not the active one",
        };
        f.write_str(reason)
    }
}

/// Everything the policy looks at, borrowed from the scheduler for one check.
#[derive(Debug, Clone, Copy)]
pub struct Admission<'a> {
    pub backend_ready: bool,
    pub document: Option<&'a DocumentState>,
    pub active: Option<&'a DocumentUri>,
    pub auto_verify: bool,
}

impl Admission<'_> {
    pub fn check(&self, target: &DocumentUri, manually_triggered: bool) -> Result<(), Denial> {
        if !self.backend_ready {
            return Err(Denial::BackendNotReady);
        }
        let doc = self.document.ok_or(Denial::UnknownDocument)?;
        if !doc.open {
            return Err(Denial::DocumentClosed);
        }
        if !manually_triggered && !self.auto_verify {
            return Err(Denial::AutoVerifyDisabled);
        }
        if doc.verified && doc.verifying && !doc.changed {
            return Err(Denial::AlreadyVerifying);
        }
        if !manually_triggered && doc.verified {
            return Err(Denial::AlreadyVerified);
        }
        if self.active != Some(target) {
            return Err(Denial::NotActive);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn doc(open: bool, verified: bool, verifying: bool, changed: bool) -> DocumentState {
        DocumentState {
            open,
            verified,
            verifying,
            changed,
            ..DocumentState::opened(DocumentUri::new("file:///a.vpr"))
        }
    }

    #[rstest]
    // ready  known  open   auto   manual verified verifying changed active  expected
    #[case(false, true, true, true, true, false, false, true, true, Err(Denial::BackendNotReady))]
    #[case(true, false, true, true, true, false, false, true, true, Err(Denial::UnknownDocument))]
    #[case(true, true, false, true, true, false, false, true, true, Err(Denial::DocumentClosed))]
    #[case(true, true, true, false, false, false, false, true, true, Err(Denial::AutoVerifyDisabled))]
    #[case(true, true, true, false, true, false, false, true, true, Ok(()))]
    #[case(true, true, true, true, true, true, true, false, true, Err(Denial::AlreadyVerifying))]
    #[case(true, true, true, true, false, true, false, false, true, Err(Denial::AlreadyVerified))]
    #[case(true, true, true, true, true, true, false, false, true, Ok(()))]
    #[case(true, true, true, true, true, false, false, true, false, Err(Denial::NotActive))]
    #[case(true, true, true, true, false, false, false, true, true, Ok(()))]
    #[allow(clippy::too_many_arguments)]
    fn admission_policy(
        #[case] ready: bool,
        #[case] known: bool,
        #[case] open: bool,
        #[case] auto_verify: bool,
        #[case] manual: bool,
        #[case] verified: bool,
        #[case] verifying: bool,
        #[case] changed: bool,
        #[case] is_active: bool,
        #[case] expected: Result<(), Denial>,
    ) {
        let target = DocumentUri::new("file:///a.vpr");
        let other = DocumentUri::new("file:///b.vpr");
        let state = doc(open, verified, verifying, changed);
        let admission = Admission {
            backend_ready: ready,
            document: known.then_some(&state),
            active: Some(if is_active { &target } else { &other }),
            auto_verify,
        };
        assert_eq!(admission.check(&target, manual), expected);
    }

    #[test]
    fn no_active_document_denies() {
        let target = DocumentUri::new("file:///a.vpr");
        let state = doc(true, false, false, true);
        let admission = Admission {
            backend_ready: true,
            document: Some(&state),
            active: None,
            auto_verify: true,
        };
        assert_eq!(admission.check(&target, true), Err(Denial::NotActive));
    }
}
