//! Compaction pass: one tail-to-head scan that rewrites stale tasks to
//! `NoOp` and folds markers and stops into a summary for the head pass.
//!
//! Rules, in scan order (newest first):
//! - markers are read into the summary, then consumed
//! - a `Clear` disables every earlier task except a blocking head
//! - only the newest `Verify` survives; an older one for the same target
//!   hands its manual flag to the survivor
//! - a `Verify` followed by a completion for its target is pointless
//! - a `Stop` is folded into `stop_requested` and disables every earlier
//!   non-blocking task
//!
//! Running the pass twice in a row changes nothing the second time.

use std::collections::{HashSet, VecDeque};

use super::TaskRecord;
use crate::domain::{DocumentUri, TaskId, TaskKind, VerificationOutcome};

/// What the head pass needs to know after compaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compaction {
    pub stop_requested: bool,
    pub stop_manually_triggered: bool,

    /// Newest surviving `Verify`.
    pub latest_verify: Option<(TaskId, DocumentUri)>,

    /// Completion and failure markers, newest first.
    pub completions: Vec<(DocumentUri, VerificationOutcome)>,

    pub stopping_complete: bool,

    /// Tasks this pass turned into `NoOp`.
    pub disabled: usize,
}

impl Compaction {
    pub fn completion_for(&self, uri: &DocumentUri) -> Option<&VerificationOutcome> {
        self.completions
            .iter()
            .find(|(target, _)| target == uri)
            .map(|(_, outcome)| outcome)
    }

    /// A newer `Verify` targets a different document than `uri`.
    pub fn superseded_by_other(&self, uri: &DocumentUri) -> bool {
        self.latest_verify
            .as_ref()
            .is_some_and(|(_, target)| target != uri)
    }
}

pub fn compact(tasks: &mut VecDeque<TaskRecord>) -> Compaction {
    let mut summary = Compaction::default();
    let mut clear_seen = false;
    let mut survivor: Option<usize> = None;
    let mut completed: HashSet<DocumentUri> = HashSet::new();

    for i in (0..tasks.len()).rev() {
        let kind = tasks[i].kind;
        if kind.is_noop() {
            continue;
        }

        if kind.is_marker() {
            if kind == TaskKind::StoppingComplete {
                summary.stopping_complete = true;
            } else if let Some(uri) = tasks[i].target.clone() {
                let outcome = tasks[i]
                    .outcome()
                    .cloned()
                    .unwrap_or_else(VerificationOutcome::failed);
                completed.insert(uri.clone());
                summary.completions.push((uri, outcome));
            }
            disable(tasks, i, &mut summary);
            continue;
        }

        // 実行中のタスクは Clear / Stop でも飛ばさない
        if kind.is_blocking() {
            continue;
        }

        if kind == TaskKind::Stop && !clear_seen {
            summary.stop_requested = true;
            summary.stop_manually_triggered |= tasks[i].manually_triggered;
            disable(tasks, i, &mut summary);
            continue;
        }

        if clear_seen || summary.stop_requested {
            disable(tasks, i, &mut summary);
            if kind == TaskKind::Clear {
                clear_seen = true;
            }
            continue;
        }

        match kind {
            TaskKind::Clear => clear_seen = true,
            TaskKind::Verify => match survivor {
                Some(newer) => {
                    if tasks[i].manually_triggered && tasks[newer].target == tasks[i].target {
                        tasks[newer].manually_triggered = true;
                    }
                    disable(tasks, i, &mut summary);
                }
                None => {
                    survivor = Some(i);
                    let id = tasks[i].id;
                    match tasks[i].target.clone() {
                        Some(uri) if completed.contains(&uri) => {
                            disable(tasks, i, &mut summary)
                        }
                        Some(uri) => summary.latest_verify = Some((id, uri)),
                        None => {}
                    }
                }
            },
            _ => {}
        }
    }

    summary
}

fn disable(tasks: &mut VecDeque<TaskRecord>, i: usize, summary: &mut Compaction) {
    tasks[i].disable();
    summary.disabled += 1;
}
