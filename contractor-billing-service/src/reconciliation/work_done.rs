//! Contractor work-done ledger adjustments.
//!
//! A ledger record exists only while it holds at least one entry.
//! [`LedgerDraft::open`] and [`LedgerDraft::close`] are the only way in and
//! out, so an empty record is never handed to the store.

use crate::models::{OpsDone, WorkDone};
use crate::reconciliation::job_ops::LedgerAdjustment;
use crate::reconciliation::key::{format_rate, LEDGER_RATE_PRECISION};
use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use uuid::Uuid;

/// What an adjustment did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    Created,
    Incremented,
    Decremented,
    Removed,
    Skipped,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Incremented => "incremented",
            Self::Decremented => "decremented",
            Self::Removed => "removed",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of closing a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    Save(WorkDone),
    Delete { contractor_id: String, job_id: String },
    /// Opened empty, still empty: nothing to write.
    Discard,
}

/// Working copy of one (contractor, job) ledger.
#[derive(Debug, Clone)]
pub struct LedgerDraft {
    id: Option<String>,
    contractor_id: String,
    job_id: String,
    entries: Vec<OpsDone>,
    existed: bool,
}

fn same_rate(a: f64, b: f64) -> bool {
    format_rate(a, LEDGER_RATE_PRECISION) == format_rate(b, LEDGER_RATE_PRECISION)
}

impl LedgerDraft {
    /// Start from the stored record, or an empty one if there is none.
    pub fn open(contractor_id: &str, job_id: &str, existing: Option<WorkDone>) -> Self {
        match existing {
            Some(ledger) => Self {
                id: ledger.id,
                contractor_id: ledger.contractor_id,
                job_id: ledger.job_id,
                entries: ledger.ops_done,
                existed: true,
            },
            None => Self {
                id: None,
                contractor_id: contractor_id.to_string(),
                job_id: job_id.to_string(),
                entries: Vec::new(),
                existed: false,
            },
        }
    }

    pub fn entries(&self) -> &[OpsDone] {
        &self.entries
    }

    fn position_by_name(&self, ops_name: &str, value_per_book: f64) -> Option<usize> {
        let name = ops_name.trim();
        self.entries
            .iter()
            .position(|e| e.ops_name.trim() == name && same_rate(e.value_per_book, value_per_book))
    }

    /// Apply one edit-path delta, matched by `(opsName, valuePerBook@2)`.
    pub fn apply(&mut self, adjustment: &LedgerAdjustment, now: DateTime<Utc>) -> LedgerAction {
        let idx = self.position_by_name(&adjustment.ops_name, adjustment.value_per_book);
        self.adjust(idx, adjustment, now)
    }

    /// Take back `qty` units of a retracted bill line.
    ///
    /// Matches an entry carrying `ops_id`, or failing that by name and rate.
    pub fn release(
        &mut self,
        ops_id: &str,
        ops_name: &str,
        value_per_book: f64,
        qty: f64,
        now: DateTime<Utc>,
    ) -> LedgerAction {
        let idx = self
            .entries
            .iter()
            .position(|e| e.ops_id.as_deref() == Some(ops_id))
            .or_else(|| self.position_by_name(ops_name, value_per_book));

        let adjustment = LedgerAdjustment {
            ops_name: ops_name.to_string(),
            value_per_book,
            delta: -qty,
        };
        self.adjust(idx, &adjustment, now)
    }

    fn adjust(
        &mut self,
        idx: Option<usize>,
        adjustment: &LedgerAdjustment,
        now: DateTime<Utc>,
    ) -> LedgerAction {
        let delta = adjustment.delta;
        let stamp = Some(BsonDateTime::from_chrono(now));

        match idx {
            Some(i) if delta > 0.0 => {
                let entry = &mut self.entries[i];
                entry.ops_done_qty += delta;
                entry.completion_date = stamp;
                LedgerAction::Incremented
            }
            None if delta > 0.0 => {
                self.entries.push(OpsDone {
                    ops_id: None,
                    ops_name: adjustment.ops_name.trim().to_string(),
                    value_per_book: adjustment.value_per_book,
                    ops_done_qty: delta,
                    completion_date: stamp,
                });
                LedgerAction::Created
            }
            Some(i) if delta < 0.0 => {
                let new_done = self.entries[i].ops_done_qty + delta;
                if new_done <= 0.0 {
                    self.entries.remove(i);
                    LedgerAction::Removed
                } else {
                    let entry = &mut self.entries[i];
                    entry.ops_done_qty = new_done;
                    entry.completion_date = stamp;
                    LedgerAction::Decremented
                }
            }
            _ => LedgerAction::Skipped,
        }
    }

    /// Finish the draft: save it, delete the stored record, or drop it.
    pub fn close(self) -> LedgerOutcome {
        if !self.entries.is_empty() {
            return LedgerOutcome::Save(WorkDone {
                id: self.id.or_else(|| Some(Uuid::new_v4().to_string())),
                contractor_id: self.contractor_id,
                job_id: self.job_id,
                ops_done: self.entries,
            });
        }

        if self.existed {
            LedgerOutcome::Delete {
                contractor_id: self.contractor_id,
                job_id: self.job_id,
            }
        } else {
            LedgerOutcome::Discard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjustment(name: &str, vpb: f64, delta: f64) -> LedgerAdjustment {
        LedgerAdjustment {
            ops_name: name.to_string(),
            value_per_book: vpb,
            delta,
        }
    }

    fn stored(entries: Vec<(&str, Option<&str>, f64, f64)>) -> WorkDone {
        WorkDone {
            id: Some("wd-1".to_string()),
            contractor_id: "c-1".to_string(),
            job_id: "J1".to_string(),
            ops_done: entries
                .into_iter()
                .map(|(name, id, vpb, qty)| OpsDone {
                    ops_id: id.map(str::to_string),
                    ops_name: name.to_string(),
                    value_per_book: vpb,
                    ops_done_qty: qty,
                    completion_date: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_positive_delta_creates_entry_on_new_ledger() {
        let mut draft = LedgerDraft::open("c-1", "J1", None);
        let action = draft.apply(&adjustment("Drilling", 10.0, 3.0), Utc::now());
        assert_eq!(action, LedgerAction::Created);

        match draft.close() {
            LedgerOutcome::Save(ledger) => {
                assert!(ledger.id.is_some());
                assert_eq!(ledger.contractor_id, "c-1");
                assert_eq!(ledger.ops_done.len(), 1);
                assert_eq!(ledger.ops_done[0].ops_done_qty, 3.0);
                assert_eq!(ledger.ops_done[0].ops_id, None);
            }
            other => panic!("expected save, got {:?}", other),
        }
    }

    #[test]
    fn test_positive_delta_increments_existing_entry() {
        let existing = stored(vec![("Drilling", None, 10.0, 5.0)]);
        let mut draft = LedgerDraft::open("c-1", "J1", Some(existing));
        let action = draft.apply(&adjustment("Drilling", 10.001, 3.0), Utc::now());
        assert_eq!(action, LedgerAction::Incremented);
        assert_eq!(draft.entries()[0].ops_done_qty, 8.0);
        assert!(draft.entries()[0].completion_date.is_some());
    }

    #[test]
    fn test_negative_delta_decrements() {
        let existing = stored(vec![("Drilling", None, 10.0, 5.0)]);
        let mut draft = LedgerDraft::open("c-1", "J1", Some(existing));
        let action = draft.apply(&adjustment("Drilling", 10.0, -2.0), Utc::now());
        assert_eq!(action, LedgerAction::Decremented);
        assert_eq!(draft.entries()[0].ops_done_qty, 3.0);
    }

    #[test]
    fn test_negative_delta_to_zero_removes_entry_and_deletes_record() {
        let existing = stored(vec![("Drilling", None, 10.0, 3.0)]);
        let mut draft = LedgerDraft::open("c-1", "J1", Some(existing));
        let action = draft.apply(&adjustment("Drilling", 10.0, -3.0), Utc::now());
        assert_eq!(action, LedgerAction::Removed);
        assert_eq!(
            draft.close(),
            LedgerOutcome::Delete {
                contractor_id: "c-1".to_string(),
                job_id: "J1".to_string()
            }
        );
    }

    #[test]
    fn test_negative_delta_without_entry_is_noop() {
        let mut draft = LedgerDraft::open("c-1", "J1", None);
        let action = draft.apply(&adjustment("Drilling", 10.0, -3.0), Utc::now());
        assert_eq!(action, LedgerAction::Skipped);
        assert_eq!(draft.close(), LedgerOutcome::Discard);
    }

    #[test]
    fn test_rate_mismatch_is_a_different_entry() {
        let existing = stored(vec![("Drilling", None, 10.0, 5.0)]);
        let mut draft = LedgerDraft::open("c-1", "J1", Some(existing));
        draft.apply(&adjustment("Drilling", 12.0, 1.0), Utc::now());
        assert_eq!(draft.entries().len(), 2);
    }

    #[test]
    fn test_release_prefers_ops_id_match() {
        let mut draft = LedgerDraft::open(
            "c-1",
            "J1",
            Some(stored(vec![
                ("Drilling", None, 10.0, 5.0),
                ("Drilling (legacy)", Some("op-drill"), 9.0, 4.0),
            ])),
        );
        let action = draft.release("op-drill", "Drilling", 10.0, 1.0, Utc::now());
        assert_eq!(action, LedgerAction::Decremented);
        assert_eq!(draft.entries()[0].ops_done_qty, 5.0);
        assert_eq!(draft.entries()[1].ops_done_qty, 3.0);
    }

    #[test]
    fn test_release_falls_back_to_name_and_rate() {
        let existing = stored(vec![("Drilling", None, 10.0, 5.0)]);
        let mut draft = LedgerDraft::open("c-1", "J1", Some(existing));
        let action = draft.release("op-drill", "Drilling", 10.0, 5.0, Utc::now());
        assert_eq!(action, LedgerAction::Removed);
        assert!(draft.entries().is_empty());
    }
}
