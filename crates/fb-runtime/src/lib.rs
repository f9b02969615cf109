#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Strict,
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Reject,
    Repair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnknownOperation,
    NonNumericValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub ts_unix_ms: u64,
    pub mode: RuntimeMode,
    pub action: DecisionAction,
    pub issue: CompatibilityIssue,
    /// Number of values the decision covers (e.g. repaired cells in one pass).
    pub affected: usize,
}

/// Records kept by a ledger built with [`EvidenceLedger::new`] (unbounded ledgers
/// come from [`EvidenceLedger::unbounded`]).
pub const DEFAULT_LEDGER_CAPACITY: usize = 1024;

/// Decision records, oldest first.
///
/// Once `capacity` records are held, further decisions are only counted in
/// `dropped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLedger {
    records: Vec<DecisionRecord>,
    capacity: Option<usize>,
    dropped: usize,
}

impl Default for EvidenceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity: Some(capacity),
            dropped: 0,
        }
    }

    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            records: Vec::new(),
            capacity: None,
            dropped: 0,
        }
    }

    pub fn push(&mut self, record: DecisionRecord) {
        if self.is_full() {
            self.dropped += 1;
        } else {
            self.records.push(record);
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|capacity| self.records.len() >= capacity)
    }

    /// Forget every record and the dropped count; capacity is kept.
    pub fn clear(&mut self) {
        self.records.clear();
        self.dropped = 0;
    }

    #[must_use]
    pub fn records(&self) -> &[DecisionRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Decisions made while the ledger was full.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn count_action(&self, action: DecisionAction) -> usize {
        self.records.iter().filter(|r| r.action == action).count()
    }
}

/// How the aggregation engine treats column text that is not a number, and
/// operation names it does not know.
///
/// Strict fails closed on any non-numeric cell. Hardened repairs it to its
/// `atof` value (leading numeric prefix, else zero), optionally refusing once a
/// single pass needs more than `hardened_repair_cap` repairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePolicy {
    pub mode: RuntimeMode,
    pub hardened_repair_cap: Option<usize>,
}

impl RuntimePolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
            hardened_repair_cap: None,
        }
    }

    #[must_use]
    pub fn hardened(repair_cap: Option<usize>) -> Self {
        Self {
            mode: RuntimeMode::Hardened,
            hardened_repair_cap: repair_cap,
        }
    }

    #[must_use]
    pub fn for_mode(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::Strict => Self::strict(),
            RuntimeMode::Hardened => Self::hardened(None),
        }
    }

    pub fn decide_non_numeric(
        &self,
        subject: impl Into<String>,
        first_value: &str,
        repaired: usize,
        ledger: &mut EvidenceLedger,
    ) -> DecisionAction {
        let cap = self.hardened_repair_cap.unwrap_or(usize::MAX);
        let action = match self.mode {
            RuntimeMode::Strict => DecisionAction::Reject,
            RuntimeMode::Hardened if repaired > cap => DecisionAction::Reject,
            RuntimeMode::Hardened => DecisionAction::Repair,
        };
        self.record(action, repaired, ledger, || CompatibilityIssue {
            kind: IssueKind::NonNumericValue,
            subject: subject.into(),
            detail: format!("first_value={first_value:?} repaired={repaired} cap={cap}"),
        })
    }

    /// Unknown operations are never guessed at, in either mode.
    pub fn decide_unknown_operation(
        &self,
        name: &str,
        ledger: &mut EvidenceLedger,
    ) -> DecisionAction {
        self.record(DecisionAction::Reject, 1, ledger, || CompatibilityIssue {
            kind: IssueKind::UnknownOperation,
            subject: "operation".to_owned(),
            detail: format!("name={name:?}"),
        })
    }

    /// The issue is only built when the ledger has room for it.
    fn record(
        &self,
        action: DecisionAction,
        affected: usize,
        ledger: &mut EvidenceLedger,
        issue: impl FnOnce() -> CompatibilityIssue,
    ) -> DecisionAction {
        if ledger.is_full() {
            ledger.dropped += 1;
            return action;
        }
        let issue = issue();
        tracing::debug!(
            target: "fb.runtime",
            mode = ?self.mode,
            action = ?action,
            kind = ?issue.kind,
            subject = %issue.subject,
            affected,
            "policy decision"
        );
        ledger.push(DecisionRecord {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            mode: self.mode,
            action,
            issue,
            affected,
        });
        action
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::strict()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
}

fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_LEDGER_CAPACITY, DecisionAction, EvidenceLedger, IssueKind, RuntimeMode,
        RuntimePolicy,
    };

    #[test]
    fn strict_mode_rejects_non_numeric() {
        let mut ledger = EvidenceLedger::new();
        let action = RuntimePolicy::strict().decide_non_numeric("column 5", "abc", 1, &mut ledger);
        assert_eq!(action, DecisionAction::Reject);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records()[0].issue.kind, IssueKind::NonNumericValue);
        assert_eq!(ledger.records()[0].mode, RuntimeMode::Strict);
    }

    #[test]
    fn hardened_mode_repairs_within_cap() {
        let mut ledger = EvidenceLedger::new();
        let policy = RuntimePolicy::hardened(Some(2));
        assert_eq!(
            policy.decide_non_numeric("column 5", "x", 2, &mut ledger),
            DecisionAction::Repair
        );
        assert_eq!(
            policy.decide_non_numeric("column 5", "x", 3, &mut ledger),
            DecisionAction::Reject
        );
        assert_eq!(ledger.count_action(DecisionAction::Repair), 1);
        assert_eq!(ledger.count_action(DecisionAction::Reject), 1);
        assert_eq!(ledger.records()[1].affected, 3);
    }

    #[test]
    fn hardened_without_cap_always_repairs() {
        let mut ledger = EvidenceLedger::new();
        let action = RuntimePolicy::hardened(None).decide_non_numeric(
            "column 1",
            "n/a",
            usize::MAX,
            &mut ledger,
        );
        assert_eq!(action, DecisionAction::Repair);
    }

    #[test]
    fn unknown_operation_is_rejected_in_both_modes() {
        let mut ledger = EvidenceLedger::new();
        for mode in [RuntimeMode::Strict, RuntimeMode::Hardened] {
            let action = RuntimePolicy::for_mode(mode).decide_unknown_operation("avg", &mut ledger);
            assert_eq!(action, DecisionAction::Reject);
        }
        assert_eq!(ledger.len(), 2);
        assert!(ledger.records()[0].issue.detail.contains("\"avg\""));
    }

    #[test]
    fn default_policy_is_strict() {
        assert_eq!(RuntimePolicy::default(), RuntimePolicy::strict());
        assert!(EvidenceLedger::default().is_empty());
        assert_eq!(
            EvidenceLedger::default().capacity(),
            Some(DEFAULT_LEDGER_CAPACITY)
        );
    }

    #[test]
    fn full_ledger_counts_instead_of_growing() {
        let mut ledger = EvidenceLedger::with_capacity(2);
        let policy = RuntimePolicy::hardened(None);
        for _ in 0..5 {
            policy.decide_non_numeric("column 5", ".", 1, &mut ledger);
        }
        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_full());
        assert_eq!(ledger.dropped(), 3);

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.dropped(), 0);
        assert_eq!(ledger.capacity(), Some(2));
    }

    #[test]
    fn full_ledger_still_returns_the_decision() {
        let mut ledger = EvidenceLedger::with_capacity(0);
        assert_eq!(
            RuntimePolicy::strict().decide_non_numeric("column 1", "x", 1, &mut ledger),
            DecisionAction::Reject
        );
        assert!(ledger.is_empty());
        assert_eq!(ledger.dropped(), 1);
    }

    #[test]
    fn unbounded_ledger_keeps_everything() {
        let mut ledger = EvidenceLedger::unbounded();
        let policy = RuntimePolicy::strict();
        for _ in 0..(DEFAULT_LEDGER_CAPACITY + 10) {
            policy.decide_unknown_operation("avg", &mut ledger);
        }
        assert_eq!(ledger.len(), DEFAULT_LEDGER_CAPACITY + 10);
        assert_eq!(ledger.dropped(), 0);
    }
}
