#![forbid(unsafe_code)]

use std::{
    cmp::Reverse, collections::BTreeMap, fmt, mem::size_of, str::FromStr, sync::LazyLock,
};

use bumpalo::{Bump, collections::Vec as BumpVec};
use fb_keylist::{GroupCursor, KeyList};
use fb_runtime::{DecisionAction, EvidenceLedger, RuntimePolicy};
use fb_types::{AggValue, ColumnIndex, Record, TypeError, parse_numeric};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DELIMITER: &str = ",";
pub const DEFAULT_NULL_VALUE: &str = ".";
pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OpsError {
    #[error("invalid operation {name:?}")]
    InvalidOperation { name: String },
    #[error("{column} is out of range for a record with {width} fields")]
    ColumnOutOfRange { column: ColumnIndex, width: usize },
    #[error("non-numeric value {value:?} in {column} ({count} value(s) not numeric)")]
    NonNumeric {
        value: String,
        column: ColumnIndex,
        count: usize,
    },
    #[error("invalid ops config: {0}")]
    Config(String),
    #[error(transparent)]
    Type(#[from] TypeError),
}

// ---------------------------------------------------------------------------
// Operation codes and the name lookup table
// ---------------------------------------------------------------------------

/// One aggregation per variant. `Invalid` is what a failed name lookup
/// produces; dispatching it is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    Sum,
    Mean,
    Stddev,
    SampleStddev,
    Median,
    Mode,
    Antimode,
    Min,
    Max,
    Absmin,
    Absmax,
    Count,
    Distinct,
    CountDistinct,
    DistinctOnly,
    Collapse,
    Concat,
    FreqAsc,
    FreqDesc,
    First,
    Last,
    #[serde(other)]
    Invalid,
}

static OP_TABLE: LazyLock<BTreeMap<&'static str, OpCode>> =
    LazyLock::new(|| OpCode::ALL.iter().map(|op| (op.name(), *op)).collect());

impl OpCode {
    pub const ALL: [Self; 21] = [
        Self::Sum,
        Self::Mean,
        Self::Stddev,
        Self::SampleStddev,
        Self::Median,
        Self::Mode,
        Self::Antimode,
        Self::Min,
        Self::Max,
        Self::Absmin,
        Self::Absmax,
        Self::Count,
        Self::Distinct,
        Self::CountDistinct,
        Self::DistinctOnly,
        Self::Collapse,
        Self::Concat,
        Self::FreqAsc,
        Self::FreqDesc,
        Self::First,
        Self::Last,
    ];

    /// Exact-match lookup; unknown names map to [`OpCode::Invalid`].
    #[must_use]
    pub fn lookup(name: &str) -> Self {
        OP_TABLE.get(name).copied().unwrap_or(Self::Invalid)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Stddev => "stddev",
            Self::SampleStddev => "sample_stddev",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Antimode => "antimode",
            Self::Min => "min",
            Self::Max => "max",
            Self::Absmin => "absmin",
            Self::Absmax => "absmax",
            Self::Count => "count",
            Self::Distinct => "distinct",
            Self::CountDistinct => "count_distinct",
            Self::DistinctOnly => "distinct_only",
            Self::Collapse => "collapse",
            Self::Concat => "concat",
            Self::FreqAsc => "freq_asc",
            Self::FreqDesc => "freq_desc",
            Self::First => "first",
            Self::Last => "last",
            Self::Invalid => "invalid",
        }
    }

    /// Operations whose result is a number parsed from the column text.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Sum
                | Self::Mean
                | Self::Stddev
                | Self::SampleStddev
                | Self::Median
                | Self::Min
                | Self::Max
                | Self::Absmin
                | Self::Absmax
        )
    }

    #[must_use]
    pub fn is_count(self) -> bool {
        matches!(self, Self::Count | Self::CountDistinct)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpCode {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::lookup(s) {
            Self::Invalid => Err(OpsError::InvalidOperation { name: s.to_owned() }),
            op => Ok(op),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Sort the median buffer in a bump arena instead of the global allocator.
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub delimiter: String,
    pub null_value: String,
    pub execution: ExecutionOptions,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_owned(),
            null_value: DEFAULT_NULL_VALUE.to_owned(),
            execution: ExecutionOptions::default(),
        }
    }
}

impl OpsConfig {
    pub fn from_json_str(input: &str) -> Result<Self, OpsError> {
        serde_json::from_str(input).map_err(|err| OpsError::Config(err.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Frequency table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Unsorted,
    Ascending,
    Descending,
}

/// Distinct column text -> occurrence count.
///
/// Iterates in ascending byte order of the text. Every tie-break in this crate
/// (mode, antimode, equal counts in a histogram) falls out of that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable<'a> {
    counts: BTreeMap<&'a str, usize>,
}

impl<'a> FrequencyTable<'a> {
    pub fn build<R: Record>(records: &'a [R], column: ColumnIndex) -> Result<Self, OpsError> {
        let mut counts = BTreeMap::new();
        for record in GroupCursor::over(records) {
            *counts.entry(column_text(record, column)?).or_insert(0) += 1;
        }
        Ok(Self { counts })
    }

    #[must_use]
    pub fn from_values<I: IntoIterator<Item = &'a str>>(values: I) -> Self {
        let mut counts = BTreeMap::new();
        for value in values {
            *counts.entry(value).or_insert(0) += 1;
        }
        Self { counts }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn count_of(&self, value: &str) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, usize)> + '_ {
        self.counts.iter().map(|(&value, &count)| (value, count))
    }

    pub fn values(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.counts.keys().copied()
    }

    /// Values seen exactly once.
    pub fn singletons(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.iter()
            .filter(|&(_, count)| count == 1)
            .map(|(value, _)| value)
    }

    #[must_use]
    pub fn mode(&self) -> Option<&'a str> {
        self.pick(|count, best| count > best)
    }

    #[must_use]
    pub fn antimode(&self) -> Option<&'a str> {
        self.pick(|count, best| count < best)
    }

    /// First value in table order whose count beats every earlier one.
    fn pick(&self, beats: impl Fn(usize, usize) -> bool) -> Option<&'a str> {
        let mut best: Option<(&'a str, usize)> = None;
        for (value, count) in self.iter() {
            if best.is_none_or(|(_, top)| beats(count, top)) {
                best = Some((value, count));
            }
        }
        best.map(|(value, _)| value)
    }

    /// `(value, count)` pairs ordered by count; the sort is stable, so equal
    /// counts keep table order.
    #[must_use]
    pub fn histogram(&self, order: SortOrder) -> Vec<(&'a str, usize)> {
        let mut entries: Vec<_> = self.iter().collect();
        match order {
            SortOrder::Ascending => entries.sort_by_key(|&(_, count)| count),
            SortOrder::Descending => entries.sort_by_key(|&(_, count)| Reverse(count)),
            SortOrder::Unsorted => {}
        }
        entries
    }
}

// ---------------------------------------------------------------------------
// Aggregation engine
// ---------------------------------------------------------------------------

/// Computes one statistic per call over a column of the attached group.
///
/// Construct unattached with [`KeyListOps::new`] (every operation then behaves
/// as on an empty group) or attached with [`KeyListOps::with_group`]. The
/// engine borrows the group; it never copies or mutates records.
///
/// Empty-group results: numeric operations return `NaN`, textual operations
/// return the null-value marker, counts return `0`.
///
/// Text results borrow engine scratch space and live until the next `&mut`
/// call on the engine.
///
/// The evidence ledger covers the currently attached group only: attaching
/// clears it, and it holds at most its capacity of records.
pub struct KeyListOps<'a, R> {
    records: &'a [R],
    attached: bool,
    column: ColumnIndex,
    config: OpsConfig,
    policy: RuntimePolicy,
    ledger: EvidenceLedger,
    scratch: String,
}

impl<R: Record> Default for KeyListOps<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R: Record> KeyListOps<'a, R> {
    /// Unattached engine: empty group, first column, hardened numeric policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: &[],
            attached: false,
            column: ColumnIndex::FIRST,
            config: OpsConfig::default(),
            policy: RuntimePolicy::hardened(None),
            ledger: EvidenceLedger::new(),
            scratch: String::new(),
        }
    }

    #[must_use]
    pub fn with_group(group: &'a KeyList<R>, column: ColumnIndex) -> Self {
        Self::with_records(group.records(), column)
    }

    #[must_use]
    pub fn with_records(records: &'a [R], column: ColumnIndex) -> Self {
        let mut ops = Self::new();
        ops.attach_records(records, column);
        ops
    }

    #[must_use]
    pub fn with_config(mut self, config: OpsConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RuntimePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the ledger, e.g. with [`EvidenceLedger::unbounded`].
    #[must_use]
    pub fn with_ledger(mut self, ledger: EvidenceLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn attach(&mut self, group: &'a KeyList<R>, column: ColumnIndex) {
        self.attach_records(group.records(), column);
    }

    pub fn attach_records(&mut self, records: &'a [R], column: ColumnIndex) {
        self.records = records;
        self.column = column;
        self.attached = true;
        self.ledger.clear();
    }

    pub fn set_column(&mut self, column: ColumnIndex) {
        self.column = column;
    }

    pub fn set_column_number(&mut self, column: usize) -> Result<(), OpsError> {
        self.column = ColumnIndex::one_based(column)?;
        Ok(())
    }

    #[must_use]
    pub fn column(&self) -> ColumnIndex {
        self.column
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn set_delimiter(&mut self, delimiter: impl Into<String>) {
        self.config.delimiter = delimiter.into();
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.config.delimiter
    }

    pub fn set_null_value(&mut self, null_value: impl Into<String>) {
        self.config.null_value = null_value.into();
    }

    #[must_use]
    pub fn null_value(&self) -> &str {
        &self.config.null_value
    }

    #[must_use]
    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: OpsConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn policy(&self) -> &RuntimePolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: RuntimePolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn ledger(&self) -> &EvidenceLedger {
        &self.ledger
    }

    /// Hand the ledger to the caller, leaving an empty one of the same
    /// capacity behind.
    pub fn take_ledger(&mut self) -> EvidenceLedger {
        let fresh = match self.ledger.capacity() {
            Some(capacity) => EvidenceLedger::with_capacity(capacity),
            None => EvidenceLedger::unbounded(),
        };
        std::mem::replace(&mut self.ledger, fresh)
    }

    // -- dispatch ----------------------------------------------------------

    pub fn run(&mut self, op: OpCode) -> Result<AggValue, OpsError> {
        tracing::debug!(
            target: "fb.ops",
            op = %op,
            records = self.records.len(),
            column = %self.column,
            "aggregate"
        );
        let value = match op {
            OpCode::Sum => AggValue::Number(self.sum()?),
            OpCode::Mean => AggValue::Number(self.mean()?),
            OpCode::Stddev => AggValue::Number(self.stddev()?),
            OpCode::SampleStddev => AggValue::Number(self.sample_stddev()?),
            OpCode::Median => AggValue::Number(self.median()?),
            OpCode::Min => AggValue::Number(self.min()?),
            OpCode::Max => AggValue::Number(self.max()?),
            OpCode::Absmin => AggValue::Number(self.absmin()?),
            OpCode::Absmax => AggValue::Number(self.absmax()?),
            OpCode::Count => AggValue::Count(self.count()),
            OpCode::CountDistinct => AggValue::Count(self.count_distinct()?),
            OpCode::Mode => AggValue::Text(self.mode()?.to_owned()),
            OpCode::Antimode => AggValue::Text(self.antimode()?.to_owned()),
            OpCode::Distinct => AggValue::Text(self.distinct()?.to_owned()),
            OpCode::DistinctOnly => AggValue::Text(self.distinct_only()?.to_owned()),
            OpCode::Collapse => AggValue::Text(self.collapse()?.to_owned()),
            OpCode::Concat => AggValue::Text(self.concat()?.to_owned()),
            OpCode::FreqAsc => AggValue::Text(self.freq_asc()?.to_owned()),
            OpCode::FreqDesc => AggValue::Text(self.freq_desc()?.to_owned()),
            OpCode::First => AggValue::Text(self.first()?.to_owned()),
            OpCode::Last => AggValue::Text(self.last()?.to_owned()),
            OpCode::Invalid => return Err(self.reject_operation(op.name())),
        };
        Ok(value)
    }

    pub fn run_named(&mut self, name: &str) -> Result<AggValue, OpsError> {
        match OpCode::lookup(name) {
            OpCode::Invalid => Err(self.reject_operation(name)),
            op => self.run(op),
        }
    }

    /// Run `op` and format the result for an output column.
    pub fn render(&mut self, op: OpCode) -> Result<String, OpsError> {
        let value = self.run(op)?;
        Ok(value.render(&self.config.null_value))
    }

    fn reject_operation(&mut self, name: &str) -> OpsError {
        self.policy.decide_unknown_operation(name, &mut self.ledger);
        tracing::warn!(target: "fb.ops", name, "unknown aggregation operation");
        OpsError::InvalidOperation {
            name: name.to_owned(),
        }
    }

    // -- numeric -----------------------------------------------------------

    pub fn sum(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        self.fold_numeric(0.0, |acc, v| acc + v)
    }

    pub fn mean(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(self.sum()? / self.count() as f64)
    }

    /// Population variance: squared deviations from the mean divided by N.
    pub fn stddev(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(self.squared_deviation_sum()? / self.count() as f64)
    }

    /// Sample variance: squared deviations divided by N - 1. A single-record
    /// group yields NaN.
    pub fn sample_stddev(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(self.squared_deviation_sum()? / (self.count() as f64 - 1.0))
    }

    pub fn median(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        let n = self.count();
        let exec = self.config.execution;
        if exec.use_arena && n.saturating_mul(size_of::<f64>()) <= exec.arena_budget_bytes {
            let arena = Bump::new();
            let mut values = BumpVec::with_capacity_in(n, &arena);
            self.fold_numeric((), |(), v| values.push(v))?;
            sort_numbers(&mut values, SortOrder::Ascending);
            return Ok(middle_of(&values));
        }
        let values = self.sorted_numbers(SortOrder::Ascending)?;
        Ok(middle_of(&values))
    }

    pub fn min(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        self.fold_numeric(f64::INFINITY, f64::min)
    }

    pub fn max(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        self.fold_numeric(f64::NEG_INFINITY, f64::max)
    }

    pub fn absmin(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        self.fold_numeric(f64::INFINITY, |acc, v| acc.min(v.abs()))
    }

    pub fn absmax(&mut self) -> Result<f64, OpsError> {
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        self.fold_numeric(f64::NEG_INFINITY, |acc, v| acc.max(v.abs()))
    }

    /// Column values as numbers, in `order`. Empty for an empty group.
    pub fn sorted_numbers(&mut self, order: SortOrder) -> Result<Vec<f64>, OpsError> {
        let mut values = Vec::with_capacity(self.count());
        self.fold_numeric((), |(), v| values.push(v))?;
        sort_numbers(&mut values, order);
        Ok(values)
    }

    fn squared_deviation_sum(&mut self) -> Result<f64, OpsError> {
        let mean = self.mean()?;
        self.fold_numeric(0.0, |acc, v| {
            let diff = v - mean;
            acc + diff * diff
        })
    }

    /// One pass over the group reading the column as numbers. Text that is not
    /// exactly a number is settled with the runtime policy once the pass ends.
    fn fold_numeric<T>(
        &mut self,
        init: T,
        mut step: impl FnMut(T, f64) -> T,
    ) -> Result<T, OpsError> {
        let records = self.records;
        let column = self.column;
        let mut acc = init;
        let mut repaired = 0_usize;
        let mut first_bad: Option<&'a str> = None;

        for record in GroupCursor::over(records) {
            let text = column_text(record, column)?;
            let parsed = parse_numeric(text);
            if !parsed.is_exact() {
                repaired += 1;
                if first_bad.is_none() {
                    first_bad = Some(text);
                }
            }
            acc = step(acc, parsed.lenient_value());
        }

        if let Some(first) = first_bad {
            self.settle_repairs(first, repaired)?;
        }
        Ok(acc)
    }

    fn settle_repairs(&mut self, first_value: &str, repaired: usize) -> Result<(), OpsError> {
        let action = self.policy.decide_non_numeric(
            self.column.to_string(),
            first_value,
            repaired,
            &mut self.ledger,
        );
        if action == DecisionAction::Reject {
            tracing::warn!(
                target: "fb.ops",
                column = %self.column,
                repaired,
                value = first_value,
                "rejected non-numeric column values"
            );
            return Err(OpsError::NonNumeric {
                value: first_value.to_owned(),
                column: self.column,
                count: repaired,
            });
        }
        tracing::debug!(
            target: "fb.ops",
            column = %self.column,
            repaired,
            "non-numeric column values read with atof fallback"
        );
        Ok(())
    }

    // -- counts ------------------------------------------------------------

    #[must_use]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn count_distinct(&self) -> Result<usize, OpsError> {
        if self.is_empty() {
            return Ok(0);
        }
        Ok(FrequencyTable::build(self.records, self.column)?.len())
    }

    // -- textual -----------------------------------------------------------

    /// Most frequent value; ties go to the lexically smallest.
    pub fn mode(&self) -> Result<&str, OpsError> {
        if self.is_empty() {
            return Ok(self.config.null_value.as_str());
        }
        let table = FrequencyTable::build(self.records, self.column)?;
        Ok(table.mode().unwrap_or(self.config.null_value.as_str()))
    }

    /// Least frequent value; ties go to the lexically smallest.
    pub fn antimode(&self) -> Result<&str, OpsError> {
        if self.is_empty() {
            return Ok(self.config.null_value.as_str());
        }
        let table = FrequencyTable::build(self.records, self.column)?;
        Ok(table.antimode().unwrap_or(self.config.null_value.as_str()))
    }

    pub fn distinct(&mut self) -> Result<&str, OpsError> {
        if self.is_empty() {
            return Ok(self.config.null_value.as_str());
        }
        let table = FrequencyTable::build(self.records, self.column)?;
        join_into(&mut self.scratch, table.values(), &self.config.delimiter);
        Ok(self.scratch.as_str())
    }

    /// Values occurring exactly once. Empty text when every value repeats.
    pub fn distinct_only(&mut self) -> Result<&str, OpsError> {
        if self.is_empty() {
            return Ok(self.config.null_value.as_str());
        }
        let table = FrequencyTable::build(self.records, self.column)?;
        join_into(&mut self.scratch, table.singletons(), &self.config.delimiter);
        Ok(self.scratch.as_str())
    }

    pub fn collapse(&mut self) -> Result<&str, OpsError> {
        if self.is_empty() {
            return Ok(self.config.null_value.as_str());
        }
        let texts = self.texts()?;
        join_into(&mut self.scratch, texts, &self.config.delimiter);
        Ok(self.scratch.as_str())
    }

    /// Like [`collapse`](Self::collapse) with an empty delimiter. The
    /// configured delimiter is left untouched.
    pub fn concat(&mut self) -> Result<&str, OpsError> {
        if self.is_empty() {
            return Ok(self.config.null_value.as_str());
        }
        let texts = self.texts()?;
        join_into(&mut self.scratch, texts, "");
        Ok(self.scratch.as_str())
    }

    pub fn freq_desc(&mut self) -> Result<&str, OpsError> {
        self.frequency_listing(SortOrder::Descending)
    }

    pub fn freq_asc(&mut self) -> Result<&str, OpsError> {
        self.frequency_listing(SortOrder::Ascending)
    }

    pub fn first(&self) -> Result<&str, OpsError> {
        match self.records.first() {
            Some(record) => column_text(record, self.column),
            None => Ok(self.config.null_value.as_str()),
        }
    }

    pub fn last(&self) -> Result<&str, OpsError> {
        match self.records.last() {
            Some(record) => column_text(record, self.column),
            None => Ok(self.config.null_value.as_str()),
        }
    }

    /// Column text in `order` (byte-lexical when sorted). Empty for an empty
    /// group.
    pub fn sorted_values(&self, order: SortOrder) -> Result<Vec<&'a str>, OpsError> {
        let mut texts = self.texts()?;
        match order {
            SortOrder::Ascending => texts.sort_unstable(),
            SortOrder::Descending => texts.sort_unstable_by(|a, b| b.cmp(a)),
            SortOrder::Unsorted => {}
        }
        Ok(texts)
    }

    fn frequency_listing(&mut self, order: SortOrder) -> Result<&str, OpsError> {
        if self.is_empty() {
            return Ok(self.config.null_value.as_str());
        }
        let table = FrequencyTable::build(self.records, self.column)?;
        self.scratch.clear();
        for (i, (value, count)) in table.histogram(order).into_iter().enumerate() {
            if i > 0 {
                self.scratch.push_str(&self.config.delimiter);
            }
            self.scratch.push_str(value);
            self.scratch.push(':');
            self.scratch.push_str(&count.to_string());
        }
        Ok(self.scratch.as_str())
    }

    fn texts(&self) -> Result<Vec<&'a str>, OpsError> {
        let column = self.column;
        GroupCursor::over(self.records)
            .map(|record| column_text(record, column))
            .collect()
    }
}

fn column_text<R: Record>(record: &R, column: ColumnIndex) -> Result<&str, OpsError> {
    record
        .field(column.get())
        .ok_or_else(|| OpsError::ColumnOutOfRange {
            column,
            width: record.width(),
        })
}

fn join_into<'v>(buf: &mut String, parts: impl IntoIterator<Item = &'v str>, delimiter: &str) {
    buf.clear();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            buf.push_str(delimiter);
        }
        buf.push_str(part);
    }
}

fn sort_numbers(values: &mut [f64], order: SortOrder) {
    match order {
        SortOrder::Ascending => values.sort_unstable_by(f64::total_cmp),
        SortOrder::Descending => values.sort_unstable_by(|a, b| b.total_cmp(a)),
        SortOrder::Unsorted => {}
    }
}

/// Middle element, or the mean of the two middle elements; `sorted` must be
/// non-empty.
fn middle_of(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len().is_multiple_of(2) {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
