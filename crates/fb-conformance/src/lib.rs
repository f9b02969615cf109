#![forbid(unsafe_code)]

//! Fixture-packet conformance harness for the keylist aggregation engine.
//!
//! A packet is a JSON file under `fixtures/packets/` holding an array of
//! cases. Each case names a runtime mode, an operation (by its lookup-table
//! name, so unknown names can be exercised), the group's column values and
//! exactly one expectation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use fb_keylist::KeyList;
use fb_ops::{KeyListOps, OpsConfig, OpsError};
use fb_runtime::{RuntimeMode, RuntimePolicy};
use fb_types::{AggValue, ColumnIndex, TextRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative tolerance for numeric expectations (absolute below 1.0).
pub const NUMERIC_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
        }
    }

    #[must_use]
    pub fn packet_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("packets")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

fn default_column() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketFixture {
    pub packet_id: String,
    pub case_id: String,
    pub mode: RuntimeMode,
    pub operation: String,
    /// 1-based column to aggregate.
    #[serde(default = "default_column")]
    pub column: usize,
    /// Single-column group: one record per value.
    #[serde(default)]
    pub values: Option<Vec<String>>,
    /// Multi-column group, e.g. BED rows.
    #[serde(default)]
    pub rows: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub config: Option<OpsConfig>,
    #[serde(default)]
    pub expected_number: Option<f64>,
    #[serde(default)]
    pub expected_nan: Option<bool>,
    #[serde(default)]
    pub expected_count: Option<usize>,
    #[serde(default)]
    pub expected_text: Option<String>,
    #[serde(default)]
    pub expected_error_contains: Option<String>,
}

impl PacketFixture {
    #[must_use]
    pub fn records(&self) -> Vec<TextRecord> {
        match (&self.rows, &self.values) {
            (Some(rows), _) => rows
                .iter()
                .map(|row| TextRecord::new(row.clone()))
                .collect(),
            (None, Some(values)) => values
                .iter()
                .map(|value| TextRecord::new(vec![value.clone()]))
                .collect(),
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub packet_id: String,
    pub case_id: String,
    pub mode: RuntimeMode,
    pub operation: String,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    #[serde(default)]
    pub elapsed_us: u64,
    pub evidence_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketParityReport {
    pub suite: String,
    pub packet_id: Option<String>,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl PacketParityReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&CaseResult> {
        self.results
            .iter()
            .filter(|r| r.status == CaseStatus::Fail)
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String, HarnessError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
}

#[derive(Debug, Clone, PartialEq)]
enum ResolvedExpected {
    Number(f64),
    Nan,
    Count(usize),
    Text(String),
    ErrorContains(String),
}

pub fn run_packet_suite(config: &HarnessConfig) -> Result<PacketParityReport, HarnessError> {
    let fixtures = load_fixtures(config, None)?;
    run_fixtures("keylist_packets", None, &fixtures)
}

pub fn run_packet_by_id(
    config: &HarnessConfig,
    packet_id: &str,
) -> Result<PacketParityReport, HarnessError> {
    let fixtures = load_fixtures(config, Some(packet_id))?;
    if fixtures.is_empty() {
        return Err(HarnessError::FixtureFormat(format!(
            "no fixtures for packet {packet_id}"
        )));
    }
    run_fixtures(
        &format!("keylist_packets:{packet_id}"),
        Some(packet_id.to_owned()),
        &fixtures,
    )
}

pub fn run_packets_grouped(
    config: &HarnessConfig,
) -> Result<Vec<PacketParityReport>, HarnessError> {
    let fixtures = load_fixtures(config, None)?;
    let mut grouped = BTreeMap::<String, Vec<PacketFixture>>::new();
    for fixture in fixtures {
        grouped
            .entry(fixture.packet_id.clone())
            .or_default()
            .push(fixture);
    }

    let mut reports = Vec::with_capacity(grouped.len());
    for (packet_id, mut packet_fixtures) in grouped {
        packet_fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        reports.push(run_fixtures(
            &format!("keylist_packets:{packet_id}"),
            Some(packet_id),
            &packet_fixtures,
        )?);
    }
    Ok(reports)
}

pub fn run_fixtures(
    suite: &str,
    packet_id: Option<String>,
    fixtures: &[PacketFixture],
) -> Result<PacketParityReport, HarnessError> {
    let results = fixtures
        .iter()
        .map(run_fixture)
        .collect::<Result<Vec<_>, _>>()?;
    let failed = results
        .iter()
        .filter(|r| r.status == CaseStatus::Fail)
        .count();

    tracing::info!(
        target: "fb.conformance",
        suite,
        cases = results.len(),
        failed,
        "packet suite finished"
    );

    Ok(PacketParityReport {
        suite: suite.to_owned(),
        packet_id,
        fixture_count: fixtures.len(),
        passed: results.len() - failed,
        failed,
        results,
    })
}

pub fn run_fixture(fixture: &PacketFixture) -> Result<CaseResult, HarnessError> {
    let expected = resolve_expected(fixture)?;
    let column = ColumnIndex::one_based(fixture.column)
        .map_err(|err| HarnessError::FixtureFormat(format!("{}: {err}", fixture.case_id)))?;

    let group = KeyList::from_records(fixture.case_id.clone(), fixture.records());
    let mut ops = KeyListOps::with_group(&group, column)
        .with_policy(RuntimePolicy::for_mode(fixture.mode))
        .with_config(fixture.config.clone().unwrap_or_default());

    let start = Instant::now();
    let outcome = ops.run_named(&fixture.operation);
    let elapsed_us = start.elapsed().as_micros() as u64;

    let mismatch = compare(&expected, &outcome);
    if let Some(detail) = &mismatch {
        tracing::warn!(
            target: "fb.conformance",
            packet = %fixture.packet_id,
            case = %fixture.case_id,
            detail = %detail,
            "case mismatch"
        );
    }

    Ok(CaseResult {
        packet_id: fixture.packet_id.clone(),
        case_id: fixture.case_id.clone(),
        mode: fixture.mode,
        operation: fixture.operation.clone(),
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
        elapsed_us,
        evidence_records: ops.ledger().len(),
    })
}

pub fn load_fixtures(
    config: &HarnessConfig,
    packet_filter: Option<&str>,
) -> Result<Vec<PacketFixture>, HarnessError> {
    let mut paths = fs::read_dir(config.packet_fixture_root())?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|path| path.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    let mut fixtures = Vec::new();
    for path in &paths {
        fixtures.extend(
            load_packet_file(path)?
                .into_iter()
                .filter(|f| packet_filter.is_none_or(|id| f.packet_id == id)),
        );
    }
    Ok(fixtures)
}

fn load_packet_file(path: &Path) -> Result<Vec<PacketFixture>, HarnessError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn resolve_expected(fixture: &PacketFixture) -> Result<ResolvedExpected, HarnessError> {
    let mut candidates = Vec::new();
    if let Some(v) = fixture.expected_number {
        candidates.push(ResolvedExpected::Number(v));
    }
    if fixture.expected_nan == Some(true) {
        candidates.push(ResolvedExpected::Nan);
    }
    if let Some(n) = fixture.expected_count {
        candidates.push(ResolvedExpected::Count(n));
    }
    if let Some(text) = &fixture.expected_text {
        candidates.push(ResolvedExpected::Text(text.clone()));
    }
    if let Some(fragment) = &fixture.expected_error_contains {
        candidates.push(ResolvedExpected::ErrorContains(fragment.clone()));
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        n => Err(HarnessError::FixtureFormat(format!(
            "{}: expected exactly one expectation, found {n}",
            fixture.case_id
        ))),
    }
}

fn compare(expected: &ResolvedExpected, outcome: &Result<AggValue, OpsError>) -> Option<String> {
    let ok = match (expected, outcome) {
        (ResolvedExpected::Number(want), Ok(AggValue::Number(got))) => {
            (got - want).abs() <= NUMERIC_TOLERANCE * want.abs().max(1.0)
        }
        (ResolvedExpected::Nan, Ok(AggValue::Number(got))) => got.is_nan(),
        (ResolvedExpected::Count(want), Ok(value)) => value.as_count() == Some(*want),
        (ResolvedExpected::Text(want), Ok(value)) => value.as_text() == Some(want.as_str()),
        (ResolvedExpected::ErrorContains(fragment), Err(err)) => {
            err.to_string().contains(fragment.as_str())
        }
        _ => false,
    };
    if ok {
        None
    } else {
        Some(format!("expected {expected:?}, got {outcome:?}"))
    }
}
