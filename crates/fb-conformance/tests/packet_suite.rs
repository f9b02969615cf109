use fb_conformance::{
    CaseStatus, HarnessConfig, HarnessError, load_fixtures, run_packet_by_id, run_packet_suite,
    run_packets_grouped,
};

#[test]
fn every_packet_case_passes() {
    let report = run_packet_suite(&HarnessConfig::default_paths()).expect("suite should run");
    assert!(report.fixture_count >= 60, "fixtures went missing: {}", report.fixture_count);
    assert!(
        report.is_green(),
        "failing cases: {:#?}",
        report.failures()
    );
    assert_eq!(report.passed, report.fixture_count);
}

#[test]
fn packets_group_by_id_in_order() {
    let reports = run_packets_grouped(&HarnessConfig::default_paths()).expect("grouped");
    let ids: Vec<_> = reports
        .iter()
        .map(|r| r.packet_id.clone().expect("packet id"))
        .collect();
    assert_eq!(ids, ["FB-P1-001", "FB-P1-002", "FB-P1-003", "FB-P1-004"]);
    assert!(reports.iter().all(|r| r.is_green()));
}

#[test]
fn single_packet_filter_only_runs_that_packet() {
    let report =
        run_packet_by_id(&HarnessConfig::default_paths(), "FB-P1-004").expect("packet 004");
    assert!(report.results.iter().all(|r| r.packet_id == "FB-P1-004"));
    assert!(report.results.iter().all(|r| r.status == CaseStatus::Pass));
}

#[test]
fn unknown_packet_id_is_an_error() {
    let err = run_packet_by_id(&HarnessConfig::default_paths(), "FB-P9-999")
        .expect_err("no such packet");
    assert!(matches!(err, HarnessError::FixtureFormat(_)));
}

#[test]
fn rejected_cases_leave_evidence() {
    let report =
        run_packet_by_id(&HarnessConfig::default_paths(), "FB-P1-004").expect("packet 004");
    let case = |id: &str| {
        report
            .results
            .iter()
            .find(|r| r.case_id == id)
            .unwrap_or_else(|| panic!("missing case {id}"))
    };
    assert_eq!(case("unknown_operation").evidence_records, 1);
    assert_eq!(case("strict_rejects_text_in_sum").evidence_records, 1);
    assert_eq!(case("hardened_atof_prefix").evidence_records, 1);
    assert_eq!(case("strict_accepts_numbers").evidence_records, 0);
}

#[test]
fn fixture_case_ids_are_unique() {
    let fixtures = load_fixtures(&HarnessConfig::default_paths(), None).expect("fixtures");
    let mut ids: Vec<_> = fixtures
        .iter()
        .map(|f| (f.packet_id.as_str(), f.case_id.as_str()))
        .collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn report_serializes_to_json() {
    let report =
        run_packet_by_id(&HarnessConfig::default_paths(), "FB-P1-003").expect("packet 003");
    let json = report.to_json_pretty().expect("json");
    assert!(json.contains("\"packet_id\": \"FB-P1-003\""));
    assert!(json.contains("\"status\": \"pass\""));
}
