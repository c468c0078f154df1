// ==========================================
// 分配全流程集成测试
// ==========================================
// 覆盖: 座位守恒、容量约束、志愿尊重、就近分班、重复运行
// ==========================================


use elective_allotment::domain::{RunStatus, SECTION_CAPACITY};
use elective_allotment::logging;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

use test_helpers::*;

#[test]
fn test_140_seats_150_students_spill_to_second_choice() {
    logging::init_test();
    let (_tmp, state) = create_test_state();
    seed_uniform_scenario(&state, &[("C1", 140), ("C2", 70)], 150, &["C1", "C2"]);

    let report = state
        .allotment_api
        .run_allotment("S1", "test", &CancellationToken::new())
        .expect("run failed");

    assert_eq!(report.allotted_count, 150);
    assert!(report.unallotted.is_empty());
    assert_eq!(report.sections_created, 3);

    let records = state.allotment_api.get_allotments("S1", None).unwrap();
    assert_eq!(records.len(), 150);
    let in_c1 = records.iter().filter(|r| r.target_id == "C1").count();
    assert_eq!(in_c1, 140);

    // 每班不超过容量
    let mut per_section: HashMap<&str, u32> = HashMap::new();
    for r in &records {
        *per_section.entry(r.section_id.as_str()).or_insert(0) += 1;
    }
    assert!(per_section.values().all(|&n| n <= SECTION_CAPACITY));
    assert_eq!(per_section.get("S1:C1:A"), Some(&70));
    assert_eq!(per_section.get("S1:C1:B"), Some(&70));
}

#[test]
fn test_single_course_140_seats_150_students() {
    let (_tmp, state) = create_test_state();
    seed_uniform_scenario(&state, &[("C", 140)], 150, &["C"]);

    let report = state
        .allotment_api
        .run_allotment("S1", "test", &CancellationToken::new())
        .unwrap();

    assert_eq!(report.allotted_count, 140);
    assert_eq!(report.unallotted.len(), 10);
    assert_eq!(report.sections_created, 2);

    let records = state.allotment_api.get_allotments("S1", None).unwrap();
    let in_a = records.iter().filter(|r| r.section_id == "S1:C:A").count();
    let in_b = records.iter().filter(|r| r.section_id == "S1:C:B").count();
    assert_eq!((in_a, in_b), (70, 70));

    let summary = state.allotment_api.seat_summary("S1").unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].available_seats, 0);
    assert_eq!(summary[0].allotted, 140);
    assert_eq!(state.allotment_api.list_unallotted("S1").unwrap().len(), 10);
}

#[test]
fn test_seat_ledger_conserved_after_run() {
    let (_tmp, state) = create_test_state();
    seed_uniform_scenario(&state, &[("C1", 30), ("C2", 25), ("C3", 100)], 90, &["C1", "C2", "C3"]);

    state
        .allotment_api
        .run_allotment("S1", "test", &CancellationToken::new())
        .unwrap();

    let summary = state.allotment_api.seat_summary("S1").unwrap();
    assert_eq!(summary.len(), 3);
    for s in &summary {
        assert_eq!(s.available_seats + s.allotted, s.total_seats, "target {}", s.target_id);
    }
    let allotted: Vec<u32> = summary.iter().map(|s| s.allotted).collect();
    assert_eq!(allotted, vec![30, 25, 35]);
}

#[test]
fn test_rerun_replaces_previous_allotment() {
    let (_tmp, state) = create_test_state();
    seed_uniform_scenario(&state, &[("C1", 80), ("C2", 80)], 100, &["C1", "C2"]);

    let cancel = CancellationToken::new();
    state.allotment_api.run_allotment("S1", "first", &cancel).unwrap();
    let first = state.allotment_api.get_allotments("S1", None).unwrap();
    let first_summary = state.allotment_api.seat_summary("S1").unwrap();

    state.allotment_api.run_allotment("S1", "second", &cancel).unwrap();
    let second = state.allotment_api.get_allotments("S1", None).unwrap();
    let second_summary = state.allotment_api.seat_summary("S1").unwrap();

    assert_eq!(first, second);
    assert_eq!(first_summary, second_summary);
    assert_eq!(state.repos.section_repo.find_by_subject("S1").unwrap().len(), 4);

    let runs = state.allotment_api.list_runs("S1", 10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
}

#[test]
fn test_two_students_from_same_prior_section_share_a_section() {
    let (_tmp, state) = create_test_state();
    seed_subject(&state, "S1", elective_allotment::domain::AllotmentType::Standalone, false);
    seed_offering(&state, "S1", "C1", elective_allotment::domain::TargetKind::Course, 140);

    // 先占满 A 班一部分，再放入两名来自 X 班的学生
    let mut students: Vec<_> = (0..60).map(|n| make_student(n, None)).collect();
    students.push(make_student(100, Some("X")));
    students.push(make_student(101, Some("X")));
    seed_students(&state, &students);
    for s in &students {
        seed_preference(&state, "S1", &s.student_id, &["C1", "C9"]);
    }

    state
        .allotment_api
        .run_allotment("S1", "test", &CancellationToken::new())
        .unwrap();

    let a = state.allotment_api.get_allotments("S1", Some("ST0100")).unwrap();
    let b = state.allotment_api.get_allotments("S1", Some("ST0101")).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].section_id, b[0].section_id);
}

#[test]
fn test_insufficient_seats_reported_as_unallotted() {
    let (_tmp, state) = create_test_state();
    seed_uniform_scenario(&state, &[("C1", 10), ("C2", 5)], 20, &["C1", "C2"]);

    let report = state
        .allotment_api
        .run_allotment("S1", "test", &CancellationToken::new())
        .unwrap();
    assert_eq!(report.allotted_count, 15);
    assert_eq!(report.unallotted.len(), 5);

    let unallotted: HashSet<String> = state
        .allotment_api
        .list_unallotted("S1")
        .unwrap()
        .into_iter()
        .map(|s| s.student_id)
        .collect();
    let reported: HashSet<String> = report.unallotted.into_iter().map(|u| u.student_id).collect();
    assert_eq!(unallotted, reported);

    let run = &state.allotment_api.list_runs("S1", 1).unwrap()[0];
    assert_eq!(run.unallotted_count, 5);
}

#[test]
fn test_students_not_running_allotment_are_excluded() {
    let (_tmp, state) = create_test_state();
    seed_uniform_scenario(&state, &[("C1", 10), ("C2", 10)], 4, &["C1", "C2"]);
    state.repos.student_repo.set_run_allotment("ST0000", false).unwrap();

    let report = state
        .allotment_api
        .run_allotment("S1", "test", &CancellationToken::new())
        .unwrap();
    assert_eq!(report.allotted_count, 3);
    assert!(state
        .allotment_api
        .get_allotments("S1", Some("ST0000"))
        .unwrap()
        .is_empty());
}

#[test]
fn test_get_allotments_unknown_subject() {
    let (_tmp, state) = create_test_state();
    assert!(matches!(
        state.allotment_api.get_allotments("NOPE", None),
        Err(elective_allotment::ApiError::NotFound(_))
    ));
}

#[test]
fn test_section_capacity_from_config() {
    let (_tmp, state) = create_test_state();
    seed_uniform_scenario(&state, &[("C1", 100)], 100, &["C1", "C2"]);
    state
        .config_manager
        .set_global_config_value(elective_allotment::config::config_keys::SECTION_CAPACITY, "25")
        .unwrap();
    state
        .config_manager
        .set_global_config_value(elective_allotment::config::config_keys::MATERIALIZE_CHUNK_SIZE, "7")
        .unwrap();

    let report = state
        .allotment_api
        .run_allotment("S1", "test", &CancellationToken::new())
        .unwrap();
    assert_eq!(report.sections_created, 4);
    assert_eq!(report.allotted_count, 100);

    let sections = state.repos.section_repo.find_by_subject("S1").unwrap();
    let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C", "D"]);
    assert!(sections.iter().all(|s| s.capacity == 25 && s.member_count == 25));
}
