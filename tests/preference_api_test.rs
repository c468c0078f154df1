// ==========================================
// 志愿 API 集成测试
// ==========================================
// 覆盖: 提交校验、覆盖提交、校验失败不落库
// ==========================================


use elective_allotment::api::ApiError;
use elective_allotment::domain::{AllotmentType, PreferenceChoices, Student, TargetKind};

use test_helpers::*;

fn ids(targets: &[&str]) -> Vec<String> {
    targets.iter().map(|t| t.to_string()).collect()
}

fn setup() -> (tempfile::NamedTempFile, elective_allotment::app::AppState) {
    let (tmp, state) = create_test_state();
    seed_subject(&state, "S1", AllotmentType::Standalone, true);
    seed_offering(&state, "S1", "C1", TargetKind::Course, 70);
    seed_offering(&state, "S1", "C2", TargetKind::Course, 70);
    seed_offering(&state, "S1", "C3", TargetKind::Course, 70);
    seed_offering(&state, "S1", "B1", TargetKind::Bucket, 70);
    seed_students(&state, &[make_student(1, Some("X"))]);
    (tmp, state)
}

fn assert_validation(result: Result<impl std::fmt::Debug, ApiError>) {
    match result {
        Err(ApiError::ValidationError(_)) => {}
        other => panic!("期望 ValidationError，实际 {:?}", other),
    }
}

#[test]
fn test_submit_and_replace() {
    let (_tmp, state) = setup();
    let api = &state.preference_api;

    api.submit_preferences("S1", "ST0001", ids(&["C1", "C2"])).unwrap();
    api.submit_preferences("S1", "ST0001", ids(&[" C3 ", "C1", "C2"])).unwrap();

    let stored = api.get_preference("S1", "ST0001").unwrap().unwrap();
    assert_eq!(
        stored.choices,
        PreferenceChoices::Standalone {
            courses: ids(&["C3", "C1", "C2"])
        }
    );
    assert_eq!(api.list_preferences("S1").unwrap().len(), 1);
}

#[test]
fn test_choice_count_and_uniqueness() {
    let (_tmp, state) = setup();
    let api = &state.preference_api;

    assert_validation(api.submit_preferences("S1", "ST0001", ids(&["C1"])));
    assert_validation(api.submit_preferences("S1", "ST0001", ids(&["C1", "C2", "C3", "C1"])));
    assert_validation(api.submit_preferences("S1", "ST0001", ids(&["C1", "C1"])));
    assert_validation(api.submit_preferences("S1", "ST0001", ids(&["C1", "  "])));

    assert!(api.get_preference("S1", "ST0001").unwrap().is_none());
}

#[test]
fn test_unknown_or_mismatched_targets_rejected() {
    let (_tmp, state) = setup();
    let api = &state.preference_api;

    assert_validation(api.submit_preferences("S1", "ST0001", ids(&["C1", "C9"])));
    assert_validation(api.submit_preferences("S1", "ST0001", ids(&["C1", "B1"])));
}

#[test]
fn test_student_and_subject_checks() {
    let (_tmp, state) = setup();
    let api = &state.preference_api;

    assert_validation(api.submit_preferences("S1", "GHOST", ids(&["C1", "C2"])));
    assert_validation(api.submit_preferences("S9", "ST0001", ids(&["C1", "C2"])));

    let outsider = Student {
        program_id: "MECH".to_string(),
        ..make_student(2, None)
    };
    let other_batch = Student {
        batch_id: "2023".to_string(),
        ..make_student(3, None)
    };
    seed_students(&state, &[outsider, other_batch]);
    assert_validation(api.submit_preferences("S1", "ST0002", ids(&["C1", "C2"])));
    assert_validation(api.submit_preferences("S1", "ST0003", ids(&["C1", "C2"])));
}

#[test]
fn test_closed_window_rejects_and_keeps_previous() {
    let (_tmp, state) = setup();
    let api = &state.preference_api;

    api.submit_preferences("S1", "ST0001", ids(&["C1", "C2"])).unwrap();
    state.allotment_api.close_preference_window("S1").unwrap();

    assert_validation(api.submit_preferences("S1", "ST0001", ids(&["C2", "C3"])));
    let stored = api.get_preference("S1", "ST0001").unwrap().unwrap();
    assert_eq!(stored.choices.targets(), ids(&["C1", "C2"]).as_slice());
}

#[test]
fn test_bucket_subject_stores_bucket_choices() {
    let (_tmp, state) = create_test_state();
    seed_subject(&state, "S2", AllotmentType::Bucket, true);
    seed_offering(&state, "S2", "B1", TargetKind::Bucket, 70);
    seed_offering(&state, "S2", "B2", TargetKind::Bucket, 70);
    seed_students(&state, &[make_student(1, None)]);

    let pref = state
        .preference_api
        .submit_preferences("S2", "ST0001", ids(&["B2", "B1"]))
        .unwrap();
    assert_eq!(pref.choices.allotment_type(), AllotmentType::Bucket);
}
