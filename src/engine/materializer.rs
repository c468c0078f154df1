// ==========================================
// 选修课分配系统 - 分配落库编排
// ==========================================
// 红线: 同一选课轮次同时只允许一次分配
// 红线: 落库要么全部生效，要么保持运行前状态
// ==========================================
// 流程: 加锁 → 状态检查 → 计算 → 分片落库 → 写运行记录
// ==========================================

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AllotmentConfig;
use crate::domain::allotment_run::AllotmentRun;
use crate::domain::types::RunStatus;
use crate::engine::allotment_engine::{AllotmentEngine, AllotmentOutcome, TargetSummary, UnassignedStudent};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::{AllotmentStore, MaterializationPlan, MemberRow, ReplaceOutcome};

// ==========================================
// RunGuard - 单轮次互斥
// ==========================================
// 析构时释放
pub struct RunGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    subject_id: String,
}

impl RunGuard {
    pub fn acquire(in_flight: &Arc<Mutex<HashSet<String>>>, subject_id: &str) -> EngineResult<Self> {
        let mut running = in_flight
            .lock()
            .map_err(|e| EngineError::Internal(format!("锁获取失败: {}", e)))?;
        if !running.insert(subject_id.to_string()) {
            return Err(EngineError::AllotmentInProgress {
                subject_id: subject_id.to_string(),
            });
        }
        Ok(Self {
            in_flight: in_flight.clone(),
            subject_id: subject_id.to_string(),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.in_flight.lock() {
            running.remove(&self.subject_id);
        }
    }
}

/// 一次成功分配的汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllotmentReport {
    pub run_id: String,
    pub subject_id: String,
    pub allotted_count: usize,
    pub unallotted: Vec<UnassignedStudent>,
    pub targets: Vec<TargetSummary>,
    pub sections_created: usize,
}

// ==========================================
// AllotmentMaterializer
// ==========================================
pub struct AllotmentMaterializer<S: AllotmentStore> {
    store: Arc<S>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<S: AllotmentStore> Clone for AllotmentMaterializer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<S: AllotmentStore> AllotmentMaterializer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, subject_id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|running| running.contains(subject_id))
            .unwrap_or(false)
    }

    /// 执行一次分配并落库
    ///
    /// # 返回
    /// - Err(AllotmentInProgress): 同一轮次已有分配在执行
    /// - Err(InvalidState): 志愿窗口开放中或已定稿
    /// - Err(Cancelled): 取消令牌触发，已回滚
    #[instrument(skip(self, config, cancel), fields(subject_id = %subject_id))]
    pub fn run_allotment(
        &self,
        subject_id: &str,
        triggered_by: &str,
        config: &AllotmentConfig,
        cancel: &CancellationToken,
    ) -> EngineResult<AllotmentReport> {
        let _guard = RunGuard::acquire(&self.in_flight, subject_id)?;

        let subject = self.store.load_subject(subject_id)?;
        if subject.preference_window_open {
            return Err(EngineError::InvalidState {
                subject_id: subject_id.to_string(),
                reason: "志愿填报窗口尚未关闭".to_string(),
            });
        }
        if subject.finalized {
            return Err(EngineError::InvalidState {
                subject_id: subject_id.to_string(),
                reason: "分配结果已定稿".to_string(),
            });
        }

        let engine = AllotmentEngine::new(config)?;

        let mut run = AllotmentRun {
            run_id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            status: RunStatus::Running,
            triggered_by: triggered_by.to_string(),
            allotted_count: 0,
            unallotted_count: 0,
            started_at: Local::now().naive_local(),
            finished_at: None,
            summary_json: None,
            detail: None,
        };
        self.store.begin_run(&run)?;
        info!(run_id = %run.run_id, triggered_by, "分配开始");

        let outcome = match self.compute(&engine, &subject, cancel) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.close_failed(&mut run, e)),
        };

        let plan = build_plan(&outcome);
        match self.store.replace_allotment(&plan, config.chunk_size, cancel) {
            Ok(ReplaceOutcome::Committed { sections, members }) => {
                run.status = RunStatus::Completed;
                run.allotted_count = members as u32;
                run.unallotted_count = outcome.unassigned.len() as u32;
                run.finished_at = Some(Local::now().naive_local());
                run.summary_json = Some(json!({
                    "targets": outcome.targets,
                    "unassigned": outcome.unassigned,
                    "section_capacity": config.section_capacity,
                    "tie_break": config.tie_break,
                }));
                // 分配已提交，运行记录写入失败不影响结果
                if let Err(e) = self.store.finish_run(&run) {
                    error!(run_id = %run.run_id, error = %e, "运行记录写入失败，分配结果已生效");
                }

                info!(
                    run_id = %run.run_id,
                    allotted = members,
                    unallotted = outcome.unassigned.len(),
                    sections,
                    "分配完成"
                );
                Ok(AllotmentReport {
                    run_id: run.run_id,
                    subject_id: subject_id.to_string(),
                    allotted_count: members,
                    unallotted: outcome.unassigned,
                    targets: outcome.targets,
                    sections_created: sections,
                })
            }
            Ok(ReplaceOutcome::Cancelled { chunks_written }) => {
                warn!(run_id = %run.run_id, chunks_written, "分配在落库阶段被取消");
                Err(self.close_failed(
                    &mut run,
                    EngineError::Cancelled {
                        subject_id: subject_id.to_string(),
                    },
                ))
            }
            Err(e) => Err(self.close_failed(&mut run, e.into())),
        }
    }

    fn compute(
        &self,
        engine: &AllotmentEngine,
        subject: &crate::domain::subject::Subject,
        cancel: &CancellationToken,
    ) -> EngineResult<AllotmentOutcome> {
        let offerings = self.store.load_offerings(&subject.subject_id)?;
        let candidates = self.store.load_candidates(subject)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                subject_id: subject.subject_id.clone(),
            });
        }
        engine.allot(subject, &offerings, candidates)
    }

    /// 写入终态（失败/取消），返回原始错误
    fn close_failed(&self, run: &mut AllotmentRun, err: EngineError) -> EngineError {
        run.status = match err {
            EngineError::Cancelled { .. } => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        };
        run.finished_at = Some(Local::now().naive_local());
        run.detail = Some(err.to_string());

        if let Err(e) = self.store.finish_run(run) {
            error!(run_id = %run.run_id, error = %e, "运行记录写入失败");
        }
        err
    }
}

fn build_plan(outcome: &AllotmentOutcome) -> MaterializationPlan {
    MaterializationPlan {
        subject_id: outcome.subject_id.clone(),
        sections: outcome.sections.clone(),
        members: outcome
            .assignments
            .iter()
            .map(|a| MemberRow {
                student_id: a.student_id.clone(),
                section_id: a.section_id.clone(),
                target_id: a.target_id.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::preference::PreferenceChoices;
    use crate::domain::seat::SeatOffering;
    use crate::domain::student::{Candidate, Student};
    use crate::domain::subject::Subject;
    use crate::domain::types::{AllotmentType, TargetKind};
    use crate::repository::error::{RepositoryError, RepositoryResult};

    #[derive(Default)]
    struct MemoryStore {
        subject: Mutex<Option<Subject>>,
        offerings: Vec<SeatOffering>,
        candidates: Vec<Candidate>,
        runs: Mutex<Vec<AllotmentRun>>,
        committed: Mutex<Option<MaterializationPlan>>,
        fail_replace: bool,
        fail_finish: bool,
    }

    impl AllotmentStore for MemoryStore {
        fn load_subject(&self, subject_id: &str) -> RepositoryResult<Subject> {
            self.subject
                .lock()
                .unwrap()
                .clone()
                .filter(|s| s.subject_id == subject_id)
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "Subject".to_string(),
                    id: subject_id.to_string(),
                })
        }

        fn load_offerings(&self, _subject_id: &str) -> RepositoryResult<Vec<SeatOffering>> {
            Ok(self.offerings.clone())
        }

        fn load_candidates(&self, _subject: &Subject) -> RepositoryResult<Vec<Candidate>> {
            Ok(self.candidates.clone())
        }

        fn begin_run(&self, run: &AllotmentRun) -> RepositoryResult<()> {
            self.runs.lock().unwrap().push(run.clone());
            Ok(())
        }

        fn finish_run(&self, run: &AllotmentRun) -> RepositoryResult<()> {
            if self.fail_finish {
                return Err(RepositoryError::DatabaseQueryError("database is locked".to_string()));
            }
            let mut runs = self.runs.lock().unwrap();
            if let Some(r) = runs.iter_mut().find(|r| r.run_id == run.run_id) {
                *r = run.clone();
            }
            Ok(())
        }

        fn replace_allotment(
            &self,
            plan: &MaterializationPlan,
            chunk_size: usize,
            cancel: &CancellationToken,
        ) -> RepositoryResult<ReplaceOutcome> {
            if self.fail_replace {
                return Err(RepositoryError::DatabaseTransactionError("disk full".to_string()));
            }
            let mut chunks_written = 0;
            for _ in plan.members.chunks(chunk_size) {
                if cancel.is_cancelled() {
                    return Ok(ReplaceOutcome::Cancelled { chunks_written });
                }
                chunks_written += 1;
            }
            *self.committed.lock().unwrap() = Some(plan.clone());
            Ok(ReplaceOutcome::Committed {
                sections: plan.sections.len(),
                members: plan.members.len(),
            })
        }
    }

    fn create_test_store(students: usize) -> MemoryStore {
        MemoryStore {
            subject: Mutex::new(Some(Subject {
                subject_id: "S1".to_string(),
                name: "Open Elective".to_string(),
                batch_id: "2024".to_string(),
                program_ids: vec!["CSE".to_string()],
                allotment_type: AllotmentType::Standalone,
                preference_window_open: false,
                finalized: false,
            })),
            offerings: vec![SeatOffering {
                subject_id: "S1".to_string(),
                target_id: "C1".to_string(),
                target_kind: TargetKind::Course,
                target_name: "Cryptography".to_string(),
                total_seats: 100,
                available_seats: 100,
            }],
            candidates: (0..students)
                .map(|n| Candidate {
                    student: Student {
                        student_id: format!("ST{}", n),
                        registration_no: format!("R{:03}", n),
                        name: format!("Student {}", n),
                        batch_id: "2024".to_string(),
                        program_id: "CSE".to_string(),
                        prior_section_id: None,
                        run_allotment: true,
                    },
                    choices: PreferenceChoices::Standalone {
                        courses: vec!["C1".to_string(), "C2".to_string()],
                    },
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_successful_run_commits_and_records() {
        let store = Arc::new(create_test_store(120));
        let m = AllotmentMaterializer::new(store.clone());

        let report = m
            .run_allotment("S1", "admin", &AllotmentConfig::default(), &CancellationToken::new())
            .unwrap();

        assert_eq!(report.allotted_count, 100);
        assert_eq!(report.unallotted.len(), 20);
        assert_eq!(report.sections_created, 2);

        let runs = store.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].allotted_count, 100);
        assert_eq!(runs[0].unallotted_count, 20);
        assert!(store.committed.lock().unwrap().is_some());
        assert!(!m.is_running("S1"));
    }

    #[test]
    fn test_concurrent_run_rejected() {
        let store = Arc::new(create_test_store(5));
        let m = AllotmentMaterializer::new(store.clone());

        let guard = RunGuard::acquire(&m.in_flight, "S1").unwrap();
        assert!(m.is_running("S1"));
        let err = m
            .run_allotment("S1", "admin", &AllotmentConfig::default(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::AllotmentInProgress { .. }));
        assert!(store.runs.lock().unwrap().is_empty());

        drop(guard);
        assert!(m
            .run_allotment("S1", "admin", &AllotmentConfig::default(), &CancellationToken::new())
            .is_ok());
    }

    #[test]
    fn test_cancelled_run_leaves_nothing_committed() {
        let store = Arc::new(create_test_store(30));
        let m = AllotmentMaterializer::new(store.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = m
            .run_allotment("S1", "admin", &AllotmentConfig::default(), &cancel)
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { .. }));
        assert!(store.committed.lock().unwrap().is_none());
        assert_eq!(store.runs.lock().unwrap()[0].status, RunStatus::Cancelled);
        assert!(!m.is_running("S1"));
    }

    #[test]
    fn test_store_failure_marks_run_failed() {
        let mut store = create_test_store(10);
        store.fail_replace = true;
        let store = Arc::new(store);
        let m = AllotmentMaterializer::new(store.clone());

        let err = m
            .run_allotment("S1", "admin", &AllotmentConfig::default(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Repository(_)));

        let runs = store.runs.lock().unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].detail.as_deref().unwrap_or("").contains("disk full"));
    }

    #[test]
    fn test_open_window_or_finalized_rejected() {
        let store = Arc::new(create_test_store(3));
        let m = AllotmentMaterializer::new(store.clone());

        store.subject.lock().unwrap().as_mut().unwrap().preference_window_open = true;
        assert!(matches!(
            m.run_allotment("S1", "admin", &AllotmentConfig::default(), &CancellationToken::new()),
            Err(EngineError::InvalidState { .. })
        ));

        {
            let mut subject = store.subject.lock().unwrap();
            let s = subject.as_mut().unwrap();
            s.preference_window_open = false;
            s.finalized = true;
        }
        assert!(matches!(
            m.run_allotment("S1", "admin", &AllotmentConfig::default(), &CancellationToken::new()),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(store.runs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_audit_failure_after_commit_still_returns_report() {
        let mut store = create_test_store(10);
        store.fail_finish = true;
        let store = Arc::new(store);
        let m = AllotmentMaterializer::new(store.clone());

        let report = m
            .run_allotment("S1", "admin", &AllotmentConfig::default(), &CancellationToken::new())
            .unwrap();
        assert_eq!(report.allotted_count, 10);
        assert!(store.committed.lock().unwrap().is_some());
        // 运行记录停留在 Running
        assert_eq!(store.runs.lock().unwrap()[0].status, RunStatus::Running);
        assert!(!m.is_running("S1"));
    }
}
