// ==========================================
// 选修课分配系统 - 分配引擎
// ==========================================
// 红线: 目标分配人数 <= total_seats，每班人数 <= capacity
// ==========================================
// 职责: 纯内存计算，不访问数据库
// 输入: 选课轮次 + 座位目标 + 候选学生(含志愿)
// 输出: 教学班 + 学生→教学班映射 + 未分配学生
// 流程:
//   1) 就近分班：同原班级、同首选目标的学生尽量进同一教学班
//   2) 志愿分配：按志愿顺序寻找有空位的教学班
//   3) 兜底分配：任一有空位的教学班
// ==========================================

use crate::config::AllotmentConfig;
use crate::domain::seat::SeatOffering;
use crate::domain::section::{check_id_part, Section};
use crate::domain::student::Candidate;
use crate::domain::subject::Subject;
use crate::domain::types::TieBreak;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::section_partitioner::SectionPartitioner;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

// ==========================================
// 分配结果类型
// ==========================================

/// 落位原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignReason {
    #[serde(rename = "LOCALITY_GROUP")]
    Locality,
    #[serde(rename = "PREFERENCE")]
    Preference,
    #[serde(rename = "LAST_RESORT")]
    LastResort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnassignedReason {
    NoCapacity, // 所有目标已满
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub student_id: String,
    pub registration_no: String,
    pub target_id: String,
    pub section_id: String,
    pub section_name: String,
    pub choice_rank: Option<usize>, // 命中的志愿序号（从1开始），兜底为 None
    pub reason: AssignReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedStudent {
    pub student_id: String,
    pub registration_no: String,
    pub reason: UnassignedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub target_id: String,
    pub target_name: String,
    pub total_seats: u32,
    pub allotted: u32,
    pub section_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentOutcome {
    pub subject_id: String,
    pub sections: Vec<Section>,
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<UnassignedStudent>,
    pub targets: Vec<TargetSummary>,
}

impl AllotmentOutcome {
    pub fn allotted_count(&self) -> usize {
        self.assignments.len()
    }
}

// ==========================================
// 计算过程中的目标状态
// ==========================================
struct TargetState {
    target_name: String,
    total_seats: u32,
    allotted: u32,
    sections: Vec<Section>,
}

impl TargetState {
    fn remaining(&self) -> u32 {
        self.total_seats.saturating_sub(self.allotted)
    }

    /// 某教学班当前还能接收的人数（同时受目标剩余座位约束）
    fn room(&self, idx: usize) -> u32 {
        self.sections
            .get(idx)
            .map(|s| s.remaining().min(self.remaining()))
            .unwrap_or(0)
    }

    fn first_open_section(&self) -> Option<usize> {
        (0..self.sections.len()).find(|&idx| self.room(idx) > 0)
    }

    /// 为整组学生挑选教学班：优先能整组容纳的第一个班，否则取剩余最多的班
    fn pick_section_for_group(&self, group_size: u32) -> Option<usize> {
        if let Some(idx) = (0..self.sections.len())
            .find(|&idx| self.room(idx) > 0 && self.sections[idx].remaining() >= group_size)
        {
            return Some(idx);
        }

        let mut best: Option<(usize, u32)> = None;
        for idx in 0..self.sections.len() {
            let room = self.room(idx);
            if room > 0 && best.map_or(true, |(_, r)| room > r) {
                best = Some((idx, room));
            }
        }
        best.map(|(idx, _)| idx)
    }

    fn seat(&mut self, idx: usize) {
        self.sections[idx].member_count += 1;
        self.allotted += 1;
    }
}

struct AllotmentState<'a> {
    subject_id: &'a str,
    targets: BTreeMap<String, TargetState>,
    // (target_id, prior_section_id) → 教学班下标
    locality: HashMap<(String, String), usize>,
    assignments: Vec<Assignment>,
}

impl<'a> AllotmentState<'a> {
    fn place(
        &mut self,
        candidate: &Candidate,
        target_id: &str,
        section_idx: usize,
        choice_rank: Option<usize>,
        reason: AssignReason,
    ) {
        if let Some(target) = self.targets.get_mut(target_id) {
            target.seat(section_idx);
            let section = &target.sections[section_idx];
            self.assignments.push(Assignment {
                student_id: candidate.student.student_id.clone(),
                registration_no: candidate.student.registration_no.clone(),
                target_id: target_id.to_string(),
                section_id: section.section_id.clone(),
                section_name: section.name.clone(),
                choice_rank,
                reason,
            });
        }
    }

    /// 志愿目标下可用的教学班：已登记的就近班优先，否则按名称顺序第一个有空位的班
    fn open_section_for(&self, target_id: &str, prior: Option<&str>) -> Option<usize> {
        let target = self.targets.get(target_id)?;
        if let Some(prior) = prior {
            if let Some(&idx) = self.locality.get(&(target_id.to_string(), prior.to_string())) {
                if target.room(idx) > 0 {
                    return Some(idx);
                }
            }
        }
        target.first_open_section()
    }
}

// ==========================================
// AllotmentEngine - 分配引擎
// ==========================================
pub struct AllotmentEngine {
    partitioner: SectionPartitioner,
    tie_break: TieBreak,
}

impl AllotmentEngine {
    pub fn new(config: &AllotmentConfig) -> EngineResult<Self> {
        Ok(Self {
            partitioner: SectionPartitioner::new(config.section_capacity)?,
            tie_break: config.tie_break,
        })
    }

    /// 计算一次完整分配
    ///
    /// # 参数
    /// - `subject`: 选课轮次
    /// - `offerings`: 该轮次的座位目标（类型与分配模式不符的目标被忽略）
    /// - `candidates`: 参加分配的学生及志愿
    ///
    /// # 返回
    /// - Ok(AllotmentOutcome): 座位不足时未分配学生在 `unassigned` 中列出
    /// - Err(Validation): 输入不一致（目标重复、学生重复、轮次不符、ID 含 section_id 分隔符）
    #[instrument(skip(self, subject, offerings, candidates), fields(
        subject_id = %subject.subject_id,
        offerings_count = offerings.len(),
        candidates_count = candidates.len()
    ))]
    pub fn allot(
        &self,
        subject: &Subject,
        offerings: &[SeatOffering],
        mut candidates: Vec<Candidate>,
    ) -> EngineResult<AllotmentOutcome> {
        let mut state = self.build_state(subject, offerings)?;
        check_unique_students(&candidates)?;

        if self.tie_break == TieBreak::RegistrationNo {
            candidates.sort_by(|a, b| {
                a.student
                    .registration_no
                    .cmp(&b.student.registration_no)
                    .then_with(|| a.student.student_id.cmp(&b.student.student_id))
            });
        }

        // 每个学生可用的志愿（序号从1开始）
        let usable: Vec<Vec<(usize, String)>> = candidates
            .iter()
            .map(|c| usable_choices(subject, &state.targets, c))
            .collect();
        let mut assigned = vec![false; candidates.len()];

        // 1) 就近分班
        let mut by_prior: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, c) in candidates.iter().enumerate() {
            if let Some(prior) = c.student.prior_section_id.as_deref() {
                by_prior.entry(prior).or_default().push(i);
            }
        }

        for (prior, members) in &by_prior {
            // 按第一志愿分小组，保持首次出现顺序；第一志愿不可用的学生留给志愿分配
            let mut groups: Vec<(String, Vec<(usize, usize)>)> = Vec::new();
            for &i in members {
                let Some(first) = candidates[i].choices.first() else {
                    continue;
                };
                let first_usable = usable[i]
                    .first()
                    .is_some_and(|(rank, target_id)| *rank == 1 && target_id == first);
                if !first_usable {
                    continue;
                }
                match groups.iter_mut().find(|(t, _)| t == first) {
                    Some((_, group)) => group.push((i, 1)),
                    None => groups.push((first.to_string(), vec![(i, 1)])),
                }
            }

            for (target_id, group) in groups {
                let key = (target_id.clone(), prior.to_string());
                let section_idx = match state.locality.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let picked = state
                            .targets
                            .get(&target_id)
                            .and_then(|t| t.pick_section_for_group(group.len() as u32));
                        match picked {
                            Some(idx) => {
                                state.locality.insert(key, idx);
                                idx
                            }
                            None => continue,
                        }
                    }
                };

                let admit = state
                    .targets
                    .get(&target_id)
                    .map(|t| t.room(section_idx) as usize)
                    .unwrap_or(0);
                for &(i, rank) in group.iter().take(admit) {
                    state.place(&candidates[i], &target_id, section_idx, Some(rank), AssignReason::Locality);
                    assigned[i] = true;
                }
                if group.len() > admit {
                    debug!(
                        prior_section = %prior,
                        target_id = %target_id,
                        overflow = group.len() - admit,
                        "就近分班容量不足，余下学生转入志愿分配"
                    );
                }
            }
        }

        // 2) 志愿分配
        for (i, c) in candidates.iter().enumerate() {
            if assigned[i] {
                continue;
            }
            let prior = c.student.prior_section_id.as_deref();
            for (rank, target_id) in &usable[i] {
                if let Some(idx) = state.open_section_for(target_id, prior) {
                    state.place(c, target_id, idx, Some(*rank), AssignReason::Preference);
                    if let Some(prior) = prior {
                        state
                            .locality
                            .entry((target_id.clone(), prior.to_string()))
                            .or_insert(idx);
                    }
                    assigned[i] = true;
                    break;
                }
            }
        }

        // 3) 兜底分配
        let mut unassigned = Vec::new();
        for (i, c) in candidates.iter().enumerate() {
            if assigned[i] {
                continue;
            }
            let slot = state
                .targets
                .iter()
                .find_map(|(id, t)| t.first_open_section().map(|idx| (id.clone(), idx)));
            match slot {
                Some((target_id, idx)) => {
                    state.place(c, &target_id, idx, None, AssignReason::LastResort);
                    assigned[i] = true;
                }
                None => unassigned.push(UnassignedStudent {
                    student_id: c.student.student_id.clone(),
                    registration_no: c.student.registration_no.clone(),
                    reason: UnassignedReason::NoCapacity,
                }),
            }
        }

        let outcome = finish(state, unassigned);
        if !outcome.unassigned.is_empty() {
            warn!(unassigned = outcome.unassigned.len(), "座位不足，部分学生未分配");
        }
        info!(
            allotted = outcome.allotted_count(),
            sections = outcome.sections.len(),
            "分配计算完成"
        );
        Ok(outcome)
    }

    fn build_state<'a>(
        &self,
        subject: &'a Subject,
        offerings: &[SeatOffering],
    ) -> EngineResult<AllotmentState<'a>> {
        let expected_kind = subject.allotment_type.target_kind();
        let mut targets = BTreeMap::new();
        check_id_part("subject_id", &subject.subject_id).map_err(EngineError::Validation)?;

        for offering in offerings {
            if offering.subject_id != subject.subject_id {
                return Err(EngineError::Validation(format!(
                    "座位目标 {} 不属于选课轮次 {}",
                    offering.target_id, subject.subject_id
                )));
            }
            check_id_part("target_id", &offering.target_id).map_err(EngineError::Validation)?;
            if offering.target_kind != expected_kind {
                warn!(
                    target_id = %offering.target_id,
                    target_kind = %offering.target_kind,
                    "座位目标类型与分配模式不符，忽略"
                );
                continue;
            }
            if targets.contains_key(&offering.target_id) {
                return Err(EngineError::Validation(format!(
                    "座位目标重复: {}",
                    offering.target_id
                )));
            }

            targets.insert(
                offering.target_id.clone(),
                TargetState {
                    target_name: offering.target_name.clone(),
                    total_seats: offering.total_seats,
                    allotted: 0,
                    sections: self.partitioner.partition(
                        &subject.subject_id,
                        &offering.target_id,
                        offering.total_seats,
                    ),
                },
            );
        }

        Ok(AllotmentState {
            subject_id: &subject.subject_id,
            targets,
            locality: HashMap::new(),
            assignments: Vec::new(),
        })
    }
}

fn check_unique_students(candidates: &[Candidate]) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for c in candidates {
        if !seen.insert(c.student.student_id.as_str()) {
            return Err(EngineError::Validation(format!(
                "学生重复: {}",
                c.student.student_id
            )));
        }
    }
    Ok(())
}

/// 可用志愿：分配模式一致且目标存在，保留原始序号
fn usable_choices(
    subject: &Subject,
    targets: &BTreeMap<String, TargetState>,
    candidate: &Candidate,
) -> Vec<(usize, String)> {
    if candidate.choices.allotment_type() != subject.allotment_type {
        debug!(student_id = %candidate.student.student_id, "志愿类型与分配模式不符，忽略全部志愿");
        return Vec::new();
    }

    candidate
        .choices
        .targets()
        .iter()
        .enumerate()
        .filter_map(|(i, target_id)| {
            if targets.contains_key(target_id) {
                Some((i + 1, target_id.clone()))
            } else {
                debug!(
                    student_id = %candidate.student.student_id,
                    target_id = %target_id,
                    "志愿目标不存在，跳过"
                );
                None
            }
        })
        .collect()
}

fn finish(state: AllotmentState<'_>, unassigned: Vec<UnassignedStudent>) -> AllotmentOutcome {
    let mut sections = Vec::new();
    let mut targets = Vec::new();
    for (target_id, target) in state.targets {
        targets.push(TargetSummary {
            target_id,
            target_name: target.target_name,
            total_seats: target.total_seats,
            allotted: target.allotted,
            section_count: target.sections.len(),
        });
        sections.extend(target.sections);
    }

    AllotmentOutcome {
        subject_id: state.subject_id.to_string(),
        sections,
        assignments: state.assignments,
        unassigned,
        targets,
    }
}
