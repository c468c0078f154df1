// ==========================================
// 选修课分配系统 - 分班器
// ==========================================
// 职责: 按座位数预先切分教学班
// 规则: required = ceil(total_seats / capacity)，命名 A, B, ..., Z, AA, AB, ...
// ==========================================

use crate::domain::section::{make_section_id, Section};
use crate::engine::error::{EngineError, EngineResult};

pub struct SectionPartitioner {
    capacity: u32,
}

impl SectionPartitioner {
    /// # 返回
    /// - Err(Config): capacity 为 0
    pub fn new(capacity: u32) -> EngineResult<Self> {
        if capacity == 0 {
            return Err(EngineError::Config("班级容量必须大于 0".to_string()));
        }
        Ok(Self { capacity })
    }

    /// 所需教学班数量
    pub fn required_sections(&self, total_seats: u32) -> u32 {
        total_seats.div_ceil(self.capacity)
    }

    /// 为单个目标生成空教学班（按名称顺序）
    ///
    /// section_id 由 (subject, target, name) 派生，重复运行得到相同ID；
    /// 调用方保证 subject_id / target_id 不含分隔符
    pub fn partition(&self, subject_id: &str, target_id: &str, total_seats: u32) -> Vec<Section> {
        (0..self.required_sections(total_seats) as usize)
            .map(|index| {
                let name = section_name(index);
                Section {
                    section_id: make_section_id(subject_id, target_id, &name),
                    subject_id: subject_id.to_string(),
                    target_id: target_id.to_string(),
                    name,
                    capacity: self.capacity,
                    member_count: 0,
                }
            })
            .collect()
    }
}

/// 教学班名称（双射 26 进制）：0 → A, 25 → Z, 26 → AA
pub fn section_name(mut index: usize) -> String {
    let mut chars = Vec::new();
    loop {
        chars.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    chars.iter().rev().collect()
}
