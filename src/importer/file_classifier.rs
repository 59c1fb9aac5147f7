// ==========================================
// 高校开放数据入库系统 - 文件分类器
// ==========================================
// 规则:
// 1. 文件名提示缩小候选实体
// 2. 候选版本按列数降序（更具体者优先）,同列数按注册时间倒序
// 3. 首个原始列集合 ⊆ 表头 的版本胜出
// 4. 无匹配 → ClassificationFailed（跳过文件,非致命）
// ==========================================

use crate::domain::types::EntityType;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::ingest_trait::{Classification, FileClassifier};
use crate::importer::schema_registry::{LayoutMapping, SchemaRegistry};
use std::collections::HashSet;
use std::sync::Arc;

/// 文件名片段 → 实体类型（片段须全部出现）
const NAME_HINTS: [(&[&str], EntityType); 5] = [
    (&["licitaciones"], EntityType::ProcurementContract),
    (&["presupuesto-de-gastos"], EntityType::BudgetExpense),
    (&["presupuesto-de-ingresos"], EntityType::BudgetIncome),
    (&["conv-ayudas"], EntityType::GrantCall),
    (&["ayudas", "anonimizado"], EntityType::Grant),
];

pub struct FileClassifierImpl {
    registry: Arc<SchemaRegistry>,
}

impl FileClassifierImpl {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// 文件名暗示的实体类型（可能为空）
    pub fn hinted_entities(file_name: &str) -> Vec<EntityType> {
        let lower = file_name.to_lowercase();
        NAME_HINTS
            .iter()
            .filter(|(fragments, _)| fragments.iter().all(|f| lower.contains(f)))
            .map(|(_, entity)| *entity)
            .collect()
    }

    /// 文件名中的年份: 首个以 19/20 开头的 4 位数字串
    pub fn source_year(file_name: &str) -> Option<i32> {
        let bytes = file_name.as_bytes();
        (0..bytes.len().saturating_sub(3)).find_map(|start| {
            let window = &bytes[start..start + 4];
            let preceded_by_digit = start > 0 && bytes[start - 1].is_ascii_digit();
            if preceded_by_digit
                || !window.iter().all(u8::is_ascii_digit)
                || !(window.starts_with(b"19") || window.starts_with(b"20"))
            {
                return None;
            }
            std::str::from_utf8(window).ok()?.parse().ok()
        })
    }

    /// 候选版本（已排序）
    fn candidates(&self, hinted: &[EntityType]) -> Vec<(usize, &LayoutMapping)> {
        let mut candidates: Vec<(usize, &LayoutMapping)> = self
            .registry
            .layouts()
            .iter()
            .enumerate()
            .filter(|(_, layout)| hinted.is_empty() || hinted.contains(&layout.entity))
            .collect();

        candidates.sort_by(|(a_idx, a), (b_idx, b)| {
            b.column_count()
                .cmp(&a.column_count())
                .then_with(|| b_idx.cmp(a_idx))
        });
        candidates
    }
}

impl FileClassifier for FileClassifierImpl {
    fn classify(&self, file_name: &str, header: &[String]) -> ImportResult<Classification> {
        let observed: HashSet<&str> = header.iter().map(String::as_str).collect();
        let hinted = Self::hinted_entities(file_name);

        self.candidates(&hinted)
            .into_iter()
            .find(|(_, layout)| layout.matches_header(&observed))
            .map(|(_, layout)| Classification {
                entity: layout.entity,
                version: layout.version,
                source_year: Self::source_year(file_name),
            })
            .ok_or_else(|| ImportError::ClassificationFailed(file_name.to_string()))
    }
}
