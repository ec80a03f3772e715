//! 字段级 diff 引擎
//!
//! 对比「旧快照」与合并后的「拟议快照」，只输出真正变化的字段。
//! 遍历的是字段注册表而不是快照本身的键集合，未注册字段永远不参与比较。

use serde::{Deserialize, Serialize};

use crate::registry::{FieldRegistry, FieldValue, Snapshot};

/// 一个字段的变更对：旧值 → 新值
///
/// 不变式：`old != new`，相等的对永远不会出现在 diff 输出里。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: FieldValue,
    pub new: FieldValue,
}

/// 按注册表顺序计算稀疏 diff；快照里缺失的注册字段按 NULL 参与比较。
///
/// 返回空 vec 表示无变化，调用方必须据此跳过台账写入
/// （空 diff 不产生 ChangeRecord，由台账边界再做一次强制）。
pub fn diff(registry: &FieldRegistry, old: &Snapshot, merged: &Snapshot) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    for field in registry.fields() {
        let old_value = old.get(field.name).cloned().unwrap_or(FieldValue::Null);
        let new_value = merged.get(field.name).cloned().unwrap_or(FieldValue::Null);

        if old_value != new_value {
            changes.push(FieldChange {
                field: field.name.to_string(),
                old: old_value,
                new: new_value,
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{merge, EntityPatch};
    use crate::registry::FieldRegistry;

    fn stored_product() -> Snapshot {
        let mut s = Snapshot::new();
        s.insert("code".into(), FieldValue::Text("A1".into()));
        s.insert("name".into(), FieldValue::Text("Apple juice".into()));
        s.insert("net_weight".into(), FieldValue::Real(0.75));
        s.insert("active".into(), FieldValue::Boolean(true));
        s
    }

    #[test]
    fn test_noop_merge_produces_empty_diff() {
        let registry = FieldRegistry::product();
        let stored = stored_product();

        let merged = merge(&registry, &stored, &EntityPatch::new());
        assert!(diff(&registry, &stored, &merged).is_empty());
    }

    #[test]
    fn test_identical_value_produces_empty_diff() {
        let registry = FieldRegistry::product();
        let stored = stored_product();

        let patch = EntityPatch::new().set("code", FieldValue::Text("A1".into()));
        let merged = merge(&registry, &stored, &patch);
        assert!(diff(&registry, &stored, &merged).is_empty());
    }

    #[test]
    fn test_sparse_output_contains_exactly_changed_fields() {
        let registry = FieldRegistry::product();
        let stored = stored_product();

        let patch = EntityPatch::new()
            .set("code", FieldValue::Text("A2".into()))
            .set("active", FieldValue::Boolean(false))
            .set("name", FieldValue::Text("Apple juice".into())); // 与存量相同
        let merged = merge(&registry, &stored, &patch);

        let changes = diff(&registry, &stored, &merged);
        assert_eq!(changes.len(), 2);

        // 输出按注册表声明顺序：code 在 active 之前
        assert_eq!(changes[0].field, "code");
        assert_eq!(changes[0].old, FieldValue::Text("A1".into()));
        assert_eq!(changes[0].new, FieldValue::Text("A2".into()));
        assert_eq!(changes[1].field, "active");
        assert_eq!(changes[1].old, FieldValue::Boolean(true));
        assert_eq!(changes[1].new, FieldValue::Boolean(false));
    }

    #[test]
    fn test_missing_field_compares_as_null() {
        let registry = FieldRegistry::product();
        let stored = stored_product(); // 没有 brand_id

        let patch = EntityPatch::new().set("brand_id", FieldValue::Reference(7));
        let merged = merge(&registry, &stored, &patch);

        let changes = diff(&registry, &stored, &merged);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "brand_id");
        assert_eq!(changes[0].old, FieldValue::Null);
        assert_eq!(changes[0].new, FieldValue::Reference(7));
    }

    #[test]
    fn test_numeric_equality_is_exact() {
        let registry = FieldRegistry::product();
        let stored = stored_product();

        // 0.75 vs 0.7500001：精确比较，视为变化
        let patch = EntityPatch::new().set("net_weight", FieldValue::Real(0.7500001));
        let merged = merge(&registry, &stored, &patch);
        assert_eq!(diff(&registry, &stored, &merged).len(), 1);

        // 完全相同的浮点值不产生变更
        let patch = EntityPatch::new().set("net_weight", FieldValue::Real(0.75));
        let merged = merge(&registry, &stored, &patch);
        assert!(diff(&registry, &stored, &merged).is_empty());
    }
}
