//! 合并服务 - 把部分更新叠加到已存实体上
//!
//! 所有实体类型共用同一套合并逻辑，按各自的字段注册表驱动（表驱动，
//! 不做继承也不做运行时类型检查）。合并是纯函数：不校验业务规则，
//! 不产生副作用，输出即 diff 的「拟议快照」。

use std::collections::HashMap;

use crate::registry::{FieldRegistry, FieldValue, Snapshot};

/// 部分更新载荷，逐字段显式携带「是否提供」标记
///
/// 字段不在 map 里 = 未提供，保留存量值；字段存在且值为 `Null` = 显式清空
/// （仅对可空字段生效）。只有区分这两种情况，清空字段才成为可能。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    fields: HashMap<String, FieldValue>,
}

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 提供一个字段的新值
    pub fn set(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// 显式清空一个可空字段（等价于 set NULL）
    pub fn clear(self, name: impl Into<String>) -> Self {
        self.set(name, FieldValue::Null)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// 该字段是否被提供（含显式 NULL）
    pub fn supplies(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl From<HashMap<String, FieldValue>> for EntityPatch {
    fn from(fields: HashMap<String, FieldValue>) -> Self {
        Self { fields }
    }
}

/// 合并：注册表里的每个字段，patch 提供且类型兼容则取 patch 值，否则保留存量值
///
/// 类型不兼容的取值（含对非空字段的显式 NULL）按未提供处理，
/// 畸形载荷属于上游 DTO 校验的职责。未注册的字段一律忽略。
pub fn merge(registry: &FieldRegistry, stored: &Snapshot, patch: &EntityPatch) -> Snapshot {
    let mut merged = Snapshot::with_capacity(registry.len());

    for field in registry.fields() {
        let incoming = patch.get(field.name).filter(|v| field.kind.accepts(v));
        match incoming {
            Some(value) => {
                merged.insert(field.name.to_string(), value.clone());
            }
            None => {
                if let Some(value) = stored.get(field.name) {
                    merged.insert(field.name.to_string(), value.clone());
                }
            }
        }
    }

    merged
}
