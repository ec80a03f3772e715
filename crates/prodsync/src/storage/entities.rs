//! 存储实体定义

use serde::{Deserialize, Serialize};

use crate::diff::FieldChange;

/// 下游 ERP 同步目标，三个系统相互独立、各自失败各自重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTarget {
    Erp1,
    Erp2,
    Erp3,
}

impl SyncTarget {
    pub const ALL: [SyncTarget; 3] = [SyncTarget::Erp1, SyncTarget::Erp2, SyncTarget::Erp3];

    /// 对应投递列的前缀（{prefix}_delivered / {prefix}_delivered_at）
    pub fn column_prefix(&self) -> &'static str {
        match self {
            SyncTarget::Erp1 => "erp1",
            SyncTarget::Erp2 => "erp2",
            SyncTarget::Erp3 => "erp3",
        }
    }
}

/// 单个目标的投递槽
///
/// 只允许 `delivered: false → true` 单向翻转；`delivered_at` 在翻转瞬间
/// 写入一次，之后不再清空。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySlot {
    pub delivered: bool,
    pub delivered_at: Option<i64>,
}

/// 三个目标的投递状态块
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub erp1: DeliverySlot,
    pub erp2: DeliverySlot,
    pub erp3: DeliverySlot,
}

impl DeliveryStatus {
    pub fn slot(&self, target: SyncTarget) -> &DeliverySlot {
        match target {
            SyncTarget::Erp1 => &self.erp1,
            SyncTarget::Erp2 => &self.erp2,
            SyncTarget::Erp3 => &self.erp3,
        }
    }

    /// 三个槽全部投递完成
    pub fn fully_delivered(&self) -> bool {
        SyncTarget::ALL.iter().all(|t| self.slot(*t).delivered)
    }
}

/// 变更台账记录：一次更新事务一行
///
/// 创建后 `changed_fields` 与 `created_at` 不可变；发件箱 worker 只能改
/// 投递状态块与 `last_delivery_attempt_at`。记录不由本子系统删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// 行 id，插入后回填
    pub id: Option<i64>,
    /// 所属实体（Product 等被跟踪实体）的 id
    pub entity_id: u64,
    /// 稀疏变更集，只含真正变化的字段，按注册表顺序
    pub changed_fields: Vec<FieldChange>,
    pub delivery: DeliveryStatus,
    /// 任意目标最近一次投递尝试的时间（成功失败都更新），poller 用作粗粒度退避信号
    pub last_delivery_attempt_at: Option<i64>,
    pub created_at: i64,
}

impl ChangeRecord {
    /// 新建一条全目标未投递的记录
    pub fn new(entity_id: u64, changed_fields: Vec<FieldChange>) -> Self {
        Self {
            id: None,
            entity_id,
            changed_fields,
            delivery: DeliveryStatus::default(),
            last_delivery_attempt_at: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldValue;

    #[test]
    fn test_new_record_starts_all_pending() {
        let record = ChangeRecord::new(
            1,
            vec![FieldChange {
                field: "code".into(),
                old: FieldValue::Text("A1".into()),
                new: FieldValue::Text("A2".into()),
            }],
        );

        assert!(record.id.is_none());
        assert!(record.last_delivery_attempt_at.is_none());
        assert!(!record.delivery.fully_delivered());
        for target in SyncTarget::ALL {
            let slot = record.delivery.slot(target);
            assert!(!slot.delivered);
            assert!(slot.delivered_at.is_none());
        }
    }

    #[test]
    fn test_fully_delivered() {
        let mut status = DeliveryStatus::default();
        status.erp1 = DeliverySlot { delivered: true, delivered_at: Some(1) };
        status.erp2 = DeliverySlot { delivered: true, delivered_at: Some(2) };
        assert!(!status.fully_delivered());
        status.erp3 = DeliverySlot { delivered: true, delivered_at: Some(3) };
        assert!(status.fully_delivered());
    }
}
