//! 变更台账服务 - 审计记录的唯一属主
//!
//! 负责管理台账记录的写入与查询。写入与触发它的实体更新必须落在同一个
//! SQLite 事务里：崩溃既不能留下未审计的更新，也不能留下没有对应更新的
//! 审计记录。发件箱 worker 只通过 `mark_delivered` / `mark_attempted`
//! 触碰既有记录的投递字段，永远不能新建、删除或改写 `changed_fields`。

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::diff::{diff, FieldChange};
use crate::error::{ProdSyncError, Result};
use crate::merge::{merge, EntityPatch};
use crate::registry::{FieldRegistry, Snapshot};
use crate::storage::dao::ChangeRecordDao;
use crate::storage::entities::{ChangeRecord, SyncTarget};
use crate::storage::migrate;

/// 一次更新管线的结果
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// 合并后的完整快照（交给调用方持久化/返回）
    pub merged: Snapshot,
    /// 稀疏变更集；为空表示 no-op 更新
    pub changed: Vec<FieldChange>,
    /// 台账记录 id；no-op 更新不产生记录，为 None
    pub record_id: Option<i64>,
}

/// 变更台账
#[derive(Clone)]
pub struct ChangeLedger {
    conn: Arc<Mutex<Connection>>,
}

impl ChangeLedger {
    /// 打开（必要时创建）台账数据库：pragmas → migrations → 版本校验
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)
            .map_err(|e| ProdSyncError::Database(format!("打开数据库失败: {}", e)))?;
        migrate::init_db(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库，测试与演示用
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| ProdSyncError::Database(format!("打开内存数据库失败: {}", e)))?;
        migrate::init_db(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 写入一条台账记录
    ///
    /// 空 diff 直接报 `EmptyDiff`：no-op 更新不产生记录，这条不变式在
    /// 边界强制，不信任调用方。
    pub fn record(&self, entity_id: u64, changed_fields: Vec<FieldChange>) -> Result<i64> {
        self.record_with(entity_id, changed_fields, |_| Ok(()))
    }

    /// 在同一个事务里执行调用方的实体写入和台账插入
    ///
    /// `apply` 失败或插入失败都会整体回滚（LedgerWriteFailed 语义：更新
    /// 要么连同审计一起成功，要么整体失败）。
    pub fn record_with<F>(&self, entity_id: u64, changed_fields: Vec<FieldChange>, apply: F) -> Result<i64>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        if changed_fields.is_empty() {
            return Err(ProdSyncError::EmptyDiff(format!(
                "实体 {} 的变更集为空，不允许落账",
                entity_id
            )));
        }

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        apply(&*conn)?;
        let record = ChangeRecord::new(entity_id, changed_fields);
        let id = ChangeRecordDao::new(&conn).insert(&record)?;
        tx.commit()?;
        Ok(id)
    }

    /// 完整更新管线：合并 → diff → 持久化 → 落账（一个事务）
    ///
    /// `persist` 拿到合并后的快照，负责写实体本身（未被跟踪的字段可能也
    /// 变了，对本子系统不可见，所以即使 diff 为空也照常执行）。只有 diff
    /// 非空才插入台账记录。
    pub fn apply_update<F>(
        &self,
        registry: &FieldRegistry,
        entity_id: u64,
        stored: &Snapshot,
        patch: &EntityPatch,
        persist: F,
    ) -> Result<UpdateOutcome>
    where
        F: FnOnce(&Connection, &Snapshot) -> Result<()>,
    {
        let merged = merge(registry, stored, patch);
        let changed = diff(registry, stored, &merged);

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        persist(&*conn, &merged)?;
        let record_id = if changed.is_empty() {
            None
        } else {
            let record = ChangeRecord::new(entity_id, changed.clone());
            Some(ChangeRecordDao::new(&conn).insert(&record)?)
        };
        tx.commit()?;

        Ok(UpdateOutcome {
            merged,
            changed,
            record_id,
        })
    }

    /// 某目标的待投递记录批次（oldest-first，可选退避阈值）
    pub fn pending_for_target(
        &self,
        target: SyncTarget,
        older_than: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>> {
        let conn = self.conn.lock();
        ChangeRecordDao::new(&conn).pending_for_target(target, older_than, limit)
    }

    /// 按记录 id 读取
    pub fn get(&self, id: i64) -> Result<Option<ChangeRecord>> {
        let conn = self.conn.lock();
        ChangeRecordDao::new(&conn).get_by_id(id)
    }

    /// 标记某目标已投递；返回本次调用是否完成了翻转
    /// （false = 已经投递过，并发抢投时落败一方按 no-op 跳过）
    pub fn mark_delivered(&self, id: i64, target: SyncTarget, at: i64) -> Result<bool> {
        let conn = self.conn.lock();
        ChangeRecordDao::new(&conn).mark_delivered(id, target, at)
    }

    /// 推进最近投递尝试时间
    pub fn mark_attempted(&self, id: i64, at: i64) -> Result<()> {
        let conn = self.conn.lock();
        ChangeRecordDao::new(&conn).mark_attempted(id, at)
    }

    /// 实体变更历史（只读查询面，供运营/UI 使用）
    pub fn history_for_entity(&self, entity_id: u64) -> Result<Vec<ChangeRecord>> {
        let conn = self.conn.lock();
        ChangeRecordDao::new(&conn).history_for_entity(entity_id)
    }

    /// 时间区间查询
    pub fn recorded_between(&self, from: i64, to: i64) -> Result<Vec<ChangeRecord>> {
        let conn = self.conn.lock();
        ChangeRecordDao::new(&conn).recorded_between(from, to)
    }

    /// 最老的仍有目标未投递的记录（积压告警）
    pub fn oldest_pending(&self) -> Result<Option<ChangeRecord>> {
        let conn = self.conn.lock();
        ChangeRecordDao::new(&conn).oldest_pending()
    }

    /// 各目标的待投递数量
    pub fn pending_counts(&self) -> Result<Vec<(SyncTarget, i64)>> {
        let conn = self.conn.lock();
        let dao = ChangeRecordDao::new(&conn);
        let mut counts = Vec::with_capacity(SyncTarget::ALL.len());
        for target in SyncTarget::ALL {
            counts.push((target, dao.count_pending(target)?));
        }
        Ok(counts)
    }
}
