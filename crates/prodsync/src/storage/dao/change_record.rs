//! 变更台账数据访问层 - 封装 change_record 表的所有数据库操作
//!
//! 功能包括：
//! - 台账记录的插入与读取
//! - 按目标查询待投递记录（FIFO + 退避过滤）
//! - 按目标独立的投递状态更新（单列 UPDATE，互不覆盖）
//! - 实体历史、时间区间、积压查询

use rusqlite::{params, Connection, Row};

use crate::diff::FieldChange;
use crate::error::{ProdSyncError, Result};
use crate::storage::entities::{ChangeRecord, DeliverySlot, DeliveryStatus, SyncTarget};

/// 变更台账数据访问对象
pub struct ChangeRecordDao<'a> {
    conn: &'a Connection,
}

impl<'a> ChangeRecordDao<'a> {
    /// 创建新的 ChangeRecordDao 实例
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 插入新记录，返回行 id
    ///
    /// 空 diff 的强制在台账服务边界完成，这里只负责落库。
    pub fn insert(&self, record: &ChangeRecord) -> Result<i64> {
        let changed_json = serde_json::to_string(&record.changed_fields)?;

        let sql = "INSERT INTO change_record (
            entity_id, changed_fields,
            erp1_delivered, erp1_delivered_at,
            erp2_delivered, erp2_delivered_at,
            erp3_delivered, erp3_delivered_at,
            last_delivery_attempt_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

        self.conn.execute(
            sql,
            params![
                record.entity_id as i64,
                changed_json,
                record.delivery.erp1.delivered,
                record.delivery.erp1.delivered_at,
                record.delivery.erp2.delivered,
                record.delivery.erp2.delivered_at,
                record.delivery.erp3.delivered,
                record.delivery.erp3.delivered_at,
                record.last_delivery_attempt_at,
                record.created_at,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// 按行 id 获取记录
    pub fn get_by_id(&self, id: i64) -> Result<Option<ChangeRecord>> {
        let sql = "SELECT * FROM change_record WHERE id = ?1";
        match self.conn.query_row(sql, params![id], |row| self.row_to_record(row)) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询某目标的待投递记录，oldest-first（FIFO，避免新变更饿死旧记录）
    ///
    /// `older_than` 为退避阈值：只返回 `last_delivery_attempt_at` 早于该值
    /// （或从未尝试过）的记录；传 None 则不过滤。
    pub fn pending_for_target(
        &self,
        target: SyncTarget,
        older_than: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>> {
        let sql = format!(
            "SELECT * FROM change_record
             WHERE {p}_delivered = 0
               AND (?1 IS NULL OR last_delivery_attempt_at IS NULL OR last_delivery_attempt_at < ?1)
             ORDER BY created_at ASC, id ASC
             LIMIT ?2",
            p = target.column_prefix()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![older_than, limit as i64], |row| {
            self.row_to_record(row)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// 把某目标的槽标记为已投递（幂等、单向）
    ///
    /// 只更新该目标自己的两列，并发更新不同目标的槽互不覆盖。
    /// 已投递的槽再次调用是 no-op，返回 false（行不存在则报错）。
    pub fn mark_delivered(&self, id: i64, target: SyncTarget, at: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE change_record
             SET {p}_delivered = 1, {p}_delivered_at = ?1
             WHERE id = ?2 AND {p}_delivered = 0",
            p = target.column_prefix()
        );

        let affected = self.conn.execute(&sql, params![at, id])?;
        if affected > 0 {
            return Ok(true);
        }

        // 区分「已投递的 no-op」与「记录不存在」
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM change_record WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(ProdSyncError::NotFound(format!("变更记录不存在: {}", id)));
        }
        Ok(false)
    }

    /// 推进最近投递尝试时间（不区分目标、不区分成败）
    pub fn mark_attempted(&self, id: i64, at: i64) -> Result<()> {
        let sql = "UPDATE change_record SET last_delivery_attempt_at = ?1 WHERE id = ?2";
        let affected = self.conn.execute(sql, params![at, id])?;
        if affected == 0 {
            return Err(ProdSyncError::NotFound(format!("变更记录不存在: {}", id)));
        }
        Ok(())
    }

    /// 某实体的全部变更历史，按发生顺序
    pub fn history_for_entity(&self, entity_id: u64) -> Result<Vec<ChangeRecord>> {
        let sql = "SELECT * FROM change_record WHERE entity_id = ?1 ORDER BY created_at ASC, id ASC";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![entity_id as i64], |row| self.row_to_record(row))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// 时间区间查询（created_at ∈ [from, to]，毫秒）
    pub fn recorded_between(&self, from: i64, to: i64) -> Result<Vec<ChangeRecord>> {
        let sql = "SELECT * FROM change_record
                   WHERE created_at >= ?1 AND created_at <= ?2
                   ORDER BY created_at ASC, id ASC";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![from, to], |row| self.row_to_record(row))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// 最老的、仍有任一目标未投递的记录（驱动积压看板/告警）
    pub fn oldest_pending(&self) -> Result<Option<ChangeRecord>> {
        let sql = "SELECT * FROM change_record
                   WHERE erp1_delivered = 0 OR erp2_delivered = 0 OR erp3_delivered = 0
                   ORDER BY created_at ASC, id ASC
                   LIMIT 1";
        match self.conn.query_row(sql, [], |row| self.row_to_record(row)) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 某目标的待投递数量（积压指标）
    pub fn count_pending(&self, target: SyncTarget) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM change_record WHERE {p}_delivered = 0",
            p = target.column_prefix()
        );
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// 将数据库行转换为 ChangeRecord 实体
    fn row_to_record(&self, row: &Row) -> rusqlite::Result<ChangeRecord> {
        let changed_json: String = row.get("changed_fields")?;
        let changed_fields: Vec<FieldChange> = serde_json::from_str(&changed_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(ChangeRecord {
            id: Some(row.get("id")?),
            entity_id: row.get::<_, i64>("entity_id")? as u64,
            changed_fields,
            delivery: DeliveryStatus {
                erp1: DeliverySlot {
                    delivered: row.get("erp1_delivered")?,
                    delivered_at: row.get("erp1_delivered_at")?,
                },
                erp2: DeliverySlot {
                    delivered: row.get("erp2_delivered")?,
                    delivered_at: row.get("erp2_delivered_at")?,
                },
                erp3: DeliverySlot {
                    delivered: row.get("erp3_delivered")?,
                    delivered_at: row.get("erp3_delivered_at")?,
                },
            },
            last_delivery_attempt_at: row.get("last_delivery_attempt_at")?,
            created_at: row.get("created_at")?,
        })
    }
}
