//! 同步发件箱 - 把台账变更推送到三个下游 ERP
//!
//! 每个 (记录, 目标) 对只有 Pending → Delivered 一条转移：失败没有终态，
//! 记录留在待投递集合里等下一轮轮询，由此实现无上限重试（不设重试上限、
//! 无死信通道，这是有意为之；目标长期不可达时待投递记录会无限累积，
//! 运营上盯 `ChangeLedger::pending_counts` / `oldest_pending`）。
//!
//! 拉取待投递集合的查询隔离在台账接口后面，之后若要换成事件触发，
//! 状态机本身不需要改动。

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::entities::ChangeRecord;

pub mod worker;

pub use worker::{OutboxConfig, OutboxMetrics, OutboxWorker};

/// 下游 ERP 推送客户端，每个目标一个实现
///
/// 对本子系统完全不透明：成功返回 Ok，失败返回 Err；重试完全由轮询
/// 周期驱动，客户端内部不做重试。
#[async_trait]
pub trait ErpPushClient: Send + Sync {
    async fn push(&self, record: &ChangeRecord) -> Result<()>;
}
