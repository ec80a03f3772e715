//! Prodsync - 产品变更台账与多目标同步发件箱
//!
//! 本库提供质量管理系统里唯一有设计含量的子系统：
//! - 📋 字段注册表驱动的部分更新合并与字段级 diff
//! - 🧾 不可变变更台账：一次更新事务一行，与实体写入同事务落库
//! - 📤 发件箱 worker：轮询台账，独立向三个下游 ERP 重试投递
//! - 🔁 at-least-once 语义：投递状态按目标单向翻转，失败即留待下一轮
//!
//! CRUD 持久层、HTTP API 与 UI 是外部协作方，不在本库范围内。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use prodsync::{
//!     ChangeLedger, EntityPatch, ErpPushClient, FieldRegistry, FieldValue,
//!     OutboxConfig, OutboxWorker, SyncTarget,
//! };
//!
//! # struct HttpErpClient;
//! # #[async_trait::async_trait]
//! # impl ErpPushClient for HttpErpClient {
//! #     async fn push(&self, _record: &prodsync::ChangeRecord) -> prodsync::Result<()> { Ok(()) }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 打开台账数据库（自动执行 migrations）
//!     let ledger = ChangeLedger::open("data/changes.db")?;
//!     let registry = FieldRegistry::product();
//!
//!     // CRUD 更新处理器：合并部分更新、计算 diff、与实体写入同事务落账
//!     let stored = prodsync::Snapshot::new(); // 实际从产品表读出
//!     let patch = EntityPatch::new().set("code", FieldValue::Text("A2".into()));
//!     let outcome = ledger.apply_update(&registry, 1, &stored, &patch, |_conn, _merged| {
//!         // 在同一个事务里写产品表
//!         Ok(())
//!     })?;
//!     println!("changed fields: {}", outcome.changed.len());
//!
//!     // 后台发件箱：每个目标一个推送客户端
//!     let mut clients: HashMap<SyncTarget, Arc<dyn ErpPushClient>> = HashMap::new();
//!     clients.insert(SyncTarget::Erp1, Arc::new(HttpErpClient));
//!     clients.insert(SyncTarget::Erp2, Arc::new(HttpErpClient));
//!     clients.insert(SyncTarget::Erp3, Arc::new(HttpErpClient));
//!     let worker = OutboxWorker::new(OutboxConfig::default(), ledger, clients);
//!     worker.start().await?;
//!
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod diff;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod outbox;
pub mod registry;
pub mod storage;
pub mod version;

// 重新导出核心类型，方便使用
pub use diff::{diff, FieldChange};
pub use error::{ProdSyncError, Result};
pub use ledger::{ChangeLedger, UpdateOutcome};
pub use merge::{merge, EntityPatch};
pub use outbox::{ErpPushClient, OutboxConfig, OutboxMetrics, OutboxWorker};
pub use registry::{FieldKind, FieldRegistry, FieldValue, Snapshot, TrackedField};
pub use storage::entities::{ChangeRecord, DeliverySlot, DeliveryStatus, SyncTarget};
