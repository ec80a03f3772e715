//! 存储层 - SQLite 持久化
//!
//! 本模块提供：
//! - change_record 宽表的实体定义与 DAO
//! - refinery 管理的 schema 迁移与初始化

pub mod dao;
pub mod entities;
pub mod migrate;

pub use dao::ChangeRecordDao;
pub use entities::{ChangeRecord, DeliverySlot, DeliveryStatus, SyncTarget};
