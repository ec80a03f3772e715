//! 数据访问层 (DAO) - 每张表一个专门的操作模块
//!
//! 这里封装了所有数据库操作，确保：
//! - 数据操作的一致性和封装性
//! - 未来 schema 升级的兼容性

pub mod change_record;

pub use change_record::ChangeRecordDao;
