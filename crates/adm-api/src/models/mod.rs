//! Resources served by the list endpoints, and the audit events that
//! populate the log tables.

pub mod consumers;
pub mod events;
pub mod logs;
pub mod system;

pub use events::{AuditEvent, LoginRecord, OperateRecord};
pub use logs::{SysLoginLog, SysOperaLog};
pub use system::{SysApi, SysJob, SysRole, SysUser};
