//! Order domain - 订单状态机、存储与编排
//!
//! # 结构
//!
//! - [`state_machine`] - 纯转换规则（无 IO）
//! - [`storage`] - redb 持久化（订单、幂等台账、死信）
//! - [`orchestrator`] - 事件与命令编排
//! - [`submission`] - 打印提交工作者（重试 + 退避）

pub mod orchestrator;
pub mod state_machine;
pub mod storage;
pub mod submission;

pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorResult};
pub use storage::{DeadLetterEntry, OrderStorage, StorageError};
pub use submission::{PrintSubmissionWorker, RetryPolicy, SubmissionRequest};
