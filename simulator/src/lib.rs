//! 虚存管理模拟器。
//!
//! 从 TOML 场景建立任务和执行上下文，用协作式执行器驱动它们访存，
//! 由模拟的换页设备完成换入换出，最后给出事件记录、计数器和一致性检查结果。

#![deny(missing_docs)]

mod error;
mod host;
mod program;
mod report;
mod runtime;
mod scenario;

pub use error::SimError;
pub use report::{Report, TraceEntry, TraceEvent};
pub use runtime::run;
pub use scenario::{ContextSpec, Device, KillSpec, Memory, Op, Scenario, Summary, TaskSpec};
