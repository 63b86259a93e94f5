//! 模拟虚存管理。
//!
//! 地址翻译、按需调页、页帧分配和页面置换。所有任务共享固定数量的物理页帧；
//! 执行上下文之间的调度、等待队列和换页设备由 [`Host`] 提供。
//!
//! 所有状态放在一个 [`UPCell`](pagesim_sync::UPCell) 里：同一时刻只有一个上下文在运行，
//! 交错只发生在挂起点（`.await`），而挂起点上从不持有借用。

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

extern crate alloc;

mod config;
mod error;
mod fault;
mod frame;
mod host;
mod mmu;
mod page;
mod page_table;
mod replace;
mod state;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, PolicyKind, VmConfig};
pub use error::{Inconsistency, VmError};
pub use frame::{FrameId, FrameTable, FrameTableEntry};
pub use host::{EventId, Host, PageFault, WaitKey};
pub use mmu::{AccessKind, MemoryManager, Statistics};
pub use page::{PageId, PageTableEntry};
pub use page_table::PageTable;
pub use replace::{Fifo, Replace, Replacer, SecondChance};
pub use state::MemoryState;

pub use pagesim_task_manage::{ContextId, TaskId};
