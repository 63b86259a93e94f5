//! 同步互斥模块
//!
//! 单处理器协作式调度下的独占单元，以及按资源标识分组的等待队列。

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

mod up;
mod wait_queue;

extern crate alloc;

pub use up::UPCell;
pub use wait_queue::WaitQueues;
