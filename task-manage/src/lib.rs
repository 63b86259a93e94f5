//! 任务管理 lib
//!
//! 为虚存模拟提供任务、执行上下文的编号，就绪队列，以及任务与上下文之间的关系。

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

extern crate alloc;

mod id;
mod manager;
mod relation;
mod scheduler;

pub use id::*;
pub use manager::Manage;
pub use relation::TaskRel;
pub use scheduler::{FifoScheduler, Schedule};
