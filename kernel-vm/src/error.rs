use crate::{FrameId, PageId};
use core::fmt;
use pagesim_task_manage::{ContextId, TaskId};

/// 访存、加锁和缺页处理的失败原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmError {
    /// 上下文在挂起期间被终止。
    ContextTerminated,
    /// 所有页帧都被预留或加锁，无法调页。
    NotEnoughMemory,
    /// 缺页时页已经有效，本次处理是多余的。
    RedundantFault,
    /// 虚地址超出地址空间。
    AddressOutOfRange {
        /// 访问的地址
        address: usize,
        /// 虚地址位数
        bits: u32,
    },
    /// 任务没有页表。
    NoSuchTask(TaskId),
    /// 运行环境不认识这个上下文。
    NoSuchContext(ContextId),
    /// 任务已经有页表。
    TaskExists(TaskId),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContextTerminated => f.write_str("execution context terminated while suspended"),
            Self::NotEnoughMemory => f.write_str("every frame is reserved or locked"),
            Self::RedundantFault => f.write_str("page fault on a page that is already valid"),
            Self::AddressOutOfRange { address, bits } => {
                write!(f, "address {address:#x} is outside the {bits}-bit address space")
            }
            Self::NoSuchTask(task) => write!(f, "task {task} has no page table"),
            Self::NoSuchContext(ctx) => write!(f, "unknown execution context {ctx}"),
            Self::TaskExists(task) => write!(f, "task {task} already has a page table"),
        }
    }
}

/// 页帧与页之间交叉引用不一致。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inconsistency {
    /// 出问题的页帧
    pub frame: Option<FrameId>,
    /// 出问题的页
    pub page: Option<PageId>,
    /// 说明
    pub reason: &'static str,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason)?;
        if let Some(frame) = self.frame {
            write!(f, " (frame {frame})")?;
        }
        if let Some(page) = self.page {
            write!(f, " (page {page})")?;
        }
        Ok(())
    }
}
