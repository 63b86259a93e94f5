use crate::{AccessKind, FrameId, PageId};
use core::{fmt, future::Future};
use pagesim_task_manage::{ContextId, TaskId};

/// 缺页事件号。每次提交的缺页处理独占一个。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EventId(usize);

impl EventId {
    /// 从编号构造。
    #[inline]
    pub const fn from_usize(v: usize) -> Self {
        Self(v)
    }

    /// 编号。
    #[inline]
    pub const fn get_usize(&self) -> usize {
        self.0
    }
}

/// 等待的对象。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum WaitKey {
    /// 等待页调入完成。
    Page(PageId),
    /// 等待一次缺页处理结束。
    Fault(EventId),
}

impl fmt::Display for WaitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(page) => write!(f, "page {page}"),
            Self::Fault(event) => write!(f, "fault #{}", event.0),
        }
    }
}

/// 中断向量：引发缺页的访问。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PageFault {
    /// 访问类型
    pub kind: AccessKind,
    /// 缺失的页
    pub page: PageId,
    /// 发起访问的上下文
    pub context: ContextId,
}

/// 虚存管理依赖的外部设施：调度、等待队列和换页设备。
///
/// 所有方法都取 `&self`，实现者自己负责内部可变性。
pub trait Host {
    /// 上下文所属的任务。
    fn task_of(&self, ctx: ContextId) -> Option<TaskId>;

    /// 上下文是否已被终止。
    fn is_terminated(&self, ctx: ContextId) -> bool;

    /// 把上下文挂到 `key` 的等待队列上，但不阻塞。
    fn enqueue(&self, ctx: ContextId, key: WaitKey);

    /// 在 `key` 上挂起，直到 `key` 被通知或上下文被终止。
    fn suspend(&self, ctx: ContextId, key: WaitKey) -> impl Future<Output = ()>;

    /// 唤醒 `key` 上的所有等待者。
    fn notify_all(&self, key: WaitKey);

    /// 让出处理器。
    fn dispatch(&self) -> impl Future<Output = ()>;

    /// 把 `frame` 的内容写到 `page` 的交换区。
    fn swap_out(&self, ctx: ContextId, page: PageId, frame: FrameId)
        -> impl Future<Output = ()>;

    /// 把 `page` 的交换区内容读进 `frame`。
    fn swap_in(&self, ctx: ContextId, page: PageId, frame: FrameId) -> impl Future<Output = ()>;

    /// 缺页中断。
    fn page_fault(&self, fault: &PageFault) {
        let _ = fault;
    }
}
