use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

/// 任务 Id
///
/// 任务拥有地址空间（页表）和交换文件，是页帧预留的所有者。
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct TaskId(usize);

impl TaskId {
    /// 分配一个新的任务 Id
    pub fn new() -> Self {
        // 任务编号计数器，任务编号自增
        static TASK_COUNTER: AtomicUsize = AtomicUsize::new(0);
        let id = TASK_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(id)
    }
    /// 从整数构造
    pub const fn from_usize(v: usize) -> Self {
        Self(v)
    }
    /// 转换为整数
    pub const fn get_usize(&self) -> usize {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// 执行上下文 Id
///
/// 执行上下文属于某个任务，发起访存、加锁，也是缺页的验证者。
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ContextId(usize);

impl ContextId {
    /// 分配一个新的上下文 Id
    pub fn new() -> Self {
        static CONTEXT_COUNTER: AtomicUsize = AtomicUsize::new(0);
        let id = CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(id)
    }
    /// 从整数构造
    pub const fn from_usize(v: usize) -> Self {
        Self(v)
    }
    /// 转换为整数
    pub const fn get_usize(&self) -> usize {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}
