use crate::{host::WaitKey, AccessKind, FrameId, Host, MemoryManager, VmError};
use core::fmt;
use pagesim_task_manage::{ContextId, TaskId};

/// 虚页号：所属任务和页表下标。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PageId {
    /// 所属任务
    pub task: TaskId,
    /// 页表下标
    pub number: usize,
}

impl PageId {
    /// 新建页号。
    #[inline]
    pub const fn new(task: TaskId, number: usize) -> Self {
        Self { task, number }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:P{}", self.task, self.number)
    }
}

/// 页表项。
#[derive(Clone, Debug)]
pub struct PageTableEntry {
    id: PageId,
    valid: bool,
    frame: Option<FrameId>,
    validating: Option<ContextId>,
    pending_locks: usize,
    created_at: u64,
}

impl PageTableEntry {
    pub(crate) const fn new(id: PageId, created_at: u64) -> Self {
        Self {
            id,
            valid: false,
            frame: None,
            validating: None,
            pending_locks: 0,
            created_at,
        }
    }

    /// 页号。
    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// 页是否在内存里。
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// 页所在的页帧。
    ///
    /// 缺页处理期间页帧先于有效位绑定。
    #[inline]
    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    #[inline]
    pub(crate) fn set_frame(&mut self, frame: Option<FrameId>) {
        self.frame = frame;
    }

    /// 正在为这个页处理缺页的上下文。
    #[inline]
    pub fn validating(&self) -> Option<ContextId> {
        self.validating
    }

    #[inline]
    pub(crate) fn set_validating(&mut self, ctx: Option<ContextId>) {
        self.validating = ctx;
    }

    /// 还没绑定页帧时，调页的上下文自己加的锁。
    ///
    /// 页帧绑定时转成页帧的加锁计数。
    #[inline]
    pub fn pending_locks(&self) -> usize {
        self.pending_locks
    }

    #[inline]
    pub(crate) fn set_pending_locks(&mut self, count: usize) {
        self.pending_locks = count;
    }

    /// 创建时刻。
    #[inline]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// 置为无效并解除页帧绑定。
    #[inline]
    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
        self.frame = None;
    }
}

enum LockStep {
    Pinned,
    Fault,
    Wait,
}

impl MemoryManager {
    /// 锁定页，使它所在的页帧不会被换出。
    ///
    /// 页不在内存时先调页。正在为这个页处理缺页的上下文可以重入加锁。
    pub async fn lock_page<H: Host>(
        &self,
        host: &H,
        ctx: ContextId,
        page: PageId,
    ) -> Result<(), VmError> {
        loop {
            if host.is_terminated(ctx) {
                return Err(VmError::ContextTerminated);
            }
            let step = self.inner.exclusive_session(|inner| -> Result<_, VmError> {
                let state = &mut inner.state;
                let entry = state.page(page).ok_or(VmError::NoSuchTask(page.task))?;
                let (valid, frame, validating) =
                    (entry.is_valid(), entry.frame(), entry.validating());
                let step = match validating {
                    _ if valid => LockStep::Pinned,
                    None => LockStep::Fault,
                    Some(owner) if owner == ctx => LockStep::Pinned,
                    Some(_) => LockStep::Wait,
                };
                if let LockStep::Pinned = step {
                    match frame {
                        Some(frame) => state.frames_mut()[frame].increment_lock_count(),
                        // 换出牺牲者期间还没有页帧，绑定时再加
                        None => {
                            if let Some(entry) = state.page_mut(page) {
                                entry.set_pending_locks(entry.pending_locks() + 1);
                            }
                        }
                    }
                }
                Ok(step)
            })?;
            match step {
                LockStep::Pinned => return Ok(()),
                LockStep::Fault => {
                    match self
                        .handle_page_fault(host, ctx, AccessKind::Lock, page)
                        .await
                    {
                        Ok(()) | Err(VmError::RedundantFault) => {}
                        Err(e) => return Err(e),
                    }
                }
                LockStep::Wait => host.suspend(ctx, WaitKey::Page(page)).await,
            }
        }
    }

    /// 解锁页。计数不会减到 0 以下。
    ///
    /// 页还没绑定页帧时撤销一个待加的锁，都没有时什么也不做。
    pub fn unlock_page(&self, page: PageId) {
        let mut inner = self.inner.exclusive_access();
        let state = &mut inner.state;
        let Some(entry) = state.page_mut(page) else {
            return;
        };
        match entry.frame() {
            Some(frame) => state.frames_mut()[frame].decrement_lock_count(),
            None => entry.set_pending_locks(entry.pending_locks().saturating_sub(1)),
        }
    }
}
