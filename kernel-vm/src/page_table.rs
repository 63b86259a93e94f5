use crate::{state::Clock, FrameId, FrameTable, PageId, PageTableEntry};
use alloc::vec::Vec;
use pagesim_task_manage::TaskId;

/// 一个任务的页表。
///
/// 项数固定为 `2^page_address_bits`，按页号依次创建，所以创建时刻随页号递增。
pub struct PageTable {
    task: TaskId,
    pages: Vec<PageTableEntry>,
}

impl PageTable {
    /// 为 `task` 新建页表。
    pub(crate) fn new(task: TaskId, page_address_bits: u32, clock: &mut Clock) -> Self {
        let len = 1usize << page_address_bits;
        Self {
            task,
            pages: (0..len)
                .map(|number| PageTableEntry::new(PageId::new(task, number), clock.tick()))
                .collect(),
        }
    }

    /// 所属任务。
    #[inline]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// 页表项数。
    #[inline]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// 页表是否为空。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// 查询页表项。
    #[inline]
    pub fn page(&self, number: usize) -> Option<&PageTableEntry> {
        self.pages.get(number)
    }

    #[inline]
    pub(crate) fn page_mut(&mut self, number: usize) -> Option<&mut PageTableEntry> {
        self.pages.get_mut(number)
    }

    /// 遍历页表项。
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.pages.iter()
    }

    /// 释放任务占用的所有页帧，返回释放的页帧数。
    ///
    /// 任务的所有上下文都已结束，所以这些页帧上的锁也一并清除。
    /// 任务在其他页帧上的预留（调页中途的页帧）同样放弃，那些页帧的加锁计数不变。
    pub(crate) fn deallocate_memory(&mut self, frames: &mut FrameTable) -> usize {
        let task = self.task;
        let mut released = 0;
        for i in 0..frames.len() {
            let frame = &mut frames[FrameId::new(i)];
            if frame.page().map_or(false, |page| page.task == task) {
                frame.clear();
                frame.reset_lock_count();
                released += 1;
            }
            frame.unreserve(task);
        }
        for page in &mut self.pages {
            page.invalidate();
            page.set_validating(None);
        }
        released
    }
}
