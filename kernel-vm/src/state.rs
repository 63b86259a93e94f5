use crate::{FrameId, FrameTable, PageId, PageTable, PageTableEntry};
use alloc::collections::BTreeMap;
use pagesim_task_manage::TaskId;

/// 逻辑时钟。每创建一个页、每次访存走一步。
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Clock(u64);

impl Clock {
    #[inline]
    pub fn tick(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    #[inline]
    pub fn now(&self) -> u64 {
        self.0
    }
}

/// 页帧表和所有页表。
///
/// 置换算法通过它观察和修改内存状态。
pub struct MemoryState {
    frames: FrameTable,
    tables: BTreeMap<TaskId, PageTable>,
    clock: Clock,
    evictions: u64,
}

impl MemoryState {
    pub(crate) fn new(frames: usize) -> Self {
        Self {
            frames: FrameTable::new(frames),
            tables: BTreeMap::new(),
            clock: Clock::default(),
            evictions: 0,
        }
    }

    /// 页帧表。
    #[inline]
    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    #[inline]
    pub(crate) fn frames_mut(&mut self) -> &mut FrameTable {
        &mut self.frames
    }

    /// 任务的页表。
    #[inline]
    pub fn table(&self, task: TaskId) -> Option<&PageTable> {
        self.tables.get(&task)
    }

    #[inline]
    pub(crate) fn tables(&self) -> impl Iterator<Item = &PageTable> {
        self.tables.values()
    }

    /// 查询页表项。
    #[inline]
    pub fn page(&self, id: PageId) -> Option<&PageTableEntry> {
        self.tables.get(&id.task)?.page(id.number)
    }

    #[inline]
    pub(crate) fn page_mut(&mut self, id: PageId) -> Option<&mut PageTableEntry> {
        self.tables.get_mut(&id.task)?.page_mut(id.number)
    }

    /// 当前逻辑时刻。
    #[inline]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    #[inline]
    pub(crate) fn tick(&mut self) -> u64 {
        self.clock.tick()
    }

    /// 累计换出的页数。
    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// 清除页帧的访问位。
    #[inline]
    pub fn clear_referenced(&mut self, frame: FrameId) {
        self.frames[frame].set_referenced(false);
    }

    /// 把占用者从页帧上摘下：页置为无效，页帧清空。
    ///
    /// 不检查脏位，调用者负责先换出。
    pub fn detach(&mut self, frame: FrameId) -> Option<PageId> {
        let occupant = self.frames[frame].page();
        self.frames[frame].clear();
        if let Some(page) = occupant {
            if let Some(entry) = self.page_mut(page) {
                entry.invalidate();
            }
            self.evictions += 1;
            log::debug!("evict {page} from {frame}");
        }
        occupant
    }

    /// 把页绑定到页帧，调页期间待加的锁落到页帧上。
    pub(crate) fn bind(&mut self, page: PageId, frame: FrameId) {
        let Some(entry) = self.page_mut(page) else {
            return;
        };
        entry.set_frame(Some(frame));
        let pending = entry.pending_locks();
        entry.set_pending_locks(0);
        for _ in 0..pending {
            self.frames[frame].increment_lock_count();
        }
    }

    pub(crate) fn create_table(&mut self, task: TaskId, page_address_bits: u32) -> bool {
        if self.tables.contains_key(&task) {
            return false;
        }
        let table = PageTable::new(task, page_address_bits, &mut self.clock);
        self.tables.insert(task, table);
        true
    }

    pub(crate) fn destroy_table(&mut self, task: TaskId) -> Option<usize> {
        let mut table = self.tables.remove(&task)?;
        Some(table.deallocate_memory(&mut self.frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_invalidates_occupant() {
        let task = TaskId::from_usize(0);
        let mut state = MemoryState::new(2);
        assert!(state.create_table(task, 2));
        assert!(!state.create_table(task, 2));

        let page = PageId::new(task, 1);
        let frame = FrameId::new(1);
        state.frames_mut()[frame].set_page(Some(page));
        state.frames_mut()[frame].touch(true);
        let entry = state.page_mut(page).unwrap();
        entry.set_valid(true);
        entry.set_frame(Some(frame));

        assert_eq!(state.detach(frame), Some(page));
        assert!(state.frames()[frame].is_free());
        assert!(!state.frames()[frame].is_dirty());
        assert!(!state.page(page).unwrap().is_valid());
        assert_eq!(state.evictions(), 1);

        assert_eq!(state.detach(frame), None);
        assert_eq!(state.evictions(), 1);
    }

    #[test]
    fn clock_advances_with_tables() {
        let mut state = MemoryState::new(1);
        state.create_table(TaskId::from_usize(0), 3);
        assert_eq!(state.now(), 8);
        assert_eq!(state.tick(), 9);
        assert_eq!(state.destroy_table(TaskId::from_usize(0)), Some(0));
        assert_eq!(state.destroy_table(TaskId::from_usize(0)), None);
    }
}
