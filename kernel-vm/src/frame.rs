use crate::PageId;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::{
    fmt,
    ops::{Index, IndexMut},
};
use pagesim_task_manage::TaskId;

/// 物理页帧号。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FrameId(usize);

impl FrameId {
    /// 从下标构造。
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// 页帧在页帧表中的下标。
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

bitflags! {
    /// 页帧状态位。
    pub(crate) struct FrameFlags: u8 {
        /// 换入后被写过。
        const DIRTY = 1 << 0;
        /// 上次时钟扫描后被访问过。
        const REFERENCED = 1 << 1;
    }
}

/// 页帧表项。
///
/// 占用者只记录页号，页表才是页的所有者。
#[derive(Clone, Debug)]
pub struct FrameTableEntry {
    id: FrameId,
    occupant: Option<PageId>,
    flags: FrameFlags,
    lock_count: usize,
    reserved_by: Option<TaskId>,
}

impl FrameTableEntry {
    pub(crate) const fn new(id: FrameId) -> Self {
        Self {
            id,
            occupant: None,
            flags: FrameFlags::empty(),
            lock_count: 0,
            reserved_by: None,
        }
    }

    /// 页帧号。
    #[inline]
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// 占用这个页帧的页。
    #[inline]
    pub fn page(&self) -> Option<PageId> {
        self.occupant
    }

    #[inline]
    pub(crate) fn set_page(&mut self, page: Option<PageId>) {
        self.occupant = page;
    }

    /// 换入后是否被写过。
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(FrameFlags::DIRTY)
    }

    #[inline]
    pub(crate) fn set_dirty(&mut self, value: bool) {
        self.flags.set(FrameFlags::DIRTY, value);
    }

    /// 上次时钟扫描后是否被访问过。
    #[inline]
    pub fn is_referenced(&self) -> bool {
        self.flags.contains(FrameFlags::REFERENCED)
    }

    #[inline]
    pub(crate) fn set_referenced(&mut self, value: bool) {
        self.flags.set(FrameFlags::REFERENCED, value);
    }

    /// 记录一次访问：总是置访问位，写访问还要置脏位。
    #[inline]
    pub(crate) fn touch(&mut self, write: bool) {
        self.flags.insert(FrameFlags::REFERENCED);
        if write {
            self.flags.insert(FrameFlags::DIRTY);
        }
    }

    /// 加锁计数。
    #[inline]
    pub fn lock_count(&self) -> usize {
        self.lock_count
    }

    #[inline]
    pub(crate) fn increment_lock_count(&mut self) {
        self.lock_count += 1;
    }

    /// 计数不会减到 0 以下。
    #[inline]
    pub(crate) fn decrement_lock_count(&mut self) {
        self.lock_count = self.lock_count.saturating_sub(1);
    }

    #[inline]
    pub(crate) fn reset_lock_count(&mut self) {
        self.lock_count = 0;
    }

    /// 预留这个页帧的任务。
    #[inline]
    pub fn reserved_by(&self) -> Option<TaskId> {
        self.reserved_by
    }

    /// 是否被预留。
    #[inline]
    pub fn is_reserved(&self) -> bool {
        self.reserved_by.is_some()
    }

    #[inline]
    pub(crate) fn reserve(&mut self, task: TaskId) {
        self.reserved_by = Some(task);
    }

    /// 只有预留者本身能解除预留。
    #[inline]
    pub(crate) fn unreserve(&mut self, task: TaskId) {
        if self.reserved_by == Some(task) {
            self.reserved_by = None;
        }
    }

    /// 是否被加锁。
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    /// 被预留或加锁，不能分配也不能换出。
    #[inline]
    pub fn is_unavailable(&self) -> bool {
        self.is_reserved() || self.is_locked()
    }

    /// 可以作为置换的牺牲者。
    #[inline]
    pub fn is_evictable(&self) -> bool {
        !self.is_unavailable()
    }

    /// 空闲：没有占用者，未预留，未加锁。
    #[inline]
    pub fn is_free(&self) -> bool {
        self.occupant.is_none() && self.is_evictable()
    }

    /// 空闲且状态位都已清零。
    #[inline]
    pub(crate) fn is_clean_free(&self) -> bool {
        self.is_free() && self.flags.is_empty()
    }

    /// 清空占用者和状态位，保留加锁计数和预留。
    #[inline]
    pub(crate) fn clear(&mut self) {
        self.occupant = None;
        self.flags = FrameFlags::empty();
    }
}

/// 页帧表。
pub struct FrameTable {
    entries: Vec<FrameTableEntry>,
}

impl FrameTable {
    /// 建立 `len` 个空闲页帧。
    pub fn new(len: usize) -> Self {
        Self {
            entries: (0..len).map(|i| FrameTableEntry::new(FrameId(i))).collect(),
        }
    }

    /// 页帧总数。
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 页帧表是否为空。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 查询页帧。
    #[inline]
    pub fn get(&self, id: FrameId) -> Option<&FrameTableEntry> {
        self.entries.get(id.0)
    }

    /// 遍历页帧。
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &FrameTableEntry> {
        self.entries.iter()
    }

    /// 从 0 号开始找第一个空闲页帧。
    pub fn free_frame(&self) -> Option<FrameId> {
        self.entries.iter().find(|f| f.is_free()).map(|f| f.id)
    }

    /// 当前空闲页帧数。不改变任何状态位。
    pub fn count_free(&self) -> usize {
        self.entries.iter().filter(|f| f.is_clean_free()).count()
    }

    /// 被预留或加锁的页帧数。
    pub fn count_unavailable(&self) -> usize {
        self.entries.iter().filter(|f| f.is_unavailable()).count()
    }
}

impl Index<FrameId> for FrameTable {
    type Output = FrameTableEntry;

    #[inline]
    fn index(&self, id: FrameId) -> &Self::Output {
        &self.entries[id.0]
    }
}

impl IndexMut<FrameId> for FrameTable {
    #[inline]
    fn index_mut(&mut self, id: FrameId) -> &mut Self::Output {
        &mut self.entries[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize) -> PageId {
        PageId::new(TaskId::from_usize(0), n)
    }

    #[test]
    fn new_table_is_all_free() {
        let table = FrameTable::new(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.count_free(), 3);
        assert_eq!(table.count_unavailable(), 0);
        assert_eq!(table.free_frame(), Some(FrameId::new(0)));
    }

    #[test]
    fn lock_count_never_goes_negative() {
        let mut frame = FrameTableEntry::new(FrameId::new(0));
        frame.decrement_lock_count();
        frame.decrement_lock_count();
        assert_eq!(frame.lock_count(), 0);

        frame.increment_lock_count();
        assert!(frame.is_locked());
        frame.decrement_lock_count();
        frame.decrement_lock_count();
        assert_eq!(frame.lock_count(), 0);
        assert!(frame.is_free());
    }

    #[test]
    fn only_the_owner_releases_a_reservation() {
        let mut frame = FrameTableEntry::new(FrameId::new(0));
        let owner = TaskId::from_usize(1);
        frame.reserve(owner);
        frame.unreserve(TaskId::from_usize(2));
        assert_eq!(frame.reserved_by(), Some(owner));
        assert!(!frame.is_free());
        frame.unreserve(owner);
        assert!(frame.is_free());
    }

    #[test]
    fn touch_sets_dirty_only_on_write() {
        let mut frame = FrameTableEntry::new(FrameId::new(0));
        frame.touch(false);
        assert!(frame.is_referenced());
        assert!(!frame.is_dirty());
        frame.touch(true);
        assert!(frame.is_dirty());
    }

    #[test]
    fn free_search_skips_occupied_reserved_and_locked() {
        let mut table = FrameTable::new(4);
        table[FrameId::new(0)].set_page(Some(page(0)));
        table[FrameId::new(1)].reserve(TaskId::from_usize(0));
        table[FrameId::new(2)].increment_lock_count();
        assert_eq!(table.free_frame(), Some(FrameId::new(3)));
        assert_eq!(table.count_unavailable(), 2);
        assert_eq!(table.count_free(), 1);

        table[FrameId::new(3)].set_referenced(true);
        // 有访问位的空页帧可以分配，但不计入空闲数
        assert_eq!(table.free_frame(), Some(FrameId::new(3)));
        assert_eq!(table.count_free(), 0);
    }
}
