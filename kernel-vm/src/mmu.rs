use crate::{
    host::{PageFault, WaitKey},
    ConfigError, FrameId, FrameTableEntry, Host, Inconsistency, MemoryState, PageId,
    PageTableEntry, Replacer, VmConfig, VmError,
};
use core::fmt;
use pagesim_sync::UPCell;
use pagesim_task_manage::{ContextId, TaskId};

/// 访存类型。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AccessKind {
    /// 读
    Read,
    /// 写
    Write,
    /// 加锁
    Lock,
}

impl AccessKind {
    #[inline]
    pub(crate) fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Lock => f.write_str("lock"),
        }
    }
}

/// 计数器快照。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Statistics {
    /// 访存次数
    pub references: u64,
    /// 提交的缺页处理次数
    pub page_faults: u64,
    /// 完成的换入次数
    pub swap_ins: u64,
    /// 完成的换出次数
    pub swap_outs: u64,
    /// 摘下页的次数
    pub evictions: u64,
    /// 多余的缺页
    pub redundant_faults: u64,
    /// 没有可用页帧的次数
    pub not_enough_memory: u64,
    /// 上下文被终止而中止的缺页处理
    pub aborted_faults: u64,
}

pub(crate) struct Inner {
    pub state: MemoryState,
    pub replacer: Replacer,
    pub stats: Statistics,
    pub last_fault: Option<PageFault>,
    next_event: usize,
}

impl Inner {
    pub fn next_event(&mut self) -> crate::EventId {
        self.next_event += 1;
        crate::EventId::from_usize(self.next_event)
    }
}

enum Translated {
    Touched,
    Absent,
    Busy,
}

/// 虚存管理器。
///
/// 页帧表、页表、置换算法和计数器都归它所有。
pub struct MemoryManager {
    config: VmConfig,
    pub(crate) inner: UPCell<Inner>,
}

impl MemoryManager {
    /// 按配置新建，所有页帧空闲。
    pub fn new(config: VmConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!(
            "{} frames, {}-bit addresses, {}-bit pages, {}",
            config.frames,
            config.virtual_address_bits,
            config.page_address_bits,
            config.policy,
        );
        Ok(Self {
            inner: UPCell::new(Inner {
                state: MemoryState::new(config.frames),
                replacer: Replacer::new(config.policy, config.frames_wanted),
                stats: Statistics::default(),
                last_fault: None,
                next_event: 0,
            }),
            config,
        })
    }

    /// 配置。
    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 虚地址对应的页号。
    pub fn page_number(&self, address: usize) -> Result<usize, VmError> {
        let bits = self.config.virtual_address_bits;
        if address >> bits != 0 {
            return Err(VmError::AddressOutOfRange { address, bits });
        }
        Ok(address >> self.config.offset_bits())
    }

    /// 任务 `task` 的虚地址 `address` 所在的页。
    pub fn page_of(&self, task: TaskId, address: usize) -> Result<PageId, VmError> {
        let number = self.page_number(address)?;
        if self.inner.access().state.table(task).is_none() {
            return Err(VmError::NoSuchTask(task));
        }
        Ok(PageId::new(task, number))
    }

    /// 为任务建立页表。
    pub fn create_page_table(&self, task: TaskId) -> Result<(), VmError> {
        let bits = self.config.page_address_bits;
        if !self.inner.exclusive_access().state.create_table(task, bits) {
            return Err(VmError::TaskExists(task));
        }
        log::debug!("page table for {task}: {} pages", self.config.page_table_size());
        Ok(())
    }

    /// 销毁任务的页表，释放它占用的页帧。返回释放的页帧数。
    pub fn destroy_page_table(&self, task: TaskId) -> Result<usize, VmError> {
        let released = self
            .inner
            .exclusive_access()
            .state
            .destroy_table(task)
            .ok_or(VmError::NoSuchTask(task))?;
        log::debug!("page table for {task} destroyed, {released} frames released");
        Ok(released)
    }

    /// 访存。
    ///
    /// 页不在内存时调页或等待别人调页。返回时页一定有效，且访问位已置，写访问还置了脏位；
    /// 上下文在等待中被终止则不修改任何状态位。
    pub async fn reference<H: Host>(
        &self,
        host: &H,
        ctx: ContextId,
        address: usize,
        kind: AccessKind,
    ) -> Result<PageId, VmError> {
        let task = host.task_of(ctx).ok_or(VmError::NoSuchContext(ctx))?;
        let page = self.page_of(task, address)?;
        self.inner.exclusive_session(|inner| {
            inner.state.tick();
            inner.stats.references += 1;
        });
        loop {
            if host.is_terminated(ctx) {
                return Err(VmError::ContextTerminated);
            }
            let translated = self.inner.exclusive_session(|inner| -> Result<_, VmError> {
                let state = &mut inner.state;
                let entry = state.page(page).ok_or(VmError::NoSuchTask(task))?;
                Ok(match (entry.is_valid(), entry.frame(), entry.validating()) {
                    (true, Some(frame), _) => {
                        state.frames_mut()[frame].touch(kind.is_write());
                        Translated::Touched
                    }
                    (_, _, None) => Translated::Absent,
                    (_, _, Some(_)) => Translated::Busy,
                })
            })?;
            match translated {
                Translated::Touched => return Ok(page),
                Translated::Absent => {
                    let fault = PageFault {
                        kind,
                        page,
                        context: ctx,
                    };
                    self.inner.exclusive_access().last_fault = Some(fault);
                    host.page_fault(&fault);
                    match self.handle_page_fault(host, ctx, kind, page).await {
                        Ok(()) | Err(VmError::RedundantFault) => {}
                        Err(e) => return Err(e),
                    }
                }
                Translated::Busy => host.suspend(ctx, WaitKey::Page(page)).await,
            }
        }
    }

    /// 页所在的页帧。
    #[inline]
    pub fn frame_of(&self, page: PageId) -> Option<FrameId> {
        self.inner.access().state.page(page)?.frame()
    }

    /// 页帧表项的快照。
    pub fn frame(&self, id: FrameId) -> Option<FrameTableEntry> {
        self.inner.access().state.frames().get(id).cloned()
    }

    /// 所有页帧的快照。
    pub fn frames(&self) -> alloc::vec::Vec<FrameTableEntry> {
        self.inner.access().state.frames().iter().cloned().collect()
    }

    /// 页表项的快照。
    pub fn page(&self, id: PageId) -> Option<PageTableEntry> {
        self.inner.access().state.page(id).cloned()
    }

    /// 当前空闲页帧数。
    pub fn free_frames(&self) -> usize {
        self.inner.access().state.frames().count_free()
    }

    /// 最近一次缺页的中断向量。
    pub fn last_fault(&self) -> Option<PageFault> {
        self.inner.access().last_fault
    }

    /// 计数器快照。
    pub fn stats(&self) -> Statistics {
        let inner = self.inner.access();
        Statistics {
            evictions: inner.state.evictions(),
            ..inner.stats
        }
    }

    /// 检查页帧和页之间的交叉引用。
    ///
    /// 正在处理缺页的页跳过检查。
    pub fn audit(&self) -> Result<(), Inconsistency> {
        let inner = self.inner.access();
        let state = &inner.state;
        for frame in state.frames().iter() {
            let id = Some(frame.id());
            match frame.page() {
                Some(page) => {
                    let Some(entry) = state.page(page) else {
                        return Err(Inconsistency {
                            frame: id,
                            page: Some(page),
                            reason: "frame occupied by a page without a page table",
                        });
                    };
                    if !entry.is_valid() || entry.frame() != id {
                        return Err(Inconsistency {
                            frame: id,
                            page: Some(page),
                            reason: "occupant is not valid in this frame",
                        });
                    }
                }
                None if frame.is_dirty() || frame.is_referenced() => {
                    return Err(Inconsistency {
                        frame: id,
                        page: None,
                        reason: "empty frame has status bits set",
                    });
                }
                None => {}
            }
        }
        for entry in state.tables().flat_map(|table| table.iter()) {
            if entry.validating().is_some() {
                continue;
            }
            let page = Some(entry.id());
            match (entry.is_valid(), entry.frame()) {
                (true, Some(frame)) => {
                    if state.frames().get(frame).and_then(FrameTableEntry::page) != page {
                        return Err(Inconsistency {
                            frame: Some(frame),
                            page,
                            reason: "valid page not recorded by its frame",
                        });
                    }
                }
                (false, None) => {}
                (valid, frame) => {
                    return Err(Inconsistency {
                        frame,
                        page,
                        reason: if valid {
                            "valid page without a frame"
                        } else {
                            "invalid page bound to a frame"
                        },
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{address, block_on, config, join2, manager, Event, TestHost},
        PolicyKind,
    };

    #[test]
    fn translation() {
        let mm = MemoryManager::new(config(4, PolicyKind::Fifo)).unwrap();
        // 16 位地址，6 位页号，页内偏移 10 位
        assert_eq!(mm.page_number(0), Ok(0));
        assert_eq!(mm.page_number(1023), Ok(0));
        assert_eq!(mm.page_number(1024), Ok(1));
        assert_eq!(mm.page_number(0xffff), Ok(63));
        assert_eq!(
            mm.page_number(0x10000),
            Err(VmError::AddressOutOfRange {
                address: 0x10000,
                bits: 16
            })
        );
    }

    #[test]
    fn unknown_task_and_context() {
        let mm = MemoryManager::new(config(4, PolicyKind::Fifo)).unwrap();
        let host = TestHost::new();
        let task = TaskId::from_usize(7);
        assert_eq!(mm.page_of(task, 0), Err(VmError::NoSuchTask(task)));
        let ctx = ContextId::from_usize(99);
        assert_eq!(
            block_on(mm.reference(&host, ctx, 0, AccessKind::Read)),
            Err(VmError::NoSuchContext(ctx))
        );
        mm.create_page_table(task).unwrap();
        assert_eq!(mm.create_page_table(task), Err(VmError::TaskExists(task)));
    }

    #[test]
    fn write_sets_dirty_read_does_not() {
        let (mm, host, ctx, task) = manager(4, PolicyKind::Fifo);
        let read = block_on(mm.reference(&host, ctx, address(0) + 5, AccessKind::Read)).unwrap();
        let frame = mm.frame(mm.frame_of(read).unwrap()).unwrap();
        assert!(frame.is_referenced());
        assert!(!frame.is_dirty());

        let written = block_on(mm.reference(&host, ctx, address(1), AccessKind::Write)).unwrap();
        assert_eq!(written, PageId::new(task, 1));
        let frame = mm.frame(mm.frame_of(written).unwrap()).unwrap();
        assert!(frame.is_referenced());
        assert!(frame.is_dirty());

        // 命中不再缺页
        block_on(mm.reference(&host, ctx, address(0), AccessKind::Read)).unwrap();
        let stats = mm.stats();
        assert_eq!(stats.references, 3);
        assert_eq!(stats.page_faults, 2);
        assert_eq!(stats.swap_ins, 2);
        assert_eq!(mm.last_fault().map(|f| f.page), Some(written));
        assert_eq!(mm.audit(), Ok(()));
    }

    #[test]
    fn fifo_end_to_end() {
        let (mm, host, ctx, task) = manager(4, PolicyKind::Fifo);
        for n in 0..4 {
            block_on(mm.reference(&host, ctx, address(n), AccessKind::Read)).unwrap();
        }
        host.clear_events();

        let p4 = block_on(mm.reference(&host, ctx, address(4), AccessKind::Read)).unwrap();
        let p0 = PageId::new(task, 0);
        assert!(!mm.page(p0).unwrap().is_valid());
        assert_eq!(mm.frame_of(p4), Some(FrameId::new(0)));
        assert!(mm.page(p4).unwrap().is_valid());
        assert_eq!(mm.frame(FrameId::new(0)).unwrap().page(), Some(p4));
        let events = host.events();
        assert!(!events.iter().any(|e| matches!(e, Event::SwapOut(..))));
        assert!(events.contains(&Event::SwapIn(p4, FrameId::new(0))));
        assert_eq!(mm.stats().evictions, 1);
        let fault = host.faults().pop().unwrap();
        assert_eq!((fault.page, fault.context, fault.kind), (p4, ctx, AccessKind::Read));
        assert_eq!(mm.last_fault(), Some(fault));
        assert_eq!(mm.audit(), Ok(()));
    }

    #[test]
    fn dirty_victim_is_swapped_out_first() {
        let (mm, host, ctx, task) = manager(2, PolicyKind::Fifo);
        for n in 0..2 {
            block_on(mm.reference(&host, ctx, address(n), AccessKind::Write)).unwrap();
        }
        host.clear_events();

        block_on(mm.reference(&host, ctx, address(2), AccessKind::Read)).unwrap();
        let p0 = PageId::new(task, 0);
        let p2 = PageId::new(task, 2);
        let swaps = host
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::SwapOut(..) | Event::SwapIn(..)))
            .collect::<alloc::vec::Vec<_>>();
        assert_eq!(
            swaps,
            [
                Event::SwapOut(p0, FrameId::new(0)),
                Event::SwapIn(p2, FrameId::new(0))
            ]
        );
        let frame = mm.frame(FrameId::new(0)).unwrap();
        assert!(!frame.is_dirty());
        assert_eq!(mm.stats().swap_outs, 1);
        assert_eq!(mm.audit(), Ok(()));
    }

    #[test]
    fn second_chance_end_to_end() {
        let (mm, host, ctx, task) = manager(3, PolicyKind::SecondChance);
        for n in 0..3 {
            block_on(mm.reference(&host, ctx, address(n), AccessKind::Read)).unwrap();
        }
        // 全部被访问过：第一圈清访问位，第二圈回收 0 号
        block_on(mm.reference(&host, ctx, address(3), AccessKind::Read)).unwrap();
        assert_eq!(mm.frame_of(PageId::new(task, 3)), Some(FrameId::new(0)));
        assert!(!mm.page(PageId::new(task, 0)).unwrap().is_valid());
        assert!(!mm.frame(FrameId::new(1)).unwrap().is_referenced());
        assert_eq!(mm.audit(), Ok(()));
    }

    #[test]
    fn concurrent_reference_waits_for_owner() {
        let (mm, host, ctx, task) = manager(2, PolicyKind::Fifo);
        let other = host.spawn(task);
        host.set_swap_yields(true);

        let (a, b) = join2(
            mm.reference(&host, ctx, address(0), AccessKind::Read),
            mm.reference(&host, other, address(0), AccessKind::Write),
        );
        let page = PageId::new(task, 0);
        assert_eq!(a, Ok(page));
        assert_eq!(b, Ok(page));
        assert_eq!(mm.stats().page_faults, 1);
        assert_eq!(mm.stats().swap_ins, 1);
        assert!(host
            .events()
            .contains(&Event::Suspend(other, WaitKey::Page(page))));
        assert!(mm.frame(mm.frame_of(page).unwrap()).unwrap().is_dirty());
    }

    #[test]
    fn killed_waiter_leaves_bits_alone() {
        let (mm, host, ctx, task) = manager(2, PolicyKind::Fifo);
        let other = host.spawn(task);
        host.set_swap_yields(true);
        host.kill_on_suspend(other);

        let (a, b) = join2(
            mm.reference(&host, ctx, address(0), AccessKind::Read),
            mm.reference(&host, other, address(0), AccessKind::Write),
        );
        assert!(a.is_ok());
        assert_eq!(b, Err(VmError::ContextTerminated));
        let frame = mm.frame(FrameId::new(0)).unwrap();
        assert!(!frame.is_dirty());
    }

    #[test]
    fn admission_with_all_frames_locked() {
        let (mm, host, ctx, task) = manager(2, PolicyKind::Fifo);
        for n in 0..2 {
            block_on(mm.lock_page(&host, ctx, PageId::new(task, n))).unwrap();
        }
        let before = mm.frames();
        let faults = mm.stats().page_faults;
        host.clear_events();

        assert_eq!(
            block_on(mm.reference(&host, ctx, address(2), AccessKind::Read)),
            Err(VmError::NotEnoughMemory)
        );
        let after = mm.frames();
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.page(), a.page());
            assert_eq!(b.lock_count(), a.lock_count());
            assert_eq!(b.reserved_by(), a.reserved_by());
        }
        let p2 = PageId::new(task, 2);
        assert!(mm.page(p2).unwrap().validating().is_none());
        assert!(host.events().contains(&Event::Notify(WaitKey::Page(p2))));
        assert_eq!(mm.stats().not_enough_memory, 1);
        assert_eq!(mm.stats().page_faults, faults);
    }

    #[test]
    fn teardown_releases_frames() {
        let (mm, host, ctx, task) = manager(3, PolicyKind::Fifo);
        block_on(mm.reference(&host, ctx, address(0), AccessKind::Write)).unwrap();
        block_on(mm.reference(&host, ctx, address(1), AccessKind::Read)).unwrap();
        block_on(mm.lock_page(&host, ctx, PageId::new(task, 1))).unwrap();

        assert_eq!(mm.destroy_page_table(task), Ok(2));
        assert_eq!(mm.free_frames(), 3);
        assert!(mm.frames().iter().all(|f| f.is_free()));
        assert_eq!(mm.page_of(task, 0), Err(VmError::NoSuchTask(task)));
        assert_eq!(mm.destroy_page_table(task), Err(VmError::NoSuchTask(task)));
        assert_eq!(mm.audit(), Ok(()));
    }

    #[test]
    fn audit_reports_broken_binding() {
        let (mm, host, ctx, task) = manager(2, PolicyKind::Fifo);
        block_on(mm.reference(&host, ctx, address(0), AccessKind::Read)).unwrap();
        mm.inner
            .exclusive_access()
            .state
            .page_mut(PageId::new(task, 0))
            .unwrap()
            .set_valid(false);
        let err = mm.audit().unwrap_err();
        assert_eq!(err.frame, Some(FrameId::new(0)));
        assert_eq!(err.page, Some(PageId::new(task, 0)));
    }
}
