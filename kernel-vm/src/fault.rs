use crate::{
    host::{EventId, WaitKey},
    AccessKind, FrameId, Host, MemoryManager, PageId, PageTableEntry, Replace, VmError,
};
use pagesim_task_manage::ContextId;

/// 为缺页找到的页帧。
enum Acquired {
    /// 空闲页帧，已绑定到缺失的页。
    Free(FrameId),
    /// 脏的牺牲者，要先换出。
    Dirty { frame: FrameId, victim: PageId },
    /// 没有可以用的页帧。
    Exhausted,
}

impl MemoryManager {
    /// 处理 `ctx` 访问 `page` 引发的缺页。
    ///
    /// 页已有效时返回 [`VmError::RedundantFault`]；别的上下文正在调这个页时等它完成。
    /// 所有退出路径都会唤醒在这个页上等待的上下文。
    pub async fn handle_page_fault<H: Host>(
        &self,
        host: &H,
        ctx: ContextId,
        kind: AccessKind,
        page: PageId,
    ) -> Result<(), VmError> {
        let task = page.task;
        let mut woken = false;
        // 等到没人在处理这个页
        loop {
            let (valid, validating) = {
                let inner = self.inner.access();
                let entry = inner.state.page(page).ok_or(VmError::NoSuchTask(task))?;
                (entry.is_valid(), entry.validating())
            };
            if valid {
                if woken {
                    return Ok(());
                }
                self.inner.exclusive_access().stats.redundant_faults += 1;
                host.notify_all(WaitKey::Page(page));
                host.dispatch().await;
                return Err(VmError::RedundantFault);
            }
            if validating.is_none() {
                break;
            }
            host.suspend(ctx, WaitKey::Page(page)).await;
            if host.is_terminated(ctx) {
                return Err(VmError::ContextTerminated);
            }
            woken = true;
        }

        // 所有页帧都被预留或加锁
        let event = self.inner.exclusive_session(|inner| {
            let frames = inner.state.frames();
            if frames.count_unavailable() == frames.len() {
                inner.stats.not_enough_memory += 1;
                return None;
            }
            inner.stats.page_faults += 1;
            let event = inner.next_event();
            if let Some(entry) = inner.state.page_mut(page) {
                entry.set_validating(Some(ctx));
            }
            Some(event)
        });
        let Some(event) = event else {
            log::warn!("{ctx} faulted on {page}: not enough memory");
            host.notify_all(WaitKey::Page(page));
            host.dispatch().await;
            return Err(VmError::NotEnoughMemory);
        };
        host.enqueue(ctx, WaitKey::Fault(event));
        log::debug!("{ctx} {kind} fault on {page}, event #{}", event.get_usize());

        loop {
            let frame = match self.acquire(page) {
                Acquired::Free(frame) => frame,
                Acquired::Dirty { frame, victim } => {
                    log::trace!("swap out {victim} from {frame}");
                    host.swap_out(ctx, victim, frame).await;
                    let retry = self.inner.exclusive_session(|inner| {
                        let state = &mut inner.state;
                        if host.is_terminated(ctx) {
                            // 换出可能没写进交换区
                            if state.frames()[frame].page() == Some(victim) {
                                state.frames_mut()[frame].set_dirty(true);
                            }
                            return None;
                        }
                        inner.stats.swap_outs += 1;
                        let f = &state.frames()[frame];
                        // 换出期间牺牲者被锁住或又被写过，留下它另找一个
                        if f.is_locked() || f.is_dirty() {
                            state.frames_mut()[frame].unreserve(task);
                            return Some(true);
                        }
                        state.detach(frame);
                        state.bind(page, frame);
                        Some(false)
                    });
                    match retry {
                        None => return self.abort(host, ctx, page, frame, event).await,
                        Some(true) => continue,
                        Some(false) => frame,
                    }
                }
                Acquired::Exhausted => {
                    log::warn!("{ctx} faulted on {page}: no victim");
                    self.inner.exclusive_session(|inner| {
                        inner.stats.not_enough_memory += 1;
                        if let Some(entry) = inner.state.page_mut(page) {
                            entry.set_validating(None);
                            entry.set_pending_locks(0);
                        }
                    });
                    host.notify_all(WaitKey::Page(page));
                    host.notify_all(WaitKey::Fault(event));
                    host.dispatch().await;
                    return Err(VmError::NotEnoughMemory);
                }
            };

            log::trace!("swap in {page} to {frame}");
            host.swap_in(ctx, page, frame).await;
            if host.is_terminated(ctx) {
                return self.abort(host, ctx, page, frame, event).await;
            }

            self.inner.exclusive_session(|inner| {
                inner.stats.swap_ins += 1;
                let state = &mut inner.state;
                let entry = state.page_mut(page);
                if let Some(entry) = entry {
                    entry.set_valid(true);
                    entry.set_validating(None);
                }
                let f = &mut state.frames_mut()[frame];
                f.set_page(Some(page));
                f.set_dirty(false);
                f.touch(kind.is_write());
                f.unreserve(task);
            });
            host.notify_all(WaitKey::Page(page));
            host.notify_all(WaitKey::Fault(event));
            host.dispatch().await;
            return Ok(());
        }
    }

    /// 找一个页帧并预留给 `page` 的任务。
    fn acquire(&self, page: PageId) -> Acquired {
        let task = page.task;
        self.inner.exclusive_session(|inner| {
            let frame = match inner.state.frames().free_frame() {
                Some(frame) => frame,
                None => {
                    let Some(frame) = inner.replacer.select_victim(&mut inner.state) else {
                        return Acquired::Exhausted;
                    };
                    log::debug!("victim {frame} for {page}");
                    frame
                }
            };
            let state = &mut inner.state;
            state.frames_mut()[frame].reserve(task);
            match state.frames()[frame].page() {
                Some(victim) if state.frames()[frame].is_dirty() => {
                    // 换出完成前的写入会重新置脏
                    state.frames_mut()[frame].set_dirty(false);
                    return Acquired::Dirty { frame, victim };
                }
                Some(_) => {
                    state.detach(frame);
                }
                None => {}
            }
            state.bind(page, frame);
            Acquired::Free(frame)
        })
    }

    /// 上下文在换页期间被终止：撤销绑定，放弃预留，唤醒所有等待者。
    ///
    /// 如果换出没完成，页帧上仍是原来的页，它的锁保持不变。
    async fn abort<H: Host>(
        &self,
        host: &H,
        ctx: ContextId,
        page: PageId,
        frame: FrameId,
        event: EventId,
    ) -> Result<(), VmError> {
        self.inner.exclusive_session(|inner| {
            inner.stats.aborted_faults += 1;
            let state = &mut inner.state;
            let bound = state.page(page).and_then(PageTableEntry::frame) == Some(frame);
            if let Some(entry) = state.page_mut(page) {
                entry.set_frame(None);
                entry.set_validating(None);
                entry.set_pending_locks(0);
            }
            let f = &mut state.frames_mut()[frame];
            if f.page() == Some(page) {
                f.clear();
            }
            // 调页期间只有自己能锁这个页帧
            if bound && f.page().is_none() {
                f.reset_lock_count();
            }
            f.unreserve(page.task);
        });
        log::info!("{ctx} terminated while faulting on {page}");
        host.notify_all(WaitKey::Page(page));
        host.notify_all(WaitKey::Fault(event));
        host.dispatch().await;
        Err(VmError::ContextTerminated)
    }
}
