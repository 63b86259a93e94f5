//! 虚存管理的宿主：上下文状态、等待队列、换页设备和物理内存。

use crate::report::{TraceEntry, TraceEvent};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use pagesim_sync::{UPCell, WaitQueues};
use pagesim_task_manage::{ContextId, TaskId};
use pagesim_vm::{FrameId, Host, PageFault, PageId, WaitKey};
use std::collections::{BTreeMap, VecDeque};

/// 等待对象：虚存的等待对象，或者一次换页请求。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) enum SimKey {
    Vm(WaitKey),
    Io(u64),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Status {
    Running,
    Killed,
    Finished,
}

struct ContextInfo {
    task: TaskId,
    name: String,
    status: Status,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Direction {
    In,
    Out,
}

struct Request {
    id: u64,
    ctx: ContextId,
    direction: Direction,
    page: PageId,
    frame: FrameId,
    ready_at: u64,
}

struct Inner {
    now: u64,
    latency: u64,
    contexts: BTreeMap<ContextId, ContextInfo>,
    waits: WaitQueues<SimKey>,
    device: VecDeque<Request>,
    next_request: u64,
    /// 每个页帧一个字
    memory: Vec<u64>,
    /// 任务的交换区：页号到内容
    swap: BTreeMap<TaskId, BTreeMap<usize, u64>>,
    trace: Vec<TraceEntry>,
}

/// 模拟器提供给虚存管理的宿主。
pub(crate) struct SimHost {
    inner: UPCell<Inner>,
}

impl SimHost {
    pub fn new(frames: usize, latency: u64) -> Self {
        Self {
            inner: UPCell::new(Inner {
                now: 0,
                latency,
                contexts: BTreeMap::new(),
                waits: WaitQueues::new(),
                device: VecDeque::new(),
                next_request: 0,
                memory: vec![0; frames],
                swap: BTreeMap::new(),
                trace: Vec::new(),
            }),
        }
    }

    pub fn add_task(&self, task: TaskId) {
        self.inner.exclusive_access().swap.insert(task, BTreeMap::new());
    }

    /// 任务结束，丢弃交换区。
    pub fn remove_task(&self, task: TaskId) {
        self.inner.exclusive_access().swap.remove(&task);
    }

    pub fn add_context(&self, ctx: ContextId, task: TaskId, name: String) {
        self.inner.exclusive_access().contexts.insert(
            ctx,
            ContextInfo {
                task,
                name,
                status: Status::Running,
            },
        );
    }

    #[inline]
    pub fn set_now(&self, now: u64) {
        self.inner.exclusive_access().now = now;
    }

    /// 终止上下文：取消它的所有等待和换页请求，并唤醒它。
    ///
    /// 已经结束的上下文不受影响，返回 `false`。
    pub fn kill(&self, ctx: ContextId) -> bool {
        let mut inner = self.inner.exclusive_access();
        match inner.contexts.get_mut(&ctx) {
            Some(info) if info.status == Status::Running => info.status = Status::Killed,
            _ => return false,
        }
        inner.device.retain(|req| req.ctx != ctx);
        let keys = inner.waits.cancel(ctx);
        log::debug!("kill {ctx}, was waiting on {keys:?}");
        let now = inner.now;
        inner.trace.push(TraceEntry {
            tick: now,
            context: ctx,
            event: TraceEvent::Killed,
        });
        true
    }

    /// 上下文的程序执行完毕。返回它是否曾被终止。
    pub fn finish(&self, ctx: ContextId) -> bool {
        let mut inner = self.inner.exclusive_access();
        let Some(info) = inner.contexts.get_mut(&ctx) else {
            return false;
        };
        let killed = info.status == Status::Killed;
        info.status = Status::Finished;
        killed
    }

    /// 是否还有没完成的换页请求。
    pub fn io_pending(&self) -> bool {
        !self.inner.access().device.is_empty()
    }

    /// 最早完成的换页请求的完成时刻。
    pub fn next_io(&self) -> Option<u64> {
        self.inner.access().device.iter().map(|r| r.ready_at).min()
    }

    /// 完成所有到期的换页请求，唤醒发起者。返回完成的请求数。
    pub fn complete_io(&self) -> usize {
        let mut inner = self.inner.exclusive_access();
        let now = inner.now;
        let mut done = 0;
        while let Some(i) = inner.device.iter().position(|r| r.ready_at <= now) {
            let Some(req) = inner.device.remove(i) else {
                break;
            };
            let task = req.page.task;
            let word = match req.direction {
                Direction::In => {
                    let word = inner
                        .swap
                        .get(&task)
                        .and_then(|file| file.get(&req.page.number))
                        .copied()
                        .unwrap_or(0);
                    inner.memory[req.frame.index()] = word;
                    word
                }
                Direction::Out => {
                    let word = inner.memory[req.frame.index()];
                    if let Some(file) = inner.swap.get_mut(&task) {
                        file.insert(req.page.number, word);
                    }
                    word
                }
            };
            log::trace!(
                "io #{} {:?} {} <-> {} ({word}) done",
                req.id,
                req.direction,
                req.page,
                req.frame
            );
            inner.waits.notify_all(SimKey::Io(req.id));
            done += 1;
        }
        done
    }

    /// 还在等待的上下文名。
    pub fn waiting(&self) -> Vec<String> {
        let inner = self.inner.access();
        inner
            .contexts
            .iter()
            .filter(|(_, info)| info.status != Status::Finished)
            .map(|(ctx, info)| {
                let keys = inner.waits.keys_of(*ctx);
                format!("{} on {keys:?}", info.name)
            })
            .collect()
    }

    /// 读页帧上的字。
    pub fn load(&self, frame: FrameId) -> u64 {
        self.inner.access().memory[frame.index()]
    }

    /// 写页帧上的字。
    pub fn store(&self, frame: FrameId, word: u64) {
        self.inner.exclusive_access().memory[frame.index()] = word;
    }

    /// 交换区里存的字。
    pub fn swapped(&self, page: PageId) -> Option<u64> {
        self.inner.access().swap.get(&page.task)?.get(&page.number).copied()
    }

    pub fn record(&self, ctx: ContextId, event: TraceEvent) {
        let mut inner = self.inner.exclusive_access();
        let tick = inner.now;
        inner.trace.push(TraceEntry {
            tick,
            context: ctx,
            event,
        });
    }

    pub fn take_trace(&self) -> Vec<TraceEntry> {
        core::mem::take(&mut self.inner.exclusive_access().trace)
    }

    fn submit(&self, ctx: ContextId, direction: Direction, page: PageId, frame: FrameId) -> u64 {
        let mut inner = self.inner.exclusive_access();
        inner.next_request += 1;
        let id = inner.next_request;
        let ready_at = inner.now + inner.latency;
        log::trace!("io #{id} {direction:?} {page} <-> {frame} by {ctx}, ready at {ready_at}");
        inner.device.push_back(Request {
            id,
            ctx,
            direction,
            page,
            frame,
            ready_at,
        });
        id
    }

    fn is_waiting(&self, key: SimKey, ctx: ContextId) -> bool {
        self.inner.access().waits.is_waiting(key, ctx)
    }
}

/// 等到 `key` 被通知或上下文被终止。
struct Suspend<'a> {
    host: &'a SimHost,
    ctx: ContextId,
    key: SimKey,
    registered: bool,
}

impl Future for Suspend<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.host.is_terminated(self.ctx) {
            return Poll::Ready(());
        }
        if self.registered && !self.host.is_waiting(self.key, self.ctx) {
            return Poll::Ready(());
        }
        self.host
            .inner
            .exclusive_access()
            .waits
            .wait(self.key, self.ctx, cx.waker());
        self.registered = true;
        Poll::Pending
    }
}

/// 让出一次。
struct Yield(bool);

impl Future for Yield {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if core::mem::replace(&mut self.0, true) {
            Poll::Ready(())
        } else {
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

impl SimHost {
    fn suspend_on(&self, ctx: ContextId, key: SimKey) -> Suspend<'_> {
        Suspend {
            host: self,
            ctx,
            key,
            registered: false,
        }
    }

    /// 让出处理器。
    pub fn yield_now(&self) -> impl Future<Output = ()> {
        Yield(false)
    }
}

impl Host for SimHost {
    fn task_of(&self, ctx: ContextId) -> Option<TaskId> {
        self.inner.access().contexts.get(&ctx).map(|info| info.task)
    }

    fn is_terminated(&self, ctx: ContextId) -> bool {
        self.inner
            .access()
            .contexts
            .get(&ctx)
            .map_or(true, |info| info.status == Status::Killed)
    }

    fn enqueue(&self, ctx: ContextId, key: WaitKey) {
        self.inner
            .exclusive_access()
            .waits
            .enqueue(SimKey::Vm(key), ctx);
    }

    fn suspend(&self, ctx: ContextId, key: WaitKey) -> impl Future<Output = ()> {
        log::trace!("{ctx} waits on {key}");
        self.suspend_on(ctx, SimKey::Vm(key))
    }

    fn notify_all(&self, key: WaitKey) {
        let woken = self
            .inner
            .exclusive_access()
            .waits
            .notify_all(SimKey::Vm(key));
        if !woken.is_empty() {
            log::trace!("{key} wakes {woken:?}");
        }
    }

    fn dispatch(&self) -> impl Future<Output = ()> {
        self.yield_now()
    }

    fn swap_out(&self, ctx: ContextId, page: PageId, frame: FrameId) -> impl Future<Output = ()> {
        let id = self.submit(ctx, Direction::Out, page, frame);
        self.suspend_on(ctx, SimKey::Io(id))
    }

    fn swap_in(&self, ctx: ContextId, page: PageId, frame: FrameId) -> impl Future<Output = ()> {
        let id = self.submit(ctx, Direction::In, page, frame);
        self.suspend_on(ctx, SimKey::Io(id))
    }

    fn page_fault(&self, fault: &PageFault) {
        self.record(
            fault.context,
            TraceEvent::PageFault {
                kind: fault.kind,
                page: fault.page,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> (SimHost, ContextId, TaskId) {
        let host = SimHost::new(2, 2);
        let task = TaskId::new();
        let ctx = ContextId::new();
        host.add_task(task);
        host.add_context(ctx, task, "c".into());
        (host, ctx, task)
    }

    #[test]
    fn swap_round_trip_through_device() {
        let (host, ctx, task) = host();
        let page = PageId::new(task, 3);
        let frame = FrameId::new(1);
        host.store(frame, 42);

        let _out = host.swap_out(ctx, page, frame);
        assert_eq!(host.next_io(), Some(2));
        assert_eq!(host.complete_io(), 0);
        host.set_now(2);
        assert_eq!(host.complete_io(), 1);
        assert_eq!(host.swapped(page), Some(42));

        host.store(frame, 0);
        let _in = host.swap_in(ctx, page, frame);
        host.set_now(4);
        host.complete_io();
        assert_eq!(host.load(frame), 42);
        assert!(!host.io_pending());
    }

    #[test]
    fn kill_cancels_requests() {
        let (host, ctx, task) = host();
        let _in = host.swap_in(ctx, PageId::new(task, 0), FrameId::new(0));
        assert!(host.io_pending());
        assert!(host.kill(ctx));
        assert!(!host.io_pending());
        assert!(host.is_terminated(ctx));
        assert!(!host.kill(ctx));
        assert!(host.finish(ctx));
        assert!(!host.is_terminated(ctx));
        assert!(host.waiting().is_empty());
    }
}
