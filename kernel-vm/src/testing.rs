//! 单元测试用的宿主和执行器。

use crate::{
    host::{PageFault, WaitKey},
    FrameId, Host, MemoryManager, PageId, PolicyKind, VmConfig,
};
use core::{
    cell::RefCell,
    future::{poll_fn, Future},
    pin::pin,
    task::{Context, Poll, RawWaker, RawWakerVTable, Waker},
};
use pagesim_task_manage::{ContextId, TaskId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum Event {
    Enqueue(ContextId, WaitKey),
    Suspend(ContextId, WaitKey),
    Notify(WaitKey),
    Dispatch,
    SwapOut(PageId, FrameId),
    SwapIn(PageId, FrameId),
}

#[derive(Default)]
struct State {
    tasks: BTreeMap<ContextId, TaskId>,
    killed: BTreeSet<ContextId>,
    generations: BTreeMap<WaitKey, usize>,
    events: Vec<Event>,
    faults: Vec<PageFault>,
    kill_on_swap_in: BTreeSet<ContextId>,
    kill_on_swap_out: BTreeSet<ContextId>,
    kill_on_suspend: BTreeSet<ContextId>,
    swap_yields: bool,
}

/// 记录所有调用的宿主。
///
/// 挂起的上下文在等待对象被通知或自己被终止时恢复；换页可以配置为先让出一次。
#[derive(Default)]
pub(crate) struct TestHost(RefCell<State>);

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, task: TaskId) -> ContextId {
        let ctx = ContextId::new();
        self.0.borrow_mut().tasks.insert(ctx, task);
        ctx
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.0.borrow_mut().events.clear();
    }

    pub fn faults(&self) -> Vec<PageFault> {
        self.0.borrow().faults.clone()
    }

    pub fn set_swap_yields(&self, value: bool) {
        self.0.borrow_mut().swap_yields = value;
    }

    pub fn kill(&self, ctx: ContextId) {
        self.0.borrow_mut().killed.insert(ctx);
    }

    pub fn kill_on_swap_in(&self, ctx: ContextId) {
        self.0.borrow_mut().kill_on_swap_in.insert(ctx);
    }

    pub fn kill_on_swap_out(&self, ctx: ContextId) {
        self.0.borrow_mut().kill_on_swap_out.insert(ctx);
    }

    pub fn kill_on_suspend(&self, ctx: ContextId) {
        self.0.borrow_mut().kill_on_suspend.insert(ctx);
    }

    fn record(&self, event: Event) {
        self.0.borrow_mut().events.push(event);
    }

    fn generation(&self, key: WaitKey) -> usize {
        self.0.borrow().generations.get(&key).copied().unwrap_or(0)
    }

    fn swap(&self, ctx: ContextId, event: Event, out: bool) -> impl Future<Output = ()> {
        let yields = {
            let mut state = self.0.borrow_mut();
            let kill = if out {
                state.kill_on_swap_out.remove(&ctx)
            } else {
                state.kill_on_swap_in.remove(&ctx)
            };
            if kill {
                state.killed.insert(ctx);
            }
            state.events.push(event);
            state.swap_yields
        };
        yield_now(yields)
    }
}

impl Host for TestHost {
    fn task_of(&self, ctx: ContextId) -> Option<TaskId> {
        self.0.borrow().tasks.get(&ctx).copied()
    }

    fn is_terminated(&self, ctx: ContextId) -> bool {
        self.0.borrow().killed.contains(&ctx)
    }

    fn enqueue(&self, ctx: ContextId, key: WaitKey) {
        self.record(Event::Enqueue(ctx, key));
    }

    fn suspend(&self, ctx: ContextId, key: WaitKey) -> impl Future<Output = ()> {
        self.record(Event::Suspend(ctx, key));
        {
            let mut state = self.0.borrow_mut();
            if state.kill_on_suspend.remove(&ctx) {
                state.killed.insert(ctx);
            }
        }
        let generation = self.generation(key);
        poll_fn(move |_| {
            if self.is_terminated(ctx) || self.generation(key) != generation {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
    }

    fn notify_all(&self, key: WaitKey) {
        let mut state = self.0.borrow_mut();
        *state.generations.entry(key).or_default() += 1;
        state.events.push(Event::Notify(key));
    }

    fn dispatch(&self) -> impl Future<Output = ()> {
        self.record(Event::Dispatch);
        yield_now(true)
    }

    fn swap_out(&self, ctx: ContextId, page: PageId, frame: FrameId) -> impl Future<Output = ()> {
        self.swap(ctx, Event::SwapOut(page, frame), true)
    }

    fn swap_in(&self, ctx: ContextId, page: PageId, frame: FrameId) -> impl Future<Output = ()> {
        self.swap(ctx, Event::SwapIn(page, frame), false)
    }

    fn page_fault(&self, fault: &PageFault) {
        self.0.borrow_mut().faults.push(*fault);
    }
}

/// 第一次轮询时返回 `Pending`（如果 `yields`）。
fn yield_now(yields: bool) -> impl Future<Output = ()> {
    let mut pending = yields;
    poll_fn(move |_| {
        if core::mem::take(&mut pending) {
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    })
}

fn noop_waker() -> Waker {
    unsafe fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(core::ptr::null(), &VTABLE)
    }
    unsafe fn noop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
}

const MAX_POLLS: usize = 1000;

/// 轮询到完成。
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);
    for _ in 0..MAX_POLLS {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
    }
    panic!("future did not complete after {MAX_POLLS} polls");
}

/// 交替轮询两个 future，每轮先 `a` 后 `b`。
pub(crate) fn join2<A: Future, B: Future>(a: A, b: B) -> (A::Output, B::Output) {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut a = pin!(a);
    let mut b = pin!(b);
    let (mut out_a, mut out_b) = (None, None);
    for _ in 0..MAX_POLLS {
        if out_a.is_none() {
            if let Poll::Ready(output) = a.as_mut().poll(&mut cx) {
                out_a = Some(output);
            }
        }
        if out_b.is_none() {
            if let Poll::Ready(output) = b.as_mut().poll(&mut cx) {
                out_b = Some(output);
            }
        }
        if let (Some(_), Some(_)) = (&out_a, &out_b) {
            return (out_a.unwrap(), out_b.unwrap());
        }
    }
    panic!("futures did not complete after {MAX_POLLS} polls");
}

/// 16 位地址，6 位页号。
pub(crate) fn config(frames: usize, policy: PolicyKind) -> VmConfig {
    VmConfig {
        virtual_address_bits: 16,
        page_address_bits: 6,
        frames,
        policy,
        frames_wanted: 1,
    }
}

/// `number` 号页的起始地址。
pub(crate) fn address(number: usize) -> usize {
    number << 10
}

/// 一个管理器、一个任务和它的一个上下文。
pub(crate) fn manager(
    frames: usize,
    policy: PolicyKind,
) -> (MemoryManager, TestHost, ContextId, TaskId) {
    let mm = MemoryManager::new(config(frames, policy)).unwrap();
    let host = TestHost::new();
    let task = TaskId::new();
    mm.create_page_table(task).unwrap();
    let ctx = host.spawn(task);
    (mm, host, ctx, task)
}
