//! 单线程协作式执行器。
//!
//! 每个执行上下文是一个 future。就绪队列由 waker 填充，每轮询一次时钟走一步；
//! 没有可运行的上下文时，时钟直接跳到下一个换页完成或终止计划的时刻。

use crate::{host::SimHost, program::execute, Report, Scenario, SimError, TraceEvent};
use core::{future::Future, pin::Pin, task::Context};
use pagesim_task_manage::{ContextId, FifoScheduler, Manage, Schedule, TaskId, TaskRel};
use pagesim_vm::MemoryManager;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
    task::{Wake, Waker},
};

/// 就绪队列。一个上下文在队列里最多出现一次。
#[derive(Default)]
struct ReadyQueue {
    queue: FifoScheduler<ContextId>,
    queued: BTreeSet<ContextId>,
}

impl ReadyQueue {
    fn push(&mut self, ctx: ContextId) {
        if self.queued.insert(ctx) {
            self.queue.add_back(ctx);
        }
    }

    fn pop(&mut self) -> Option<ContextId> {
        let ctx = self.queue.fetch()?;
        self.queued.remove(&ctx);
        Some(ctx)
    }
}

struct ContextWaker {
    ctx: ContextId,
    ready: Arc<spin::Mutex<ReadyQueue>>,
}

impl Wake for ContextWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.lock().push(self.ctx);
    }
}

type Program<'a> = Pin<Box<dyn Future<Output = ()> + 'a>>;

struct Running<'a> {
    future: Program<'a>,
    waker: Waker,
    task: TaskId,
}

/// 还在运行的上下文。
struct ContextManager<'a>(BTreeMap<ContextId, Running<'a>>);

impl<'a> Manage<Running<'a>, ContextId> for ContextManager<'a> {
    #[inline]
    fn insert(&mut self, id: ContextId, item: Running<'a>) {
        self.0.insert(id, item);
    }

    #[inline]
    fn delete(&mut self, id: ContextId) -> Option<Running<'a>> {
        self.0.remove(&id)
    }

    #[inline]
    fn get_mut(&mut self, id: ContextId) -> Option<&mut Running<'a>> {
        self.0.get_mut(&id)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 运行场景。
pub fn run(scenario: &Scenario) -> Result<Report, SimError> {
    scenario.check()?;
    let mm = MemoryManager::new(scenario.vm_config()?)?;
    let host = SimHost::new(mm.config().frames, scenario.latency());
    let ready = Arc::new(spin::Mutex::new(ReadyQueue::default()));

    let mut names = BTreeMap::new();
    let mut relations = BTreeMap::new();
    let mut running = ContextManager(BTreeMap::new());
    for (spec, ctx_names) in scenario.tasks.iter().zip(scenario.context_names()) {
        let task = TaskId::new();
        mm.create_page_table(task)?;
        host.add_task(task);
        let mut rel = TaskRel::new(task);
        for (ctx_spec, name) in spec.contexts.iter().zip(ctx_names) {
            let ctx = ContextId::new();
            host.add_context(ctx, task, name.clone());
            rel.add_context(ctx);
            names.insert(name, ctx);
            let waker = Waker::from(Arc::new(ContextWaker {
                ctx,
                ready: ready.clone(),
            }));
            let future: Program = Box::pin(execute(&mm, &host, ctx, ctx_spec.ops.clone()));
            running.insert(ctx, Running { future, waker, task });
            ready.lock().push(ctx);
        }
        relations.insert(task, rel);
    }

    let mut kills = scenario
        .kills
        .iter()
        .map(|k| {
            names
                .get(&k.context)
                .map(|&ctx| (k.at, ctx))
                .ok_or_else(|| SimError::UnknownContext(k.context.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    kills.sort_by_key(|&(at, _)| at);
    let mut kills = VecDeque::from(kills);

    log::info!(
        "{} tasks, {} contexts, {} kills scheduled",
        relations.len(),
        running.0.len(),
        kills.len()
    );

    let mut now = 0;
    loop {
        host.set_now(now);
        while kills.front().map_or(false, |&(at, _)| at <= now) {
            if let Some((_, ctx)) = kills.pop_front() {
                host.kill(ctx);
            }
        }
        host.complete_io();

        let next = ready.lock().pop();
        if let Some(ctx) = next {
            let Some(context) = running.get_mut(ctx) else {
                continue;
            };
            now += 1;
            host.set_now(now);
            let mut cx = Context::from_waker(&context.waker);
            if context.future.as_mut().poll(&mut cx).is_pending() {
                continue;
            }
            let task = context.task;
            running.delete(ctx);
            let killed = host.finish(ctx);
            host.record(ctx, TraceEvent::Finished { killed });
            if let Some(rel) = relations.get_mut(&task) {
                rel.del_context(ctx, killed);
                if rel.can_end() {
                    let victims = rel.dead_contexts.iter().filter(|&&(_, k)| k).count();
                    log::debug!(
                        "{task} ended: {} contexts, {victims} killed",
                        rel.dead_contexts.len()
                    );
                    let frames = mm.destroy_page_table(task)?;
                    host.remove_task(task);
                    host.record(ctx, TraceEvent::TaskEnded { task, frames });
                    relations.remove(&task);
                }
            }
            continue;
        }

        if running.is_empty() {
            break;
        }
        let next_kill = kills.front().map(|&(at, _)| at);
        match host.next_io().into_iter().chain(next_kill).min() {
            Some(at) => now = now.max(at),
            None => return Err(SimError::Deadlock(host.waiting())),
        }
    }

    debug_assert!(!host.io_pending());
    let report = Report {
        ticks: now,
        stats: mm.stats(),
        trace: host.take_trace(),
        names: names.into_iter().map(|(name, ctx)| (ctx, name)).collect(),
        frames: mm.frames(),
        audit: mm.audit(),
    };
    log::info!("finished after {now} ticks");
    Ok(report)
}
