use crate::{host::SimHost, Op, TraceEvent};
use pagesim_task_manage::ContextId;
use pagesim_vm::{AccessKind, Host, MemoryManager, PageId, VmError};

/// 依次执行上下文的操作，直到执行完或者被终止。
pub(crate) async fn execute(mm: &MemoryManager, host: &SimHost, ctx: ContextId, ops: Vec<Op>) {
    for op in ops {
        if host.is_terminated(ctx) {
            break;
        }
        match step(mm, host, ctx, op).await {
            Ok(event) => host.record(ctx, event),
            Err(VmError::ContextTerminated) => break,
            Err(error) => host.record(ctx, TraceEvent::Failed { op, error }),
        }
    }
}

async fn step(
    mm: &MemoryManager,
    host: &SimHost,
    ctx: ContextId,
    op: Op,
) -> Result<TraceEvent, VmError> {
    match op {
        Op::Read(addr) => {
            let page = mm.reference(host, ctx, addr, AccessKind::Read).await?;
            let value = mm.frame_of(page).map_or(0, |frame| host.load(frame));
            Ok(TraceEvent::Read { addr, page, value })
        }
        Op::Write { addr, value } => {
            let page = mm.reference(host, ctx, addr, AccessKind::Write).await?;
            if let Some(frame) = mm.frame_of(page) {
                host.store(frame, value);
            }
            Ok(TraceEvent::Write { addr, page, value })
        }
        Op::Lock(addr) => {
            let page = page_of(mm, host, ctx, addr)?;
            mm.lock_page(host, ctx, page).await?;
            Ok(TraceEvent::Lock(page))
        }
        Op::Unlock(addr) => {
            let page = page_of(mm, host, ctx, addr)?;
            mm.unlock_page(page);
            Ok(TraceEvent::Unlock(page))
        }
        Op::Yield => {
            host.yield_now().await;
            Ok(TraceEvent::Yield)
        }
    }
}

fn page_of(
    mm: &MemoryManager,
    host: &SimHost,
    ctx: ContextId,
    addr: usize,
) -> Result<PageId, VmError> {
    let task = host.task_of(ctx).ok_or(VmError::NoSuchContext(ctx))?;
    mm.page_of(task, addr)
}
