use crate::Op;
use pagesim_task_manage::{ContextId, TaskId};
use pagesim_vm::{AccessKind, FrameTableEntry, Inconsistency, PageId, Statistics, VmError};
use std::{collections::BTreeMap, fmt};

/// 模拟过程中发生的事。
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TraceEvent {
    /// 读到一个字
    Read {
        /// 地址
        addr: usize,
        /// 所在页
        page: PageId,
        /// 读到的值
        value: u64,
    },
    /// 写入一个字
    Write {
        /// 地址
        addr: usize,
        /// 所在页
        page: PageId,
        /// 写入的值
        value: u64,
    },
    /// 页被锁定
    Lock(PageId),
    /// 页被解锁
    Unlock(PageId),
    /// 让出处理器
    Yield,
    /// 缺页中断
    PageFault {
        /// 访问类型
        kind: AccessKind,
        /// 缺失的页
        page: PageId,
    },
    /// 操作失败
    Failed {
        /// 失败的操作
        op: Op,
        /// 原因
        error: VmError,
    },
    /// 上下文被终止
    Killed,
    /// 上下文结束
    Finished {
        /// 是否因为被终止而结束
        killed: bool,
    },
    /// 任务的所有上下文都已结束，页表销毁
    TaskEnded {
        /// 任务
        task: TaskId,
        /// 释放的页帧数
        frames: usize,
    },
}

/// 一条记录。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TraceEntry {
    /// 发生的时刻
    pub tick: u64,
    /// 相关的上下文
    pub context: ContextId,
    /// 事件
    pub event: TraceEvent,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { addr, page, value } => write!(f, "read  {addr:#06x} ({page}) = {value}"),
            Self::Write { addr, page, value } => {
                write!(f, "write {addr:#06x} ({page}) <- {value}")
            }
            Self::Lock(page) => write!(f, "lock {page}"),
            Self::Unlock(page) => write!(f, "unlock {page}"),
            Self::Yield => f.write_str("yield"),
            Self::PageFault { kind, page } => write!(f, "page fault: {kind} {page}"),
            Self::Failed { op, error } => write!(f, "{op:?} failed: {error}"),
            Self::Killed => f.write_str("killed"),
            Self::Finished { killed: true } => f.write_str("finished (killed)"),
            Self::Finished { killed: false } => f.write_str("finished"),
            Self::TaskEnded { task, frames } => {
                write!(f, "task {task} ended, {frames} frames released")
            }
        }
    }
}

/// 一次模拟的结果。
#[derive(Debug)]
pub struct Report {
    /// 总时钟周期
    pub ticks: u64,
    /// 虚存计数器
    pub stats: Statistics,
    /// 事件记录
    pub trace: Vec<TraceEntry>,
    /// 上下文名
    pub names: BTreeMap<ContextId, String>,
    /// 结束时的页帧表
    pub frames: Vec<FrameTableEntry>,
    /// 结束时的一致性检查
    pub audit: Result<(), Inconsistency>,
}

impl Report {
    /// 上下文名。
    pub fn name(&self, ctx: ContextId) -> &str {
        self.names.get(&ctx).map_or("?", String::as_str)
    }

    /// 某个上下文的全部事件。
    pub fn events_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.trace
            .iter()
            .filter(move |entry| self.name(entry.context) == name)
            .map(|entry| &entry.event)
    }

    /// 某个上下文读到的所有值。
    pub fn reads_of(&self, name: &str) -> Vec<u64> {
        self.events_of(name)
            .filter_map(|event| match event {
                TraceEvent::Read { value, .. } => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// 格式化一条记录。
    pub fn line(&self, entry: &TraceEntry) -> String {
        format!(
            "[{:>6}] {:<10} {}",
            entry.tick,
            self.name(entry.context),
            entry.event
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "ticks            {}", self.ticks)?;
        writeln!(f, "references       {}", s.references)?;
        writeln!(f, "page faults      {}", s.page_faults)?;
        writeln!(f, "swap ins         {}", s.swap_ins)?;
        writeln!(f, "swap outs        {}", s.swap_outs)?;
        writeln!(f, "evictions        {}", s.evictions)?;
        writeln!(f, "redundant faults {}", s.redundant_faults)?;
        writeln!(f, "out of memory    {}", s.not_enough_memory)?;
        writeln!(f, "aborted faults   {}", s.aborted_faults)?;
        for frame in &self.frames {
            write!(f, "{}: ", frame.id())?;
            match frame.page() {
                Some(page) => write!(f, "{page}")?,
                None => f.write_str("-")?,
            }
            if frame.is_dirty() {
                f.write_str(" dirty")?;
            }
            if frame.is_locked() {
                write!(f, " locked x{}", frame.lock_count())?;
            }
            writeln!(f)?;
        }
        match &self.audit {
            Ok(()) => f.write_str("audit ok"),
            Err(e) => write!(f, "audit FAILED: {e}"),
        }
    }
}
