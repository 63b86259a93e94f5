use alloc::vec::Vec;

use super::id::{ContextId, TaskId};

/// 任务与其执行上下文之间的关系，通过任务的 Id 来查询这个关系
pub struct TaskRel {
    /// 所属任务
    pub task: TaskId,
    /// 仍在执行的上下文
    pub contexts: Vec<ContextId>,
    /// 已经结束的上下文，以及是否被终止
    pub dead_contexts: Vec<(ContextId, bool)>,
}

impl TaskRel {
    /// 创建任务时使用
    pub fn new(task: TaskId) -> Self {
        Self {
            task,
            contexts: Vec::new(),
            dead_contexts: Vec::new(),
        }
    }
    /// 添加上下文
    pub fn add_context(&mut self, ctx: ContextId) {
        self.contexts.push(ctx);
    }
    /// 上下文结束，被移入 dead_contexts
    pub fn del_context(&mut self, ctx: ContextId, killed: bool) {
        let pair = self.contexts.iter().enumerate().find(|(_, &id)| id == ctx);
        if let Some((idx, _)) = pair {
            let dead = self.contexts.remove(idx);
            self.dead_contexts.push((dead, killed));
        }
    }
    /// 所有上下文都已结束，任务可以销毁
    #[inline]
    pub fn can_end(&self) -> bool {
        self.contexts.is_empty()
    }
}
