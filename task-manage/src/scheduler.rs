use alloc::collections::VecDeque;

/// Schedule trait，根据 id 进行调度
/// add 添加 id
/// fetch 取出 id
pub trait Schedule<I: Copy + Ord> {
    /// 添加 id 进入调度队列
    fn add_back(&mut self, id: I);

    /// 从调度队列中取出 id
    fn fetch(&mut self) -> Option<I>;

    /// 添加 id 到调度队列首部
    fn add_front(&mut self, id: I);
}

/// 先来先服务的就绪队列。
///
/// 同一个 id 可以重复入队，取出的一方负责忽略已经结束的 id。
pub struct FifoScheduler<I: Copy + Ord> {
    task_queue: VecDeque<I>,
}

impl<I: Copy + Ord> FifoScheduler<I> {
    /// 新建空队列
    pub const fn new() -> Self {
        Self {
            task_queue: VecDeque::new(),
        }
    }

    /// 队列中的 id 数量
    #[inline]
    pub fn len(&self) -> usize {
        self.task_queue.len()
    }

    /// 队列是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.task_queue.is_empty()
    }
}

impl<I: Copy + Ord> Default for FifoScheduler<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Copy + Ord> Schedule<I> for FifoScheduler<I> {
    fn add_back(&mut self, id: I) {
        self.task_queue.push_back(id);
    }

    fn fetch(&mut self) -> Option<I> {
        self.task_queue.pop_front()
    }

    fn add_front(&mut self, id: I) {
        self.task_queue.push_front(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_in_arrival_order() {
        let mut q = FifoScheduler::new();
        q.add_back(1);
        q.add_back(2);
        q.add_front(0);
        assert_eq!(q.len(), 3);
        assert_eq!(q.fetch(), Some(0));
        assert_eq!(q.fetch(), Some(1));
        assert_eq!(q.fetch(), Some(2));
        assert_eq!(q.fetch(), None);
        assert!(q.is_empty());
    }
}
