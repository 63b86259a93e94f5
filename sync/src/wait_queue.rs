use alloc::{
    collections::{BTreeMap, VecDeque},
    vec::Vec,
};
use core::task::Waker;
use pagesim_task_manage::ContextId;

/// 一个等待者。
///
/// 只登记不阻塞的等待者没有 waker，被通知时只是移出队列。
struct Waiter<I> {
    id: I,
    waker: Option<Waker>,
}

/// 按资源标识分组的等待队列。
///
/// `K` 是资源标识（页、缺页事件、I/O 请求……），`I` 是等待者的 id。
/// 通知总是唤醒一个资源上的全部等待者。
pub struct WaitQueues<K: Ord + Copy, I: Copy + Eq = ContextId> {
    queues: BTreeMap<K, VecDeque<Waiter<I>>>,
}

impl<K: Ord + Copy, I: Copy + Eq> WaitQueues<K, I> {
    /// 新建
    pub const fn new() -> Self {
        Self {
            queues: BTreeMap::new(),
        }
    }

    /// 将 `id` 阻塞在 `key` 上，被通知时用 `waker` 唤醒。
    ///
    /// 已经在队列中则只更新 waker。
    pub fn wait(&mut self, key: K, id: I, waker: &Waker) {
        let queue = self.queues.entry(key).or_default();
        match queue.iter_mut().find(|w| w.id == id) {
            Some(w) => {
                if !w.waker.as_ref().map_or(false, |old| old.will_wake(waker)) {
                    w.waker = Some(waker.clone());
                }
            }
            None => queue.push_back(Waiter {
                id,
                waker: Some(waker.clone()),
            }),
        }
    }

    /// 只把 `id` 登记到 `key` 的等待集合里，不提供唤醒方式。
    pub fn enqueue(&mut self, key: K, id: I) {
        let queue = self.queues.entry(key).or_default();
        if !queue.iter().any(|w| w.id == id) {
            queue.push_back(Waiter { id, waker: None });
        }
    }

    /// `id` 是否还在 `key` 上等待
    pub fn is_waiting(&self, key: K, id: I) -> bool {
        self.queues
            .get(&key)
            .map_or(false, |q| q.iter().any(|w| w.id == id))
    }

    /// 唤醒 `key` 上的所有等待者，按入队顺序返回它们的 id。
    pub fn notify_all(&mut self, key: K) -> Vec<I> {
        self.queues
            .remove(&key)
            .map(|queue| {
                queue
                    .into_iter()
                    .map(|w| {
                        if let Some(waker) = w.waker {
                            waker.wake();
                        }
                        w.id
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 把 `id` 从所有队列中移除并唤醒它，返回它原先等待的资源。
    ///
    /// 用于终止一个正在等待的上下文。
    pub fn cancel(&mut self, id: I) -> Vec<K> {
        let mut keys = Vec::new();
        let mut wakers = Vec::new();
        self.queues.retain(|key, queue| {
            queue.retain(|w| {
                if w.id != id {
                    return true;
                }
                keys.push(*key);
                if let Some(waker) = &w.waker {
                    wakers.push(waker.clone());
                }
                false
            });
            !queue.is_empty()
        });
        wakers.into_iter().for_each(Waker::wake);
        keys
    }

    /// `id` 正在等待的资源
    pub fn keys_of(&self, id: I) -> Vec<K> {
        self.queues
            .iter()
            .filter(|(_, q)| q.iter().any(|w| w.id == id))
            .map(|(k, _)| *k)
            .collect()
    }
}

impl<K: Ord + Copy, I: Copy + Eq> Default for WaitQueues<K, I> {
    fn default() -> Self {
        Self::new()
    }
}
