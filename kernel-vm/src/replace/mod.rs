//! 页面置换算法

mod clock;
mod fifo;

pub use clock::SecondChance;
pub use fifo::Fifo;

use crate::{FrameId, MemoryState, PolicyKind};

/// 页面置换算法
pub trait Replace {
    /// 选出一个牺牲页帧。
    ///
    /// 干净的牺牲者已经被摘下，返回的是空闲页帧；脏的原样返回，由调用者换出。
    /// 被预留或加锁的页帧永远不会被选中。
    fn select_victim(&mut self, memory: &mut MemoryState) -> Option<FrameId>;
}

/// 按配置选定的置换算法。
#[derive(Clone, Debug)]
pub enum Replacer {
    /// 先进先出
    Fifo(Fifo),
    /// 二次机会
    SecondChance(SecondChance),
}

impl Replacer {
    /// 新建置换器。`frames_wanted` 只对时钟算法有意义。
    pub fn new(kind: PolicyKind, frames_wanted: usize) -> Self {
        match kind {
            PolicyKind::Fifo => Self::Fifo(Fifo),
            PolicyKind::SecondChance => Self::SecondChance(SecondChance::new(frames_wanted)),
        }
    }
}

impl Replace for Replacer {
    #[inline]
    fn select_victim(&mut self, memory: &mut MemoryState) -> Option<FrameId> {
        match self {
            Self::Fifo(fifo) => fifo.select_victim(memory),
            Self::SecondChance(clock) => clock.select_victim(memory),
        }
    }
}
