use super::Replace;
use crate::{FrameId, MemoryState};

/// 二次机会（时钟）算法。
///
/// 指针在两次调用之间保持位置。一次扫描最多转两圈，腾出 `wanted` 个空闲页帧就停。
#[derive(Clone, Debug)]
pub struct SecondChance {
    cursor: usize,
    wanted: usize,
}

impl SecondChance {
    /// 新建时钟算法，指针从 0 号页帧开始。
    pub const fn new(wanted: usize) -> Self {
        Self { cursor: 0, wanted }
    }

    /// 时钟指针。
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Replace for SecondChance {
    fn select_victim(&mut self, memory: &mut MemoryState) -> Option<FrameId> {
        let len = memory.frames().len();
        if len == 0 {
            return None;
        }
        let mut fallback = None;
        'sweep: for _ in 0..2 {
            for _ in 0..len {
                if memory.frames().count_free() >= self.wanted {
                    break 'sweep;
                }
                let id = FrameId::new(self.cursor);
                let frame = &memory.frames()[id];
                if frame.is_referenced() {
                    memory.clear_referenced(id);
                } else if frame.page().is_some() && !frame.is_dirty() && frame.is_evictable() {
                    memory.detach(id);
                }
                let frame = &memory.frames()[id];
                if fallback.is_none() && frame.is_dirty() && frame.is_evictable() {
                    fallback = Some(id);
                }
                self.cursor = (self.cursor + 1) % len;
            }
        }
        if memory.frames().count_free() < self.wanted {
            if let Some(dirty) = fallback {
                log::debug!("clock fallback to dirty {dirty}");
                return Some(dirty);
            }
        }
        let victim = memory.frames().free_frame();
        log::debug!("clock victim {victim:?}, cursor {}", self.cursor);
        victim
    }
}
