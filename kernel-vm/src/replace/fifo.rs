use super::Replace;
use crate::{FrameId, MemoryState};

/// 先进先出：选占用者创建最早的页帧。
#[derive(Clone, Copy, Debug, Default)]
pub struct Fifo;

impl Replace for Fifo {
    fn select_victim(&mut self, memory: &mut MemoryState) -> Option<FrameId> {
        let now = memory.now();
        let mut oldest: Option<(FrameId, u64)> = None;
        for frame in memory.frames().iter().filter(|f| f.is_evictable()) {
            let Some(entry) = frame.page().and_then(|page| memory.page(page)) else {
                continue;
            };
            let age = now.saturating_sub(entry.created_at());
            // 同龄时保留下标小的
            if oldest.map_or(true, |(_, max)| age > max) {
                oldest = Some((frame.id(), age));
            }
        }
        let (victim, age) = oldest?;
        log::debug!("fifo victim {victim} (age {age})");
        if !memory.frames()[victim].is_dirty() {
            memory.detach(victim);
        }
        Some(victim)
    }
}
