/// Manager trait
///
/// 按 id 保存实体，调度只需要 id。
pub trait Manage<T, I: Copy + Ord> {
    /// 插入 item
    fn insert(&mut self, id: I, item: T);
    /// 删除 item
    fn delete(&mut self, id: I) -> Option<T>;
    /// 获取 mut item
    fn get_mut(&mut self, id: I) -> Option<&mut T>;
    /// 是否还有实体
    fn is_empty(&self) -> bool;
}
