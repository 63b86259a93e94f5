use core::cell::{Ref, RefCell, RefMut};

/// 单处理器上的独占单元。
///
/// 同一时刻只有一个执行上下文在运行，访问不需要锁；
/// 但借用检查推迟到运行时，跨挂起点持有借用会在下一次访问时 panic。
pub struct UPCell<T> {
    /// inner data
    inner: RefCell<T>,
}

impl<T> UPCell<T> {
    /// 新建单元。
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            inner: RefCell::new(value),
        }
    }

    /// 独占访问。
    #[inline]
    pub fn exclusive_access(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// 只读访问。
    #[inline]
    pub fn access(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    /// 在一次独占访问中执行 `f`。
    #[inline]
    pub fn exclusive_session<F, V>(&self, f: F) -> V
    where
        F: FnOnce(&mut T) -> V,
    {
        let mut inner = self.exclusive_access();
        f(&mut inner)
    }
}
