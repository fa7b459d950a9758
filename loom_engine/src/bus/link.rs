/// Non-owning handle to an object owned by another module

use std::fmt;
use std::sync::{Arc, Weak};

/// Weak reference carried over the bus in place of a raw pointer
///
/// The receiver must `upgrade()` before use and treat `None` as "the owner is
/// gone". Two links compare equal with [`Link::same_as`] only if they point at
/// the same allocation, which lets a child notice that its parent recreated
/// an object.
pub struct Link<T: ?Sized> {
    inner: Weak<T>,
}

impl<T: ?Sized> Link<T> {
    pub fn new(target: &Arc<T>) -> Self {
        Self { inner: Arc::downgrade(target) }
    }

    pub fn upgrade(&self) -> Option<Arc<T>> {
        self.inner.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn same_as(&self, other: &Link<T>) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }

    pub fn points_to(&self, target: &Arc<T>) -> bool {
        std::ptr::addr_eq(self.inner.as_ptr(), Arc::as_ptr(target))
    }
}

impl<T: ?Sized> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: ?Sized> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("alive", &self.is_alive()).finish()
    }
}

#[cfg(test)]
#[path = "link_tests.rs"]
mod tests;
