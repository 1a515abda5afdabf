//! Shared Object Handles
//!
//! Layers, cameras and post-processing effects are shared between client
//! code and one or more views. They are single-threaded `Rc` handles that
//! pair the object value with its [`Lifecycle`].
//!
//! - [`Handle`]: strong reference. The last strong handle dropping destroys
//!   the object.
//! - [`WeakHandle`]: back-reference that never keeps the object alive and
//!   stops upgrading once the object is destroyed.
//! - [`Link`]: tagged ownership wrapper used by containers that adopt
//!   orphaned objects (`Owned`) and merely observe parented ones
//!   (`Borrowed`).

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use super::lifecycle::{Lifecycle, ObjectId, WatchCallback};

/// Heap cell shared by every handle of one object.
pub struct Shared<T: ?Sized> {
    lifecycle: Lifecycle,
    value: RefCell<T>,
}

impl<T> Shared<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            value: RefCell::new(value),
        }
    }
}

/// Strong handle to a tracked object.
pub struct Handle<T: ?Sized> {
    inner: Rc<Shared<T>>,
}

/// Weak handle to a tracked object.
pub struct WeakHandle<T: ?Sized> {
    inner: Weak<Shared<T>>,
    id: ObjectId,
}

impl<T> Handle<T> {
    /// Wraps `value` with a fresh lifecycle.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Shared::new(value)),
        }
    }
}

impl<T: ?Sized> Handle<T> {
    /// Builds a handle from an already allocated (possibly unsized) cell.
    pub(crate) fn from_shared(inner: Rc<Shared<T>>) -> Self {
        Self { inner }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.lifecycle.id()
    }

    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<ObjectId> {
        self.inner.lifecycle.parent()
    }

    pub fn set_parent(&self, parent: Option<ObjectId>) {
        self.inner.lifecycle.set_parent(parent);
    }

    /// `false` once [`destroy`](Self::destroy) has been called.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.inner.lifecycle.is_destroyed()
    }

    /// Destroys the object now, even though handles to it remain.
    pub fn destroy(&self) {
        self.inner.lifecycle.destroy();
    }

    pub fn watch(&self, watcher: ObjectId, callback: WatchCallback) {
        self.inner.lifecycle.watch(watcher, callback);
    }

    pub fn unwatch(&self, watcher: ObjectId) {
        self.inner.lifecycle.unwatch(watcher);
    }

    /// Immutably borrows the value.
    ///
    /// # Panics
    /// Panics if the value is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.value.borrow()
    }

    /// Mutably borrows the value.
    ///
    /// # Panics
    /// Panics if the value is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.value.borrow_mut()
    }

    /// Mutates the value, then tells watchers it changed.
    ///
    /// # Panics
    /// Panics if the value is currently borrowed.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        self.inner.lifecycle.notify_changed();
        result
    }

    /// The shared cell, for unsizing into a trait-object handle.
    pub(crate) fn shared(&self) -> Rc<Shared<T>> {
        Rc::clone(&self.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle {
            inner: Rc::downgrade(&self.inner),
            id: self.id(),
        }
    }

    /// Identity comparison.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl<T: ?Sized> WeakHandle<T> {
    /// Id of the referenced object, still available after it is gone.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Upgrades to a strong handle while the object is alive and not destroyed.
    #[must_use]
    pub fn upgrade(&self) -> Option<Handle<T>> {
        self.inner
            .upgrade()
            .filter(|inner| !inner.lifecycle.is_destroyed())
            .map(Handle::from_shared)
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| !inner.lifecycle.is_destroyed())
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
            id: self.id,
        }
    }
}

impl<T: ?Sized> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized> Eq for Handle<T> {}

impl<T: ?Sized> PartialEq for WeakHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: ?Sized> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<T: ?Sized> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ============================================================================
// Owned / borrowed links
// ============================================================================

/// Reference held by a container, tagged with who is responsible for it.
pub enum Link<T: ?Sized> {
    /// The container adopted the object and keeps it alive.
    Owned(Handle<T>),
    /// The object belongs elsewhere and is only observed.
    Borrowed(WeakHandle<T>),
}

impl<T: ?Sized> Link<T> {
    /// Adopts `handle` when it has no parent, otherwise borrows it.
    ///
    /// Adoption records `owner` as the object's parent.
    #[must_use]
    pub fn adopt_or_borrow(handle: &Handle<T>, owner: ObjectId) -> Self {
        if handle.parent().is_none() {
            handle.set_parent(Some(owner));
            Self::Owned(handle.clone())
        } else {
            Self::Borrowed(handle.downgrade())
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Owned(handle) => handle.id(),
            Self::Borrowed(weak) => weak.id(),
        }
    }

    #[must_use]
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Strong handle while the object is alive and not destroyed.
    #[must_use]
    pub fn upgrade(&self) -> Option<Handle<T>> {
        match self {
            Self::Owned(handle) => handle.is_alive().then(|| handle.clone()),
            Self::Borrowed(weak) => weak.upgrade(),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Owned(handle) => handle.is_alive(),
            Self::Borrowed(weak) => weak.is_alive(),
        }
    }

    /// Drops the link, giving adopted objects back their orphan status.
    ///
    /// Returns the handle if the object is still alive.
    pub fn release(self, owner: ObjectId) -> Option<Handle<T>> {
        match self {
            Self::Owned(handle) => {
                if handle.parent() == Some(owner) {
                    handle.set_parent(None);
                }
                handle.is_alive().then_some(handle)
            }
            Self::Borrowed(weak) => weak.upgrade(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(handle) => f.debug_tuple("Owned").field(&handle.id()).finish(),
            Self::Borrowed(weak) => f.debug_tuple("Borrowed").field(&weak.id()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_stops_upgrading_after_destroy() {
        let handle = Handle::new(5_u32);
        let weak = handle.downgrade();
        assert_eq!(weak.upgrade().map(|h| *h.borrow()), Some(5));

        handle.destroy();
        assert!(weak.upgrade().is_none());
        assert!(!handle.is_alive());
    }

    #[test]
    fn weak_stops_upgrading_after_drop() {
        let handle = Handle::new("layer");
        let weak = handle.downgrade();
        let id = handle.id();
        drop(handle);
        assert!(!weak.is_alive());
        assert_eq!(weak.id(), id);
    }

    #[test]
    fn adopt_orphan_borrow_parented() {
        let owner = ObjectId::next();
        let orphan = Handle::new(());
        let parented = Handle::new(());
        parented.set_parent(Some(ObjectId::next()));

        let owned = Link::adopt_or_borrow(&orphan, owner);
        let borrowed = Link::adopt_or_borrow(&parented, owner);

        assert!(owned.is_owned());
        assert_eq!(orphan.parent(), Some(owner));
        assert!(!borrowed.is_owned());
        assert_ne!(parented.parent(), Some(owner));

        drop(orphan);
        assert!(owned.is_alive());
        drop(parented);
        assert!(!borrowed.is_alive());
    }

    #[test]
    fn modify_notifies_watchers() {
        use std::cell::Cell;

        use crate::core::ObjectEvent;

        let handle = Handle::new(1_u32);
        let changes = Rc::new(Cell::new(0));
        let seen = Rc::clone(&changes);
        handle.watch(
            ObjectId::next(),
            Box::new(move |_, event| {
                if event == ObjectEvent::Changed {
                    seen.set(seen.get() + 1);
                }
            }),
        );

        let doubled = handle.modify(|value| {
            *value *= 2;
            *value
        });

        assert_eq!(doubled, 2);
        assert_eq!(*handle.borrow(), 2);
        assert_eq!(changes.get(), 1);
    }

    #[test]
    fn release_restores_orphan_status() {
        let owner = ObjectId::next();
        let handle = Handle::new(());
        let link = Link::adopt_or_borrow(&handle, owner);
        assert!(link.release(owner).is_some());
        assert_eq!(handle.parent(), None);
    }
}
