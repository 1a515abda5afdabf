//! Object identity and lifecycle watches.
//!
//! Every externally visible object (layers, cameras, effects) carries a
//! [`Lifecycle`]: a process-unique [`ObjectId`], an optional parent id used
//! for the adopt-if-orphan ownership contract, and a list of watchers.
//!
//! ```text
//!   watcher (View)                 observed object
//!   ──────────────                 ───────────────
//!   lifecycle.watch(view_id, cb) ─▶ watchers: [(view_id, cb)]
//!                                   notify_changed()
//!   cb(object_id, Changed) ◀─────── every watcher, each time
//!                                   destroy() / last drop
//!   cb(object_id, Destroyed) ◀───── every watcher exactly once
//! ```
//!
//! Watchers are keyed by the watcher's own id so that a container can
//! unregister itself without holding on to the callback.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// Process-wide id generator.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a tracked object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened to a watched object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectEvent {
    /// A property the watchers depend on changed.
    Changed,
    /// The object was destroyed. Always the last event.
    Destroyed,
}

/// Callback invoked with the id of the watched object and what happened to it.
///
/// Callbacks must not register or remove watches on the object that fires them.
pub type WatchCallback = Box<dyn Fn(ObjectId, ObjectEvent)>;

/// Identity, parenting and destruction notification of one object.
pub struct Lifecycle {
    id: ObjectId,
    parent: Cell<Option<ObjectId>>,
    destroyed: Cell<bool>,
    watchers: RefCell<SmallVec<[(ObjectId, WatchCallback); 2]>>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            parent: Cell::new(None),
            destroyed: Cell::new(false),
            watchers: RefCell::new(SmallVec::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Id of the object responsible for this one, if any.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent.get()
    }

    pub fn set_parent(&self, parent: Option<ObjectId>) {
        self.parent.set(parent);
    }

    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Registers `callback` to run when this object changes or is destroyed.
    ///
    /// A second registration from the same watcher replaces the first.
    /// Watching an already destroyed object is ignored.
    pub fn watch(&self, watcher: ObjectId, callback: WatchCallback) {
        if self.is_destroyed() {
            return;
        }
        let mut watchers = self.watchers.borrow_mut();
        if let Some(slot) = watchers.iter_mut().find(|(id, _)| *id == watcher) {
            slot.1 = callback;
        } else {
            watchers.push((watcher, callback));
        }
    }

    /// Removes the watch registered by `watcher`, if any.
    pub fn unwatch(&self, watcher: ObjectId) {
        self.watchers.borrow_mut().retain(|(id, _)| *id != watcher);
    }

    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }

    /// Tells every watcher that the object changed. Ignored once destroyed.
    pub fn notify_changed(&self) {
        if self.is_destroyed() {
            return;
        }
        let watchers = self.watchers.borrow();
        log::trace!("Object {} changed, notifying {} watcher(s)", self.id, watchers.len());
        for (_, callback) in watchers.iter() {
            callback(self.id, ObjectEvent::Changed);
        }
    }

    /// Marks the object destroyed and notifies every watcher once.
    ///
    /// Later calls are no-ops.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        // Callbacks may call back into `unwatch`, so release the borrow first.
        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        log::trace!("Object {} destroyed, notifying {} watcher(s)", self.id, watchers.len());
        for (_, callback) in watchers {
            callback(self.id, ObjectEvent::Destroyed);
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("id", &self.id)
            .field("parent", &self.parent.get())
            .field("destroyed", &self.destroyed.get())
            .field("watchers", &self.watcher_count())
            .finish()
    }
}
