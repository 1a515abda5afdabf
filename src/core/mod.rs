//! Core building blocks shared by the scene objects, the frame graph and the view.

pub mod handle;
pub mod lifecycle;
pub mod rect;

pub use handle::{Handle, Link, Shared, WeakHandle};
pub use lifecycle::{Lifecycle, ObjectEvent, ObjectId, WatchCallback};
pub use rect::NormalizedRect;
