//! Views: configuration surface, rebuild scheduling and settings.

pub mod events;
pub mod settings;
#[allow(clippy::module_inception)]
pub mod view;

pub use events::{ViewChange, ViewEvent};
pub use settings::{RenderingFeatures, ViewSettings};
pub use view::View;

/// Feature flags of a view's scene passes.
pub type ViewFeatures = crate::framegraph::stages::SceneFeatures;
