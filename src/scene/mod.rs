//! Scene objects a view consumes: layers, cameras, reflection planes and shadow maps.

pub mod camera;
pub mod layer;
pub mod reflection_plane;
pub mod shadow_map;

pub use camera::{Camera, CameraData, Projection, WeakCamera};
pub use layer::{Layer, LayerData, WeakLayer};
pub use reflection_plane::{PlaneVisibility, ReflectionPlane, mirrored_view_matrix, reflection_matrix};
pub use shadow_map::{ShadowMap, ShadowMapData};
