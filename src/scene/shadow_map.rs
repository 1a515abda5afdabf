//! Shadow maps handed to a view by the light setup.
//!
//! A shadow map renders the scene's depth from one light into a depth
//! texture. Cube maps (point lights) share one texture array, so only the
//! first face layer clears it.

use glam::UVec2;
use std::ops::Deref;

use super::Camera;
use crate::core::Handle;

/// Payload of a [`ShadowMap`].
#[derive(Debug, Clone)]
pub struct ShadowMapData {
    /// Camera placed at the light.
    pub light_camera: Camera,
    /// Light index and layer of the depth texture array this map writes.
    pub light_index: u32,
    pub uses_cube_map: bool,
    pub size: UVec2,
}

/// Shadow map shared between the light setup and the views using it.
///
/// Compares by identity, so re-handing the same maps to a view is a no-op.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ShadowMap(Handle<ShadowMapData>);

impl ShadowMap {
    #[must_use]
    pub fn new(light_camera: Camera, light_index: u32, size: UVec2) -> Self {
        Self(Handle::new(ShadowMapData {
            light_camera,
            light_index,
            uses_cube_map: false,
            size,
        }))
    }

    #[must_use]
    pub fn new_cube_map(light_camera: Camera, light_index: u32, size: UVec2) -> Self {
        Self(Handle::new(ShadowMapData {
            light_camera,
            light_index,
            uses_cube_map: true,
            size,
        }))
    }

    #[must_use]
    pub fn light_camera(&self) -> Camera {
        self.0.borrow().light_camera.clone()
    }

    #[must_use]
    pub fn light_index(&self) -> u32 {
        self.0.borrow().light_index
    }

    #[must_use]
    pub fn uses_cube_map(&self) -> bool {
        self.0.borrow().uses_cube_map
    }

    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.0.borrow().size
    }

    /// Only the first layer of a cube map array clears, since the whole array is bound.
    #[must_use]
    pub fn clears_depth(&self) -> bool {
        !self.uses_cube_map() || self.light_index() == 0
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> &Handle<ShadowMapData> {
        &self.0
    }
}

impl Deref for ShadowMap {
    type Target = Handle<ShadowMapData>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
