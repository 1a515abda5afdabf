use glam::{Affine3A, Mat4};
use std::borrow::Cow;
use std::ops::Deref;

use crate::core::{Handle, WeakHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        /// Half height of the view volume.
        size: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Self::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Self::Orthographic {
                size,
                aspect,
                near,
                far,
            } => {
                let w = size * aspect;
                Mat4::orthographic_rh(-w, w, -size, size, near, far)
            }
        }
    }
}

/// Payload of a [`Camera`] entity: a world transform and a lens.
#[derive(Debug, Clone)]
pub struct CameraData {
    pub name: Cow<'static, str>,
    pub projection: Projection,
    pub world_transform: Affine3A,
}

/// Camera entity shared between the scene and the views rendering it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Camera(Handle<CameraData>);

pub type WeakCamera = WeakHandle<CameraData>;

impl Camera {
    /// Perspective camera, `fov_y_degrees` is the vertical field of view.
    #[must_use]
    pub fn new_perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        })
    }

    #[must_use]
    pub fn with_projection(projection: Projection) -> Self {
        Self(Handle::new(CameraData {
            name: Cow::Borrowed("Camera"),
            projection,
            world_transform: Affine3A::IDENTITY,
        }))
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.0.borrow().name.to_string()
    }

    pub fn set_name(&self, name: impl Into<Cow<'static, str>>) {
        self.0.borrow_mut().name = name.into();
    }

    #[must_use]
    pub fn projection(&self) -> Projection {
        self.0.borrow().projection
    }

    pub fn set_projection(&self, projection: Projection) {
        self.0.borrow_mut().projection = projection;
    }

    #[must_use]
    pub fn world_transform(&self) -> Affine3A {
        self.0.borrow().world_transform
    }

    pub fn set_world_transform(&self, transform: Affine3A) {
        self.0.borrow_mut().world_transform = transform;
    }

    /// View matrix = inverse world transform.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from(self.world_transform()).inverse()
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection().matrix()
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> &Handle<CameraData> {
        &self.0
    }
}

impl From<Handle<CameraData>> for Camera {
    fn from(handle: Handle<CameraData>) -> Self {
        Self(handle)
    }
}

impl Deref for Camera {
    type Target = Handle<CameraData>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
