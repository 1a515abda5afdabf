//! Reflection planes and mirrored camera math.
//!
//! A plane is stored as its equation `a·x + b·y + c·z + d = 0` packed in a
//! `Vec4` (`xyz` = normal, `w` = d). The optional layer restricts what the
//! reflection shows; without one the view's own layers apply.

use glam::{Mat4, Vec4};

use super::layer::{Layer, WeakLayer};
use crate::core::ObjectId;

/// What a reflection plane's layer restriction resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneVisibility {
    /// No layer given, the view's layers apply.
    ViewLayers,
    /// Only entities tagged with this layer are reflected.
    Layer(ObjectId),
    /// A layer was given but is gone, the plane renders nothing.
    Invalid,
}

#[derive(Debug, Clone)]
pub struct ReflectionPlane {
    equation: Vec4,
    layer: Option<WeakLayer>,
}

impl ReflectionPlane {
    #[must_use]
    pub fn new(equation: Vec4) -> Self {
        Self {
            equation,
            layer: None,
        }
    }

    #[must_use]
    pub fn with_layer(equation: Vec4, layer: &Layer) -> Self {
        Self {
            equation,
            layer: Some(layer.downgrade()),
        }
    }

    #[inline]
    #[must_use]
    pub fn equation(&self) -> Vec4 {
        self.equation
    }

    /// The restricting layer, if one was given and is still alive.
    #[must_use]
    pub fn layer(&self) -> Option<Layer> {
        self.layer.as_ref()?.upgrade().map(Layer::from)
    }

    /// Id of the restricting layer, alive or not.
    #[must_use]
    pub fn layer_id(&self) -> Option<ObjectId> {
        self.layer.as_ref().map(WeakLayer::id)
    }

    #[must_use]
    pub fn visibility(&self) -> PlaneVisibility {
        match &self.layer {
            None => PlaneVisibility::ViewLayers,
            Some(weak) if weak.is_alive() => PlaneVisibility::Layer(weak.id()),
            Some(_) => PlaneVisibility::Invalid,
        }
    }

    /// Equation scaled so the normal has unit length, `None` for a degenerate normal.
    #[must_use]
    pub fn normalized_equation(&self) -> Option<Vec4> {
        let length = self.equation.truncate().length();
        (length > f32::EPSILON).then(|| self.equation / length)
    }

    /// Householder reflection across the plane, identity for a degenerate plane.
    #[must_use]
    pub fn reflection_matrix(&self) -> Mat4 {
        self.normalized_equation()
            .map_or(Mat4::IDENTITY, reflection_matrix)
    }
}

impl PartialEq for ReflectionPlane {
    fn eq(&self, other: &Self) -> bool {
        self.equation == other.equation
            && self.layer.as_ref().map(WeakLayer::id) == other.layer.as_ref().map(WeakLayer::id)
    }
}

/// Reflection across the unit-normal plane `n·x + d = 0`.
///
/// `R = I - 2nnᵀ` for the linear part and `-2dn` for the translation.
#[must_use]
pub fn reflection_matrix(plane: Vec4) -> Mat4 {
    let n = plane.truncate();
    let d = plane.w;
    Mat4::from_cols(
        Vec4::new(1.0 - 2.0 * n.x * n.x, -2.0 * n.x * n.y, -2.0 * n.x * n.z, 0.0),
        Vec4::new(-2.0 * n.x * n.y, 1.0 - 2.0 * n.y * n.y, -2.0 * n.y * n.z, 0.0),
        Vec4::new(-2.0 * n.x * n.z, -2.0 * n.y * n.z, 1.0 - 2.0 * n.z * n.z, 0.0),
        Vec4::new(-2.0 * d * n.x, -2.0 * d * n.y, -2.0 * d * n.z, 1.0),
    )
}

/// View matrix of the camera mirrored across `plane`.
#[must_use]
pub fn mirrored_view_matrix(view: Mat4, plane: &ReflectionPlane) -> Mat4 {
    view * plane.reflection_matrix()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn reflects_across_ground_plane() {
        let plane = ReflectionPlane::new(Vec4::new(0.0, 1.0, 0.0, 0.0));
        let p = plane.reflection_matrix().transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert!(p.abs_diff_eq(Vec3::new(1.0, -2.0, 3.0), 1e-6));
    }

    #[test]
    fn reflects_across_offset_unnormalized_plane() {
        // 2y - 2 = 0  <=>  y = 1
        let plane = ReflectionPlane::new(Vec4::new(0.0, 2.0, 0.0, -2.0));
        let p = plane.reflection_matrix().transform_point3(Vec3::new(0.0, 3.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-6));
    }

    #[test]
    fn reflection_is_an_involution() {
        let plane = ReflectionPlane::new(Vec4::new(1.0, 1.0, 0.0, 0.5));
        let r = plane.reflection_matrix();
        assert!((r * r).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn degenerate_plane_is_identity() {
        let plane = ReflectionPlane::new(Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert!(plane.normalized_equation().is_none());
        assert_eq!(plane.reflection_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn visibility_follows_layer_lifetime() {
        let layer = Layer::new("mirror");
        let plane = ReflectionPlane::with_layer(Vec4::Y, &layer);
        assert_eq!(plane.visibility(), PlaneVisibility::Layer(layer.id()));
        assert_eq!(ReflectionPlane::new(Vec4::Y).visibility(), PlaneVisibility::ViewLayers);

        layer.destroy();
        assert_eq!(plane.visibility(), PlaneVisibility::Invalid);
        assert!(plane.layer().is_none());
    }
}
