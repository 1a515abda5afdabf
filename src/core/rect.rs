use glam::{UVec2, Vec2};
use serde::{Deserialize, Serialize};

/// Rectangle in normalized surface coordinates (`0..1` on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedRect {
    /// The whole surface.
    pub const FULL: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Pixel size this rect covers on a surface of `surface` pixels, at least 1x1.
    #[must_use]
    pub fn pixel_size(&self, surface: UVec2) -> UVec2 {
        let scaled = (surface.as_vec2() * self.size()).round();
        scaled.max(Vec2::ONE).as_uvec2()
    }
}

impl Default for NormalizedRect {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_scales_and_clamps() {
        let half = NormalizedRect::new(0.0, 0.0, 0.5, 0.25);
        assert_eq!(half.pixel_size(UVec2::new(800, 600)), UVec2::new(400, 150));

        let empty = NormalizedRect::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(empty.pixel_size(UVec2::new(800, 600)), UVec2::ONE);
    }
}
