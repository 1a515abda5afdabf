//! View Settings
//!
//! Declarative, serializable view configuration.
//!
//! ```rust,ignore
//! use kuesa::view::{View, ViewSettings};
//!
//! let settings = ViewSettings::from_json_str(r#"{ "z_filling": true, "surface_size": [1920, 1080] }"#)?;
//! let view = View::with_settings(&settings)?;
//! ```
//!
//! | Field                      | Description                                  | Default        |
//! |----------------------------|----------------------------------------------|----------------|
//! | `viewport_rect`            | Normalized viewport                          | full surface   |
//! | `frustum_culling`          | Cull against the camera frustum              | `true`         |
//! | `skinning`                 | Render skinned meshes                        | `true`         |
//! | `back_to_front_sorting`    | Sort transparent draws back to front         | `false`        |
//! | `z_filling`                | Depth-only pre-pass                          | `false`        |
//! | `particles_enabled`        | GPU particle stage                           | `false`        |
//! | `reflection_texture_size`  | Reflection target resolution                 | 512x512        |
//! | `clear_color`              | Render-to-texture clear color                | opaque black   |
//! | `surface_size`             | Output surface size in pixels                | 1280x720       |
//! | `uses_stencil_mask`        | Depth-stencil attachment on the scene target | `false`        |
//! | `rendering_features`       | Target precision, multisampling, tone mapping | 8-bit, no MSAA, off |
//! | `exposure`                 | Exposure of the internal tone mapping stage  | `1.0`          |
//! | `gamma`                    | Gamma of the internal tone mapping stage     | `2.2`          |
//! | `tone_mapping_algorithm`   | Algorithm of the internal tone mapping stage | `None`         |
//! | `reflection_planes`        | Plane equations `[a, b, c, d]`               | none           |

use std::path::Path;

use glam::{UVec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::core::NormalizedRect;
use crate::errors::{KuesaError, Result};
use crate::fx::ToneMapping;
use crate::scene::ReflectionPlane;

use super::View;

/// Precision and sample count of the offscreen targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingFeatures {
    /// Use `Rgba16Float` color attachments instead of `Rgba8Unorm`.
    pub half_float_render_targets: bool,
    /// Sample count of the main scene target. `1` disables multisampling.
    pub msaa_samples: u32,
    /// Finish every frame with the view's own tone mapping and gamma
    /// correction stage, after the user effects.
    pub tone_mapping: bool,
}

impl Default for RenderingFeatures {
    fn default() -> Self {
        Self {
            half_float_render_targets: false,
            msaa_samples: 1,
            tone_mapping: false,
        }
    }
}

impl RenderingFeatures {
    #[inline]
    #[must_use]
    pub fn is_multisampled(&self) -> bool {
        self.msaa_samples > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub viewport_rect: NormalizedRect,
    pub frustum_culling: bool,
    pub skinning: bool,
    pub back_to_front_sorting: bool,
    pub z_filling: bool,
    pub particles_enabled: bool,
    pub reflection_texture_size: UVec2,
    pub clear_color: Vec4,
    pub surface_size: UVec2,
    pub uses_stencil_mask: bool,
    pub rendering_features: RenderingFeatures,
    pub reflection_planes: Vec<Vec4>,
    pub exposure: f32,
    pub gamma: f32,
    pub tone_mapping_algorithm: ToneMapping,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            viewport_rect: NormalizedRect::FULL,
            frustum_culling: true,
            skinning: true,
            back_to_front_sorting: false,
            z_filling: false,
            particles_enabled: false,
            reflection_texture_size: UVec2::splat(512),
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            surface_size: UVec2::new(1280, 720),
            uses_stencil_mask: false,
            rendering_features: RenderingFeatures::default(),
            reflection_planes: Vec::new(),
            exposure: 1.0,
            gamma: 2.2,
            tone_mapping_algorithm: ToneMapping::None,
        }
    }
}

impl ViewSettings {
    /// Decodes and validates settings from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading view settings from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects values a view cannot render with.
    pub fn validate(&self) -> Result<()> {
        let rect = self.viewport_rect;
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Err(KuesaError::InvalidSettings {
                field: "viewport_rect",
                reason: format!("empty rect {}x{}", rect.width, rect.height),
            });
        }
        if self.surface_size.min_element() == 0 {
            return Err(KuesaError::InvalidSettings {
                field: "surface_size",
                reason: format!("zero-sized surface {}", self.surface_size),
            });
        }
        if self.reflection_texture_size.min_element() == 0 {
            return Err(KuesaError::InvalidSettings {
                field: "reflection_texture_size",
                reason: format!("zero-sized texture {}", self.reflection_texture_size),
            });
        }
        let samples = self.rendering_features.msaa_samples;
        if samples == 0 || !samples.is_power_of_two() {
            return Err(KuesaError::InvalidSettings {
                field: "rendering_features.msaa_samples",
                reason: format!("{samples} is not a power of two"),
            });
        }
        if !self.exposure.is_finite() {
            return Err(KuesaError::InvalidSettings {
                field: "exposure",
                reason: format!("{} is not finite", self.exposure),
            });
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(KuesaError::InvalidSettings {
                field: "gamma",
                reason: format!("{} is not a positive number", self.gamma),
            });
        }
        Ok(())
    }

    /// Pushes every field into `view` through its regular setters, so only
    /// actual changes notify and reconfigure.
    pub fn apply(&self, view: &mut View) -> Result<()> {
        self.validate()?;

        view.set_viewport_rect(self.viewport_rect);
        view.set_frustum_culling(self.frustum_culling);
        view.set_skinning(self.skinning);
        view.set_back_to_front_sorting(self.back_to_front_sorting);
        view.set_z_filling(self.z_filling);
        view.set_particles_enabled(self.particles_enabled);
        view.set_reflection_texture_size(self.reflection_texture_size);
        view.set_clear_color(self.clear_color);
        view.set_surface_size(self.surface_size);
        view.set_uses_stencil_mask(self.uses_stencil_mask);
        view.set_rendering_features(self.rendering_features);
        view.set_exposure(self.exposure);
        view.set_gamma(self.gamma);
        view.set_tone_mapping_algorithm(self.tone_mapping_algorithm);

        let planes: Vec<ReflectionPlane> = self
            .reflection_planes
            .iter()
            .map(|&equation| ReflectionPlane::new(equation))
            .collect();
        if view.reflection_planes() != planes.as_slice() {
            view.clear_reflection_planes();
            for plane in planes {
                view.add_reflection_plane(plane);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let settings = ViewSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, ViewSettings::default());
    }

    #[test]
    fn zero_samples_rejected() {
        let err = ViewSettings::from_json_str(r#"{ "rendering_features": { "msaa_samples": 0 } }"#).unwrap_err();
        assert!(matches!(
            err,
            KuesaError::InvalidSettings {
                field: "rendering_features.msaa_samples",
                ..
            }
        ));
    }

    #[test]
    fn negative_gamma_rejected() {
        let err = ViewSettings::from_json_str(r#"{ "gamma": -1.0 }"#).unwrap_err();
        assert!(matches!(err, KuesaError::InvalidSettings { field: "gamma", .. }));
    }
}
