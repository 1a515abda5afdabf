//! Render Stage Subtrees
//!
//! Self-contained frame-graph fragments a view composes:
//!
//! | Stage | Renders |
//! |-------|---------|
//! | [`SceneStages`] | the scene through the view camera: z-fill, opaque, transparent, particles |
//! | [`ShadowMapStages`] | scene depth from each shadow-casting light into depth-only targets |
//! | [`ReflectionStages`] | the scene mirrored across one plane into an offscreen texture |
//! | [`EffectsStages`] | the post-processing chain over the rendered image |
//!
//! Every stage owns its nodes inside the view's [`FrameGraph`](super::FrameGraph)
//! and exposes a single root the view attaches where it needs it. Stages
//! never destroy nodes they do not own; effect subtrees belong to the view.

pub mod effects_stages;
pub mod particles;
pub mod reflection_stages;
pub mod render_stage;
pub mod scene_pass;
pub mod scene_stages;
pub mod shadow_map_stages;

use bitflags::bitflags;

pub use effects_stages::{EffectBinding, EffectsStages};
pub use particles::ParticleRenderStage;
pub use reflection_stages::ReflectionStages;
pub use render_stage::{RenderStage, SceneStageType};
pub use scene_pass::ScenePass;
pub use scene_stages::SceneStages;
pub use shadow_map_stages::{ShadowMapPass, ShadowMapStages};

bitflags! {
    /// Feature toggles of the scene passes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SceneFeatures: u8 {
        const BACK_TO_FRONT_SORTING = 1 << 0;
        const SKINNING              = 1 << 1;
        const FRUSTUM_CULLING       = 1 << 2;
        const Z_FILLING             = 1 << 3;
        const PARTICLES             = 1 << 4;
    }
}

impl Default for SceneFeatures {
    fn default() -> Self {
        Self::FRUSTUM_CULLING | Self::SKINNING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_features() {
        let features = SceneFeatures::default();
        assert!(features.contains(SceneFeatures::FRUSTUM_CULLING));
        assert!(features.contains(SceneFeatures::SKINNING));
        assert!(!features.intersects(
            SceneFeatures::Z_FILLING | SceneFeatures::PARTICLES | SceneFeatures::BACK_TO_FRONT_SORTING
        ));
    }
}
