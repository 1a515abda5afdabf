//! Tone mapping and gamma correction.
//!
//! Usually the last effect of a chain: maps the HDR scene color into display
//! range and applies gamma. Views also run one internally when their
//! rendering features ask for tone mapping.
//!
//! ```text
//! ToneMappingAndGammaCorrectionEffect      RenderStateSet
//!  └─ ToneMappingLayerFilter               LayerFilter(fullscreen quad layer)
//!      └─ ToneMappingPassFilter            passName = gammaCorrectionPass
//!                                          inputTexture, finalExposure, gamma,
//!                                          toneMappingAlgorithm
//! ```

use glam::UVec2;
use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use super::{EffectContext, PostProcessingEffect};
use crate::framegraph::node::{Filter, FilterKey, FrameGraphNodeKind, LayerFilterMode, ParameterValue};
use crate::framegraph::render_target::TextureId;
use crate::framegraph::{FrameGraph, FrameGraphNodeId};
use crate::scene::Layer;

const PASS_FILTER_NAME: &str = "ToneMappingPassFilter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToneMapping {
    #[default]
    None,
    Reinhard,
    Filmic,
    Uncharted,
}

impl ToneMapping {
    /// Shader graph layer enabling the algorithm.
    #[must_use]
    pub const fn shader_layer(self) -> &'static str {
        match self {
            Self::None => "noToneMapping",
            Self::Reinhard => "reinhardToneMapping",
            Self::Filmic => "filmicToneMapping",
            Self::Uncharted => "unchartedToneMapping",
        }
    }
}

#[derive(Debug)]
pub struct ToneMappingAndGammaCorrectionEffect {
    exposure: f32,
    gamma: f32,
    tone_mapping: ToneMapping,
    quad_layer: Layer,
}

impl ToneMappingAndGammaCorrectionEffect {
    #[must_use]
    pub fn new() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
            tone_mapping: ToneMapping::None,
            quad_layer: Layer::new("ToneMappingFullScreenQuad"),
        }
    }

    #[must_use]
    pub fn exposure(&self) -> f32 {
        self.exposure
    }

    /// Plain setter. Go through [`Handle::modify`](crate::core::Handle::modify)
    /// on a registered effect so views rewrite their subtrees.
    pub fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure;
    }

    #[must_use]
    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        self.gamma = gamma;
    }

    #[must_use]
    pub fn tone_mapping(&self) -> ToneMapping {
        self.tone_mapping
    }

    pub fn set_tone_mapping(&mut self, tone_mapping: ToneMapping) {
        self.tone_mapping = tone_mapping;
    }

    /// Layer carried by the fullscreen quad this effect draws.
    #[must_use]
    pub fn quad_layer(&self) -> &Layer {
        &self.quad_layer
    }

    fn write_parameters(&self, ctx: &mut EffectContext<'_>, input: Option<Option<TextureId>>) {
        let Some(pass) = ctx.graph.find_by_name(ctx.subtree, PASS_FILTER_NAME) else {
            log::warn!("ToneMappingAndGammaCorrectionEffect: pass filter missing from subtree");
            return;
        };
        let Ok(kind) = ctx.graph.kind_mut(pass) else { return };
        let Some(filter) = kind.filter_mut() else { return };

        if let Some(texture) = input {
            filter.set_parameter("inputTexture", texture);
        }
        filter.set_parameter("finalExposure", self.exposure);
        filter.set_parameter("gamma", self.gamma);
        filter.set_parameter(
            "toneMappingAlgorithm",
            ParameterValue::String(self.tone_mapping.shader_layer().into()),
        );
    }
}

impl Default for ToneMappingAndGammaCorrectionEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcessingEffect for ToneMappingAndGammaCorrectionEffect {
    fn name(&self) -> &str {
        "ToneMappingAndGammaCorrectionEffect"
    }

    fn frame_graph_sub_tree(&mut self, graph: &mut FrameGraph) -> Option<FrameGraphNodeId> {
        let root = graph.create_node(
            "ToneMappingAndGammaCorrectionEffect",
            FrameGraphNodeKind::RenderStateSet { states: smallvec![] },
        );
        let build = |graph: &mut FrameGraph| -> crate::errors::Result<()> {
            let layer_filter = graph.create_child(
                root,
                "ToneMappingLayerFilter",
                FrameGraphNodeKind::LayerFilter {
                    layers: smallvec![self.quad_layer.id()],
                    mode: LayerFilterMode::AcceptAnyMatchingLayers,
                },
            )?;
            graph.create_child(
                layer_filter,
                PASS_FILTER_NAME,
                FrameGraphNodeKind::RenderPassFilter(Filter::matching([FilterKey::new(
                    "passName",
                    "gammaCorrectionPass",
                )])),
            )?;
            Ok(())
        };
        if let Err(err) = build(graph) {
            log::error!("ToneMappingAndGammaCorrectionEffect: failed to build subtree: {err}");
            graph.destroy(root);
            return None;
        }

        let mut ctx = EffectContext { graph, subtree: root };
        self.write_parameters(&mut ctx, Some(None));
        Some(root)
    }

    fn layers(&self) -> Vec<Layer> {
        vec![self.quad_layer.clone()]
    }

    fn set_input_texture(&mut self, ctx: &mut EffectContext<'_>, texture: Option<TextureId>) {
        self.write_parameters(ctx, Some(texture));
    }

    fn set_window_size(&mut self, ctx: &mut EffectContext<'_>, _size: UVec2) {
        self.write_parameters(ctx, None);
    }

    fn update_parameters(&mut self, ctx: &mut EffectContext<'_>) {
        self.write_parameters(ctx, None);
    }
}
