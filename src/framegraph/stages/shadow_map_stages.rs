//! Shadow Map Stages
//!
//! Renders scene depth from every shadow-casting light before the view's
//! cameras render, one pass per shadow map:
//!
//! ```text
//! KuesaShadowMapStages
//!  └─ KuesaShadowMapLayerFilter          LayerFilter(layers)   only when layers are set
//!      ├─ KuesaShadowMap 0               RenderTargetSelector(depth-only target)
//!      │   ├─ KuesaShadowMapClear        ClearBuffers(depth) → NoDraw
//!      │   └─ KuesaShadowMapCamera       CameraSelector(light camera)
//!      │       └─ KuesaScenePass(ShadowMap)   lightIndex, cubeShadowMap
//!      └─ KuesaShadowMap 1 ...
//! ```
//!
//! Passes follow the culling and skinning flags only; the other scene
//! features do not apply to depth rendering.

use glam::{UVec2, Vec4};
use smallvec::SmallVec;

use crate::core::ObjectId;
use crate::errors::Result;
use crate::framegraph::node::{ClearBufferFlags, FrameGraphNodeKind, LayerFilterMode};
use crate::framegraph::render_target::{RenderTargetDesc, RenderTargetFlags, RenderTargetId, TextureId};
use crate::framegraph::{FrameGraph, FrameGraphNodeId};
use crate::scene::ShadowMap;

use super::SceneFeatures;
use super::render_stage::SceneStageType;
use super::scene_pass::ScenePass;

const SHADOW_FEATURES: SceneFeatures = SceneFeatures::FRUSTUM_CULLING.union(SceneFeatures::SKINNING);

/// Depth pass for one light.
#[derive(Debug)]
pub struct ShadowMapPass {
    root: FrameGraphNodeId,
    clear: FrameGraphNodeId,
    camera_selector: FrameGraphNodeId,
    scene_pass: ScenePass,
    render_target: RenderTargetId,
}

impl ShadowMapPass {
    fn new(graph: &mut FrameGraph, index: usize) -> Result<Self> {
        let render_target = graph.create_render_target(
            "KuesaShadowMapTarget",
            RenderTargetDesc::new(RenderTargetFlags::DEPTH_ONLY, UVec2::ONE),
        );
        let root = graph.create_node(
            format!("KuesaShadowMap {index}"),
            FrameGraphNodeKind::RenderTargetSelector {
                target: Some(render_target),
            },
        );
        let clear = graph.create_child(
            root,
            "KuesaShadowMapClear",
            FrameGraphNodeKind::ClearBuffers {
                buffers: ClearBufferFlags::DEPTH,
                color: Vec4::ZERO,
            },
        )?;
        graph.create_child(clear, "KuesaShadowMapNoDraw", FrameGraphNodeKind::NoDraw)?;
        let camera_selector = graph.create_child(
            root,
            "KuesaShadowMapCamera",
            FrameGraphNodeKind::CameraSelector {
                camera: None,
                mirror_plane: None,
            },
        )?;

        let mut scene_pass = ScenePass::new(graph, SceneStageType::ShadowMap, SHADOW_FEATURES)?;
        scene_pass.set_parameter(graph, "isReflective", false)?;
        scene_pass.set_parameter(graph, "reflectionPlane", Vec4::ZERO)?;
        graph.set_parent(scene_pass.root(), Some(camera_selector))?;

        Ok(Self {
            root,
            clear,
            camera_selector,
            scene_pass,
            render_target,
        })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn render_target(&self) -> RenderTargetId {
        self.render_target
    }

    #[must_use]
    pub fn depth_texture(&self, graph: &FrameGraph) -> Option<TextureId> {
        graph.depth_texture(self.render_target)
    }

    fn set_shadow_map(&mut self, graph: &mut FrameGraph, shadow_map: &ShadowMap) -> Result<()> {
        let size = shadow_map.size().max(UVec2::ONE);
        if graph.render_target(self.render_target).map(|target| target.size) != Some(size) {
            graph.resize_render_target(self.render_target, size)?;
        }
        *graph.kind_mut(self.camera_selector)? = FrameGraphNodeKind::CameraSelector {
            camera: Some(shadow_map.light_camera().id()),
            mirror_plane: None,
        };
        graph.set_enabled(self.clear, shadow_map.clears_depth())?;

        let light_index = i32::try_from(shadow_map.light_index()).unwrap_or(i32::MAX);
        self.scene_pass.set_parameter(graph, "lightIndex", light_index)?;
        self.scene_pass
            .set_parameter(graph, "cubeShadowMap", shadow_map.uses_cube_map())
    }

    fn set_features(&mut self, graph: &mut FrameGraph, features: SceneFeatures) -> Result<()> {
        self.scene_pass.reconfigure(graph, features & SHADOW_FEATURES)
    }

    fn release(&self, graph: &mut FrameGraph) {
        self.scene_pass.release(graph);
        graph.destroy(self.root);
        graph.destroy_render_target(self.render_target);
    }
}

#[derive(Debug)]
pub struct ShadowMapStages {
    root: FrameGraphNodeId,
    layer_filter: FrameGraphNodeId,
    passes: Vec<ShadowMapPass>,
    shadow_maps: Vec<ShadowMap>,
    layers: SmallVec<[ObjectId; 4]>,
    features: SceneFeatures,
}

impl ShadowMapStages {
    pub fn new(graph: &mut FrameGraph) -> Result<Self> {
        let root = graph.create_node("KuesaShadowMapStages", FrameGraphNodeKind::Group);
        let layer_filter = graph.create_node(
            "KuesaShadowMapLayerFilter",
            FrameGraphNodeKind::LayerFilter {
                layers: SmallVec::new(),
                mode: LayerFilterMode::AcceptAnyMatchingLayers,
            },
        );
        Ok(Self {
            root,
            layer_filter,
            passes: Vec::new(),
            shadow_maps: Vec::new(),
            layers: SmallVec::new(),
            features: SceneFeatures::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.root
    }

    #[must_use]
    pub fn shadow_maps(&self) -> &[ShadowMap] {
        &self.shadow_maps
    }

    #[must_use]
    pub fn passes(&self) -> &[ShadowMapPass] {
        &self.passes
    }

    /// Replaces the rendered maps. Returns `false` when they are unchanged.
    pub fn set_shadow_maps(&mut self, graph: &mut FrameGraph, shadow_maps: &[ShadowMap]) -> Result<bool> {
        if self.shadow_maps.as_slice() == shadow_maps {
            return Ok(false);
        }
        self.shadow_maps = shadow_maps.to_vec();
        self.reconfigure(graph)?;
        Ok(true)
    }

    #[inline]
    #[must_use]
    pub fn features(&self) -> SceneFeatures {
        self.features
    }

    pub fn set_features(&mut self, graph: &mut FrameGraph, features: SceneFeatures) -> Result<()> {
        if self.features == features {
            return Ok(());
        }
        self.features = features;
        self.reconfigure(graph)
    }

    #[must_use]
    pub fn layers(&self) -> &[ObjectId] {
        &self.layers
    }

    pub fn set_layers(&mut self, graph: &mut FrameGraph, layers: &[ObjectId]) -> Result<()> {
        if self.layers.as_slice() == layers {
            return Ok(());
        }
        self.layers = layers.iter().copied().collect();
        *graph.kind_mut(self.layer_filter)? = FrameGraphNodeKind::LayerFilter {
            layers: self.layers.clone(),
            mode: LayerFilterMode::AcceptAnyMatchingLayers,
        };
        self.reconfigure(graph)
    }

    /// One depth texture per shadow map, in order.
    #[must_use]
    pub fn depth_textures(&self, graph: &FrameGraph) -> Vec<Option<TextureId>> {
        self.passes.iter().map(|pass| pass.depth_texture(graph)).collect()
    }

    /// Matches the passes to the current maps and re-attaches them.
    pub fn reconfigure(&mut self, graph: &mut FrameGraph) -> Result<()> {
        graph.detach(self.layer_filter);
        let parent = if self.layers.is_empty() {
            self.root
        } else {
            graph.set_parent(self.layer_filter, Some(self.root))?;
            self.layer_filter
        };

        while self.passes.len() > self.shadow_maps.len() {
            if let Some(pass) = self.passes.pop() {
                pass.release(graph);
            }
        }
        while self.passes.len() < self.shadow_maps.len() {
            let pass = ShadowMapPass::new(graph, self.passes.len())?;
            self.passes.push(pass);
        }

        for (pass, shadow_map) in self.passes.iter_mut().zip(&self.shadow_maps) {
            pass.set_shadow_map(graph, shadow_map)?;
            pass.set_features(graph, self.features)?;
            graph.set_parent(pass.root(), Some(parent))?;
        }
        Ok(())
    }

    /// Destroys every pass with its target, and the stage's own nodes.
    pub fn release(&mut self, graph: &mut FrameGraph) {
        for pass in self.passes.drain(..) {
            pass.release(graph);
        }
        graph.destroy(self.layer_filter);
        graph.destroy(self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framegraph::node::ParameterValue;
    use crate::framegraph::render_target::TextureFormat;
    use crate::scene::Camera;

    fn light() -> Camera {
        Camera::new_perspective(60.0, 1.0, 0.5, 40.0)
    }

    fn filter_parameter(graph: &FrameGraph, pass: &ShadowMapPass, name: &str) -> Option<ParameterValue> {
        let filter = graph.find_by_name(pass.root(), "KuesaNonSkinnedTechniqueFilter(ShadowMap)")?;
        graph.node(filter)?.kind.filter()?.parameter(name).cloned()
    }

    #[test]
    fn one_depth_pass_per_map() {
        let mut graph = FrameGraph::new();
        let mut stages = ShadowMapStages::new(&mut graph).unwrap();
        let camera = light();
        let maps = [
            ShadowMap::new(camera.clone(), 0, UVec2::splat(1024)),
            ShadowMap::new(light(), 1, UVec2::splat(512)),
        ];

        assert!(stages.set_shadow_maps(&mut graph, &maps).unwrap());
        assert!(!stages.set_shadow_maps(&mut graph, &maps).unwrap());

        let structure = graph.structure(stages.root()).unwrap();
        assert_eq!(structure.child_names(), vec!["KuesaShadowMap 0", "KuesaShadowMap 1"]);

        let first = &stages.passes()[0];
        let selector = graph.find_by_name(first.root(), "KuesaShadowMapCamera").unwrap();
        assert_eq!(
            graph.node(selector).unwrap().kind,
            FrameGraphNodeKind::CameraSelector {
                camera: Some(camera.id()),
                mirror_plane: None,
            }
        );
        assert_eq!(filter_parameter(&graph, &stages.passes()[1], "lightIndex"), Some(ParameterValue::Int(1)));

        let depth = stages.depth_textures(&graph)[1].unwrap();
        let texture = graph.texture(depth).unwrap();
        assert_eq!(texture.format, TextureFormat::Depth24);
        assert_eq!(texture.size, UVec2::splat(512));
        assert_eq!(graph.render_target(first.render_target()).unwrap().attachments().len(), 1);
    }

    #[test]
    fn later_cube_faces_keep_the_array() {
        let mut graph = FrameGraph::new();
        let mut stages = ShadowMapStages::new(&mut graph).unwrap();
        let maps = [
            ShadowMap::new_cube_map(light(), 0, UVec2::splat(256)),
            ShadowMap::new_cube_map(light(), 1, UVec2::splat(256)),
        ];
        stages.set_shadow_maps(&mut graph, &maps).unwrap();

        let clears: Vec<bool> = stages
            .passes()
            .iter()
            .map(|pass| {
                let clear = graph.find_by_name(pass.root(), "KuesaShadowMapClear").unwrap();
                graph.is_enabled(clear)
            })
            .collect();
        assert_eq!(clears, vec![true, false]);
        assert_eq!(
            filter_parameter(&graph, &stages.passes()[0], "cubeShadowMap"),
            Some(ParameterValue::Bool(true))
        );
    }

    #[test]
    fn only_culling_and_skinning_apply() {
        let mut graph = FrameGraph::new();
        let mut stages = ShadowMapStages::new(&mut graph).unwrap();
        stages
            .set_shadow_maps(&mut graph, &[ShadowMap::new(light(), 0, UVec2::splat(64))])
            .unwrap();
        stages
            .set_features(&mut graph, SceneFeatures::Z_FILLING | SceneFeatures::PARTICLES)
            .unwrap();

        let pass = &stages.passes()[0];
        let culling = graph.find_by_name(pass.root(), "KuesaFrustumCulling(ShadowMap)").unwrap();
        assert!(!graph.is_enabled(culling));
        assert!(graph.find_by_name(pass.root(), "KuesaSkinnedTechniqueFilter(ShadowMap)").is_none());
    }

    #[test]
    fn layers_insert_filter() {
        let mut graph = FrameGraph::new();
        let mut stages = ShadowMapStages::new(&mut graph).unwrap();
        stages
            .set_shadow_maps(&mut graph, &[ShadowMap::new(light(), 0, UVec2::splat(64))])
            .unwrap();
        stages.set_layers(&mut graph, &[ObjectId::next()]).unwrap();

        let filter = graph.children(stages.root())[0];
        assert_eq!(graph.node(filter).unwrap().name, "KuesaShadowMapLayerFilter");
        assert_eq!(graph.children(filter), &[stages.passes()[0].root()]);

        stages.set_layers(&mut graph, &[]).unwrap();
        assert_eq!(graph.children(stages.root()), &[stages.passes()[0].root()]);
    }

    #[test]
    fn dropping_maps_frees_targets() {
        let mut graph = FrameGraph::new();
        let mut stages = ShadowMapStages::new(&mut graph).unwrap();
        stages
            .set_shadow_maps(&mut graph, &[ShadowMap::new(light(), 0, UVec2::splat(64))])
            .unwrap();
        assert_eq!(graph.render_target_count(), 1);

        stages.set_shadow_maps(&mut graph, &[]).unwrap();
        assert_eq!(graph.render_target_count(), 0);
        assert!(graph.children(stages.root()).is_empty());

        stages.release(&mut graph);
        assert_eq!(graph.node_count(), 0);
    }
}
