//! Scene Stages
//!
//! Renders the scene through one camera into the current target:
//!
//! ```text
//! KuesaSceneViewport                 Viewport(rect)
//!  └─ KuesaSceneCamera               CameraSelector(camera[, mirror plane])
//!      └─ KuesaSceneLayerFilter      LayerFilter(layers)   only when layers are set
//!          ├─ KuesaScenePass(ZFill)                        only with z-filling
//!          ├─ KuesaScenePass(Opaque)
//!          ├─ KuesaScenePass(Transparent)
//!          └─ KuesaParticleRenderStage                     only with particles
//! ```
//!
//! An empty layer list means "unfiltered", so the layer filter is left out of
//! the tree rather than filtering everything away.
//!
//! Every pass carries `isReflective` and `reflectionPlane` parameters; the
//! reflection stages reuse this subtree with those switched on.

use glam::Vec4;
use smallvec::SmallVec;

use crate::core::{NormalizedRect, ObjectId};
use crate::errors::Result;
use crate::framegraph::node::{FrameGraphNodeKind, LayerFilterMode};
use crate::framegraph::{FrameGraph, FrameGraphNodeId};

use super::SceneFeatures;
use super::particles::ParticleRenderStage;
use super::render_stage::SceneStageType;
use super::scene_pass::ScenePass;

#[derive(Debug)]
pub struct SceneStages {
    viewport: FrameGraphNodeId,
    camera_selector: FrameGraphNodeId,
    layer_filter: FrameGraphNodeId,
    z_fill: ScenePass,
    opaque: ScenePass,
    transparent: ScenePass,
    particles: ParticleRenderStage,
    features: SceneFeatures,
    layers: SmallVec<[ObjectId; 4]>,
    camera: Option<ObjectId>,
    mirror_plane: Option<Vec4>,
}

impl SceneStages {
    /// Builds a detached subtree. `reflective` marks every pass as rendering a reflection.
    pub fn new(graph: &mut FrameGraph, reflective: bool) -> Result<Self> {
        let features = SceneFeatures::default();
        let viewport = graph.create_node(
            "KuesaSceneViewport",
            FrameGraphNodeKind::Viewport {
                rect: NormalizedRect::FULL,
            },
        );
        let camera_selector = graph.create_child(
            viewport,
            "KuesaSceneCamera",
            FrameGraphNodeKind::CameraSelector {
                camera: None,
                mirror_plane: None,
            },
        )?;
        let layer_filter = graph.create_node(
            "KuesaSceneLayerFilter",
            FrameGraphNodeKind::LayerFilter {
                layers: SmallVec::new(),
                mode: LayerFilterMode::AcceptAnyMatchingLayers,
            },
        );

        let mut stages = Self {
            viewport,
            camera_selector,
            layer_filter,
            z_fill: ScenePass::new(graph, SceneStageType::ZFill, features)?,
            opaque: ScenePass::new(graph, SceneStageType::Opaque, features)?,
            transparent: ScenePass::new(graph, SceneStageType::Transparent, features)?,
            particles: ParticleRenderStage::new(graph)?,
            features,
            layers: SmallVec::new(),
            camera: None,
            mirror_plane: None,
        };

        for pass in stages.passes_mut() {
            pass.set_parameter(graph, "isReflective", reflective)?;
            pass.set_parameter(graph, "reflectionPlane", Vec4::ZERO)?;
        }
        stages.reconfigure(graph)?;
        Ok(stages)
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.viewport
    }

    #[inline]
    #[must_use]
    pub fn features(&self) -> SceneFeatures {
        self.features
    }

    pub fn set_features(&mut self, graph: &mut FrameGraph, features: SceneFeatures) -> Result<()> {
        if features == self.features {
            return Ok(());
        }
        self.features = features;
        self.reconfigure(graph)
    }

    #[must_use]
    pub fn camera(&self) -> Option<ObjectId> {
        self.camera
    }

    pub fn set_camera(&mut self, graph: &mut FrameGraph, camera: Option<ObjectId>) -> Result<()> {
        self.camera = camera;
        self.update_camera_selector(graph)
    }

    /// Mirrors the camera across `plane` and hands the plane to reflective materials.
    pub fn set_mirror_plane(&mut self, graph: &mut FrameGraph, plane: Option<Vec4>) -> Result<()> {
        self.mirror_plane = plane;
        for pass in [&mut self.z_fill, &mut self.opaque, &mut self.transparent] {
            pass.set_parameter(graph, "reflectionPlane", plane.unwrap_or(Vec4::ZERO))?;
        }
        self.update_camera_selector(graph)
    }

    pub fn set_viewport_rect(&mut self, graph: &mut FrameGraph, rect: NormalizedRect) -> Result<()> {
        *graph.kind_mut(self.viewport)? = FrameGraphNodeKind::Viewport { rect };
        Ok(())
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

    /// Re-derives which optional branches are attached.
    pub fn reconfigure(&mut self, graph: &mut FrameGraph) -> Result<()> {
        let features = self.features;
        for pass in self.passes_mut() {
            pass.reconfigure(graph, features)?;
        }

        graph.detach(self.layer_filter);
        graph.detach(self.z_fill.root());
        graph.detach(self.opaque.root());
        graph.detach(self.transparent.root());
        graph.detach(self.particles.root());

        let parent = if self.layers.is_empty() {
            self.camera_selector
        } else {
            graph.set_parent(self.layer_filter, Some(self.camera_selector))?;
            self.layer_filter
        };

        if features.contains(SceneFeatures::Z_FILLING) {
            graph.set_parent(self.z_fill.root(), Some(parent))?;
        }
        graph.set_parent(self.opaque.root(), Some(parent))?;
        graph.set_parent(self.transparent.root(), Some(parent))?;
        if features.contains(SceneFeatures::PARTICLES) {
            graph.set_parent(self.particles.root(), Some(parent))?;
        }
        Ok(())
    }

    /// Destroys every node of the subtree, attached or not.
    pub fn release(&self, graph: &mut FrameGraph) {
        graph.destroy(self.viewport);
        graph.destroy(self.layer_filter);
        for pass in [&self.z_fill, &self.opaque, &self.transparent] {
            pass.release(graph);
        }
        self.particles.release(graph);
    }

    fn passes_mut(&mut self) -> [&mut ScenePass; 3] {
        [&mut self.z_fill, &mut self.opaque, &mut self.transparent]
    }

    fn update_camera_selector(&self, graph: &mut FrameGraph) -> Result<()> {
        *graph.kind_mut(self.camera_selector)? = FrameGraphNodeKind::CameraSelector {
            camera: self.camera,
            mirror_plane: self.mirror_plane,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tree_has_opaque_and_transparent_only() {
        let mut graph = FrameGraph::new();
        let stages = SceneStages::new(&mut graph, false).unwrap();
        let camera = graph.find_by_name(stages.root(), "KuesaSceneCamera").unwrap();
        let names: Vec<_> = graph
            .children(camera)
            .iter()
            .map(|&id| graph.node(id).unwrap().name.to_string())
            .collect();
        assert_eq!(names, vec!["KuesaScenePass(Opaque)", "KuesaScenePass(Transparent)"]);
    }

    #[test]
    fn optional_branches_follow_features() {
        let mut graph = FrameGraph::new();
        let mut stages = SceneStages::new(&mut graph, false).unwrap();
        stages
            .set_features(
                &mut graph,
                SceneFeatures::default() | SceneFeatures::Z_FILLING | SceneFeatures::PARTICLES,
            )
            .unwrap();

        let camera = graph.find_by_name(stages.root(), "KuesaSceneCamera").unwrap();
        let structure = graph.structure(camera).unwrap();
        assert_eq!(
            structure.child_names(),
            vec![
                "KuesaScenePass(ZFill)",
                "KuesaScenePass(Opaque)",
                "KuesaScenePass(Transparent)",
                "KuesaParticleRenderStage",
            ]
        );
    }

    #[test]
    fn layer_filter_inserted_only_with_layers() {
        let mut graph = FrameGraph::new();
        let mut stages = SceneStages::new(&mut graph, false).unwrap();
        let layer = ObjectId::next();

        stages.set_layers(&mut graph, &[layer]).unwrap();
        let camera = graph.find_by_name(stages.root(), "KuesaSceneCamera").unwrap();
        let filter = graph.children(camera)[0];
        assert_eq!(graph.node(filter).unwrap().name, "KuesaSceneLayerFilter");
        assert_eq!(graph.children(filter).len(), 2);

        stages.set_layers(&mut graph, &[]).unwrap();
        assert_eq!(graph.children(camera).len(), 2);
        assert!(graph.parent(filter).is_none());
    }

    #[test]
    fn release_leaves_nothing_behind() {
        let mut graph = FrameGraph::new();
        let stages = SceneStages::new(&mut graph, true).unwrap();
        stages.release(&mut graph);
        assert_eq!(graph.node_count(), 0);
    }
}
