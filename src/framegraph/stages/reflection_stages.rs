//! Reflection Stages
//!
//! Renders the scene mirrored across one plane into a dedicated offscreen
//! target whose color texture reflective materials sample later in the same
//! frame.
//!
//! ```text
//! KuesaReflectionStages               RenderTargetSelector(reflection target)
//!  ├─ KuesaReflectionClear            ClearBuffers(color + depth)
//!  │   └─ NoDraw
//!  └─ scene stages                    isReflective=true, reflectionPlane=eq,
//!                                     camera mirrored across eq, no particles
//! ```
//!
//! The mirrored view matrix is derived from the live camera at render time
//! with [`mirrored_view_matrix`](crate::scene::mirrored_view_matrix), so camera
//! motion needs no reconfiguration.

use glam::{UVec2, Vec4};

use crate::core::{NormalizedRect, ObjectId};
use crate::errors::Result;
use crate::framegraph::node::{ClearBufferFlags, FrameGraphNodeKind};
use crate::framegraph::render_target::{
    AttachmentPoint, RenderTargetDesc, RenderTargetFlags, RenderTargetId, TextureId,
};
use crate::framegraph::{FrameGraph, FrameGraphNodeId};

use super::SceneFeatures;
use super::scene_stages::SceneStages;

#[derive(Debug)]
pub struct ReflectionStages {
    root: FrameGraphNodeId,
    scene: SceneStages,
    render_target: RenderTargetId,
    plane: Vec4,
}

impl ReflectionStages {
    /// Builds a detached subtree and allocates its reflection target.
    pub fn new(graph: &mut FrameGraph, texture_size: UVec2, half_float: bool) -> Result<Self> {
        let mut flags = RenderTargetFlags::INCLUDE_DEPTH;
        if half_float {
            flags |= RenderTargetFlags::HALF_FLOAT;
        }
        let render_target =
            graph.create_render_target("KuesaReflectionTarget", RenderTargetDesc::new(flags, texture_size));

        let root = graph.create_node(
            "KuesaReflectionStages",
            FrameGraphNodeKind::RenderTargetSelector {
                target: Some(render_target),
            },
        );
        let clear = graph.create_child(
            root,
            "KuesaReflectionClear",
            FrameGraphNodeKind::ClearBuffers {
                buffers: ClearBufferFlags::COLOR_DEPTH,
                color: Vec4::ZERO,
            },
        )?;
        graph.create_child(clear, "KuesaReflectionNoDraw", FrameGraphNodeKind::NoDraw)?;

        let mut scene = SceneStages::new(graph, true)?;
        scene.set_features(graph, SceneFeatures::default() - SceneFeatures::PARTICLES)?;
        graph.set_parent(scene.root(), Some(root))?;

        Ok(Self {
            root,
            scene,
            render_target,
            plane: Vec4::ZERO,
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

    /// Color texture holding the reflection.
    #[must_use]
    pub fn reflection_texture(&self, graph: &FrameGraph) -> Option<TextureId> {
        graph.find_render_target_texture(self.render_target, AttachmentPoint::Color0)
    }

    /// Whether the reflection target was allocated with half-float color.
    #[must_use]
    pub fn is_half_float(&self, graph: &FrameGraph) -> bool {
        graph
            .render_target(self.render_target)
            .is_some_and(|target| target.flags.contains(RenderTargetFlags::HALF_FLOAT))
    }

    #[inline]
    #[must_use]
    pub fn reflection_plane(&self) -> Vec4 {
        self.plane
    }

    pub fn set_reflection_plane(&mut self, graph: &mut FrameGraph, plane: Vec4) -> Result<()> {
        self.plane = plane;
        self.scene.set_mirror_plane(graph, Some(plane))
    }

    pub fn set_texture_size(&mut self, graph: &mut FrameGraph, size: UVec2) -> Result<()> {
        graph.resize_render_target(self.render_target, size)
    }

    /// Particles never render into reflections.
    pub fn set_features(&mut self, graph: &mut FrameGraph, features: SceneFeatures) -> Result<()> {
        self.scene
            .set_features(graph, features - SceneFeatures::PARTICLES)
    }

    #[must_use]
    pub fn features(&self) -> SceneFeatures {
        self.scene.features()
    }

    pub fn set_camera(&mut self, graph: &mut FrameGraph, camera: Option<ObjectId>) -> Result<()> {
        self.scene.set_camera(graph, camera)
    }

    pub fn set_viewport_rect(&mut self, graph: &mut FrameGraph, rect: NormalizedRect) -> Result<()> {
        self.scene.set_viewport_rect(graph, rect)
    }

    pub fn set_layers(&mut self, graph: &mut FrameGraph, layers: &[ObjectId]) -> Result<()> {
        self.scene.set_layers(graph, layers)
    }

    #[must_use]
    pub fn layers(&self) -> &[ObjectId] {
        self.scene.layers()
    }

    /// Destroys the subtree and frees the reflection target.
    pub fn release(&self, graph: &mut FrameGraph) {
        self.scene.release(graph);
        graph.destroy(self.root);
        graph.destroy_render_target(self.render_target);
    }
}
