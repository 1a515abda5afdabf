//! One pass over the scene (z-fill, opaque or transparent), for both static
//! and skinned meshes.
//!
//! ```text
//! KuesaScenePass(T)
//!  ├─ KuesaNonSkinnedTechniqueFilter(T)   renderingStyle=forward, allowCulling=true
//!  │   └─ KuesaFrustumCulling(T)          enabled = frustum culling
//!  │       └─ render stage T
//!  └─ KuesaSkinnedTechniqueFilter(T)      renderingStyle=forward, allowCulling=false
//!      └─ render stage T                  (attached only with skinning)
//! ```
//!
//! Skinned meshes skip frustum culling: skinning can move vertices back into
//! view even when the node transform places them outside.

use crate::errors::Result;
use crate::framegraph::node::{Filter, FilterKey, FrameGraphNodeKind, ParameterValue};
use crate::framegraph::{FrameGraph, FrameGraphNodeId};

use super::SceneFeatures;
use super::render_stage::{RenderStage, SceneStageType};

#[derive(Debug)]
pub struct ScenePass {
    pass_type: SceneStageType,
    root: FrameGraphNodeId,
    non_skinned_filter: FrameGraphNodeId,
    frustum_culling: FrameGraphNodeId,
    non_skinned_stage: RenderStage,
    skinned_filter: FrameGraphNodeId,
    skinned_stage: RenderStage,
}

impl ScenePass {
    /// Builds a detached pass configured for `features`.
    pub fn new(graph: &mut FrameGraph, pass_type: SceneStageType, features: SceneFeatures) -> Result<Self> {
        let name = pass_type.name();
        let root = graph.create_node(format!("KuesaScenePass({name})"), FrameGraphNodeKind::Group);

        let non_skinned_filter = graph.create_child(
            root,
            format!("KuesaNonSkinnedTechniqueFilter({name})"),
            FrameGraphNodeKind::TechniqueFilter(Filter::matching([
                FilterKey::new("renderingStyle", "forward"),
                FilterKey::new("allowCulling", true),
            ])),
        )?;
        let frustum_culling = graph.create_child(
            non_skinned_filter,
            format!("KuesaFrustumCulling({name})"),
            FrameGraphNodeKind::FrustumCulling,
        )?;
        let non_skinned_stage = RenderStage::new(graph, pass_type)?;
        graph.set_parent(non_skinned_stage.root(), Some(frustum_culling))?;

        let skinned_filter = graph.create_node(
            format!("KuesaSkinnedTechniqueFilter({name})"),
            FrameGraphNodeKind::TechniqueFilter(Filter::matching([
                FilterKey::new("renderingStyle", "forward"),
                FilterKey::new("allowCulling", false),
            ])),
        );
        let skinned_stage = RenderStage::new(graph, pass_type)?;
        graph.set_parent(skinned_stage.root(), Some(skinned_filter))?;

        let mut pass = Self {
            pass_type,
            root,
            non_skinned_filter,
            frustum_culling,
            non_skinned_stage,
            skinned_filter,
            skinned_stage,
        };
        pass.reconfigure(graph, features)?;
        Ok(pass)
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn pass_type(&self) -> SceneStageType {
        self.pass_type
    }

    /// Sets a parameter on both technique filters.
    pub fn set_parameter(
        &mut self,
        graph: &mut FrameGraph,
        name: &'static str,
        value: impl Into<ParameterValue>,
    ) -> Result<()> {
        let value = value.into();
        for filter in [self.non_skinned_filter, self.skinned_filter] {
            if let Some(filter) = graph.kind_mut(filter)?.filter_mut() {
                filter.set_parameter(name, value.clone());
            }
        }
        Ok(())
    }

    pub fn reconfigure(&mut self, graph: &mut FrameGraph, features: SceneFeatures) -> Result<()> {
        let z_filling = features.contains(SceneFeatures::Z_FILLING);
        let sorting = features.contains(SceneFeatures::BACK_TO_FRONT_SORTING);

        for stage in [&mut self.non_skinned_stage, &mut self.skinned_stage] {
            stage.set_z_filling(graph, z_filling)?;
            stage.set_back_to_front_sorting(graph, sorting)?;
        }

        graph.set_enabled(self.frustum_culling, features.contains(SceneFeatures::FRUSTUM_CULLING))?;

        if features.contains(SceneFeatures::SKINNING) {
            if graph.parent(self.skinned_filter) != Some(self.root) {
                graph.set_parent(self.skinned_filter, Some(self.root))?;
            }
        } else {
            graph.detach(self.skinned_filter);
        }
        Ok(())
    }

    /// Destroys every node of the pass, attached or not.
    pub fn release(&self, graph: &mut FrameGraph) {
        graph.destroy(self.root);
        graph.destroy(self.skinned_filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(features: SceneFeatures) -> (FrameGraph, ScenePass) {
        let mut graph = FrameGraph::new();
        let pass = ScenePass::new(&mut graph, SceneStageType::Opaque, features).unwrap();
        (graph, pass)
    }

    #[test]
    fn skinned_branch_follows_skinning() {
        let (mut graph, mut pass) = pass(SceneFeatures::default());
        assert_eq!(graph.children(pass.root()).len(), 2);

        pass.reconfigure(&mut graph, SceneFeatures::FRUSTUM_CULLING).unwrap();
        assert_eq!(graph.children(pass.root()).len(), 1);

        pass.reconfigure(&mut graph, SceneFeatures::default()).unwrap();
        let names = graph.structure(pass.root()).unwrap();
        assert_eq!(
            names.child_names(),
            vec!["KuesaNonSkinnedTechniqueFilter(Opaque)", "KuesaSkinnedTechniqueFilter(Opaque)"]
        );
    }

    #[test]
    fn culling_only_toggles_enabled() {
        let (mut graph, mut pass) = pass(SceneFeatures::default());
        let before = graph.structure(pass.root()).unwrap().node_count();
        pass.reconfigure(&mut graph, SceneFeatures::SKINNING).unwrap();

        let culling = graph.find_by_name(pass.root(), "KuesaFrustumCulling(Opaque)").unwrap();
        assert!(!graph.is_enabled(culling));
        assert_eq!(graph.structure(pass.root()).unwrap().node_count(), before);
    }

    #[test]
    fn parameters_reach_both_filters() {
        let (mut graph, mut pass) = pass(SceneFeatures::default());
        pass.set_parameter(&mut graph, "isReflective", true).unwrap();

        for name in ["KuesaNonSkinnedTechniqueFilter(Opaque)", "KuesaSkinnedTechniqueFilter(Opaque)"] {
            let id = graph.find_by_name(pass.root(), name).unwrap();
            let filter = graph.node(id).unwrap().kind.filter().unwrap();
            assert_eq!(filter.parameter("isReflective"), Some(&ParameterValue::Bool(true)));
        }
    }

    #[test]
    fn release_frees_detached_nodes() {
        let (mut graph, mut pass) = pass(SceneFeatures::default());
        pass.reconfigure(&mut graph, SceneFeatures::empty()).unwrap();
        pass.release(&mut graph);
        assert_eq!(graph.node_count(), 0);
    }
}
