//! Leaf Render Stages
//!
//! The innermost fragment of every scene pass: a render-pass filter selecting
//! the `KuesaDrawStage` a material pass belongs to, followed by the GPU state
//! that pass needs.
//!
//! | Stage | Pass filter | States |
//! |-------|-------------|--------|
//! | `ZFill` | `KuesaDrawStage = ZFill` | depth `Less`, color writes off |
//! | `Opaque` | `KuesaDrawStage = Opaque` | depth `Less`, or `Equal` without depth writes after a z-fill |
//! | `Transparent` | `KuesaDrawStage = Transparent` | depth `LessOrEqual`, alpha blending, optional back-to-front sort |
//! | `ShadowMap` | `KuesaDrawStage = ShadowMap` | depth `Less`, color writes off |

use smallvec::smallvec;

use crate::errors::Result;
use crate::framegraph::node::{
    BlendFactor, DepthFunction, Filter, FilterKey, FrameGraphNodeKind, RenderState, SortType,
};
use crate::framegraph::{FrameGraph, FrameGraphNodeId};

/// Draw stage a scene pass renders.
///
/// Declaration order is the order the scene passes execute in. Shadow map
/// passes render into their own targets.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum SceneStageType {
    /// Depth-only pre-pass that lets the opaque pass skip hidden fragments.
    ZFill = 0,
    Opaque = 1,
    Transparent = 2,
    /// Depth from a light's point of view.
    ShadowMap = 3,
}

impl SceneStageType {
    #[inline]
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ZFill => "ZFill",
            Self::Opaque => "Opaque",
            Self::Transparent => "Transparent",
            Self::ShadowMap => "ShadowMap",
        }
    }
}

/// One leaf stage subtree in the arena.
#[derive(Debug)]
pub struct RenderStage {
    stage_type: SceneStageType,
    root: FrameGraphNodeId,
    states: FrameGraphNodeId,
    sort_policy: Option<FrameGraphNodeId>,
}

impl RenderStage {
    /// Builds a detached stage subtree.
    pub fn new(graph: &mut FrameGraph, stage_type: SceneStageType) -> Result<Self> {
        let root = graph.create_node(
            format!("Kuesa{}RenderStage", stage_type.name()),
            FrameGraphNodeKind::RenderPassFilter(Filter::matching([FilterKey::new(
                "KuesaDrawStage",
                stage_type.name(),
            )])),
        );

        let states = match stage_type {
            SceneStageType::ZFill | SceneStageType::ShadowMap => smallvec![
                RenderState::DepthTest(DepthFunction::Less),
                RenderState::ColorMask {
                    red: false,
                    green: false,
                    blue: false,
                    alpha: false,
                },
            ],
            SceneStageType::Opaque => smallvec![RenderState::DepthTest(DepthFunction::Less)],
            SceneStageType::Transparent => smallvec![
                RenderState::DepthTest(DepthFunction::LessOrEqual),
                RenderState::BlendEquationAdd,
                RenderState::BlendArguments {
                    source_rgb: BlendFactor::SourceAlpha,
                    source_alpha: BlendFactor::SourceAlpha,
                    destination_rgb: BlendFactor::OneMinusSourceAlpha,
                    destination_alpha: BlendFactor::One,
                },
            ],
        };
        let states = graph.create_child(
            root,
            format!("Kuesa{}States", stage_type.name()),
            FrameGraphNodeKind::RenderStateSet { states },
        )?;

        let sort_policy = if stage_type == SceneStageType::Transparent {
            let sort = graph.create_child(
                states,
                "KuesaAlphaSortPolicy",
                FrameGraphNodeKind::SortPolicy {
                    sort_types: smallvec![SortType::BackToFront, SortType::Material, SortType::Texture],
                },
            )?;
            graph.set_enabled(sort, false)?;
            Some(sort)
        } else {
            None
        };

        Ok(Self {
            stage_type,
            root,
            states,
            sort_policy,
        })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn stage_type(&self) -> SceneStageType {
        self.stage_type
    }

    /// Opaque only: test depth for equality and stop writing it once a z-fill ran.
    pub fn set_z_filling(&mut self, graph: &mut FrameGraph, z_filling: bool) -> Result<()> {
        if self.stage_type != SceneStageType::Opaque {
            return Ok(());
        }
        let states = if z_filling {
            smallvec![RenderState::DepthTest(DepthFunction::Equal), RenderState::NoDepthMask]
        } else {
            smallvec![RenderState::DepthTest(DepthFunction::Less)]
        };
        *graph.kind_mut(self.states)? = FrameGraphNodeKind::RenderStateSet { states };
        Ok(())
    }

    /// Transparent only: toggles the back-to-front sort policy.
    pub fn set_back_to_front_sorting(&mut self, graph: &mut FrameGraph, sorting: bool) -> Result<()> {
        match self.sort_policy {
            Some(sort) => graph.set_enabled(sort, sorting),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ordering() {
        assert!(SceneStageType::ZFill < SceneStageType::Opaque);
        assert!(SceneStageType::Opaque < SceneStageType::Transparent);
    }

    #[test]
    fn opaque_depth_follows_z_filling() {
        let mut graph = FrameGraph::new();
        let mut stage = RenderStage::new(&mut graph, SceneStageType::Opaque).unwrap();
        stage.set_z_filling(&mut graph, true).unwrap();

        let states = graph.children(stage.root())[0];
        match &graph.node(states).unwrap().kind {
            FrameGraphNodeKind::RenderStateSet { states } => {
                assert!(states.contains(&RenderState::DepthTest(DepthFunction::Equal)));
                assert!(states.contains(&RenderState::NoDepthMask));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn transparent_sorting_toggles_enabled() {
        let mut graph = FrameGraph::new();
        let mut stage = RenderStage::new(&mut graph, SceneStageType::Transparent).unwrap();
        let sort = graph.find_by_name(stage.root(), "KuesaAlphaSortPolicy").unwrap();
        assert!(!graph.is_enabled(sort));

        let before = graph.node_count();
        stage.set_back_to_front_sorting(&mut graph, true).unwrap();
        assert!(graph.is_enabled(sort));
        assert_eq!(graph.node_count(), before);
    }
}
