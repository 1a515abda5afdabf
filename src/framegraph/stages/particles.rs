//! GPU particle stage: emit, simulate and sort with compute, then draw.

use glam::UVec3;

use crate::errors::Result;
use crate::framegraph::node::{BarrierFlags, Filter, FilterKey, FrameGraphNodeKind};
use crate::framegraph::{FrameGraph, FrameGraphNodeId};

#[derive(Debug)]
pub struct ParticleRenderStage {
    root: FrameGraphNodeId,
}

impl ParticleRenderStage {
    pub fn new(graph: &mut FrameGraph) -> Result<Self> {
        let root = graph.create_node("KuesaParticleRenderStage", FrameGraphNodeKind::Group);

        let pass_filter = |graph: &mut FrameGraph, key: &'static str, value: &'static str| {
            graph.create_child(
                root,
                format!("Kuesa{value}Filter"),
                FrameGraphNodeKind::RenderPassFilter(Filter::matching([FilterKey::new(key, value)])),
            )
        };
        let dispatch = FrameGraphNodeKind::DispatchCompute {
            work_groups: UVec3::ONE,
        };
        let storage_barrier = FrameGraphNodeKind::MemoryBarrier {
            wait_operations: BarrierFlags::SHADER_STORAGE,
        };

        let emit = pass_filter(graph, "KuesaComputeStage", "ParticleEmit")?;
        graph.create_child(emit, "KuesaParticleEmitDispatch", dispatch.clone())?;

        for (value, name) in [
            ("ParticleSimulate", "KuesaParticleSimulateDispatch"),
            ("ParticleSort", "KuesaParticleSortDispatch"),
        ] {
            let filter = pass_filter(graph, "KuesaComputeStage", value)?;
            let barrier = graph.create_child(filter, "KuesaParticleBarrier", storage_barrier.clone())?;
            graph.create_child(barrier, name, dispatch.clone())?;
        }

        let render = pass_filter(graph, "KuesaDrawStage", "ParticleRender")?;
        graph.create_child(
            render,
            "KuesaParticleBarrier",
            FrameGraphNodeKind::MemoryBarrier {
                wait_operations: BarrierFlags::VERTEX_ATTRIBUTE_ARRAY | BarrierFlags::SHADER_STORAGE,
            },
        )?;

        Ok(Self { root })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.root
    }

    pub fn release(&self, graph: &mut FrameGraph) {
        graph.destroy(self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_four_passes_in_order() {
        let mut graph = FrameGraph::new();
        let stage = ParticleRenderStage::new(&mut graph).unwrap();
        let structure = graph.structure(stage.root()).unwrap();
        assert_eq!(
            structure.child_names(),
            vec![
                "KuesaParticleEmitFilter",
                "KuesaParticleSimulateFilter",
                "KuesaParticleSortFilter",
                "KuesaParticleRenderFilter",
            ]
        );
        assert_eq!(structure.node_count(), 11);
    }
}
